use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("insufficient data: need {need} bytes but only {have} remain")]
    InsufficientData { need: usize, have: usize },
    #[error("invalid enum variant for {enum_name}: {value}")]
    InvalidEnumVariant {
        enum_name: &'static str,
        value: u64,
    },
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
    #[error("data too large: {size} bytes")]
    DataTooLarge { size: usize },
}

/// Serialization into the length-prefixed little-endian envelope.
///
/// Field order follows struct declaration order; there are no field tags, so
/// both sides must agree on the message layout (the proto crate is that
/// single source of truth).
pub trait WireSerialize {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError>;
}

pub trait WireDeserialize: Sized {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError>;
}

fn read_bytes<'a>(buf: &'a [u8], offset: &mut usize, n: usize) -> Result<&'a [u8], WireError> {
    if buf.len() - *offset < n {
        return Err(WireError::InsufficientData {
            need: n,
            have: buf.len() - *offset,
        });
    }
    let slice = &buf[*offset..*offset + n];
    *offset += n;
    Ok(slice)
}

// ---------------------------------------------------------------------------
// Integer types
// ---------------------------------------------------------------------------

macro_rules! impl_wire_for_int {
    ($ty:ty, $size:expr, $read:ident, $write:ident) => {
        impl WireSerialize for $ty {
            fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
                let mut tmp = [0u8; $size];
                LittleEndian::$write(&mut tmp, *self);
                buf.extend_from_slice(&tmp);
                Ok(())
            }
        }

        impl WireDeserialize for $ty {
            fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
                let bytes = read_bytes(buf, offset, $size)?;
                Ok(LittleEndian::$read(bytes))
            }
        }
    };
}

impl_wire_for_int!(u16, 2, read_u16, write_u16);
impl_wire_for_int!(u32, 4, read_u32, write_u32);
impl_wire_for_int!(u64, 8, read_u64, write_u64);
impl_wire_for_int!(i64, 8, read_i64, write_i64);

// u8 is single-byte, no endianness needed.

impl WireSerialize for u8 {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        buf.push(*self);
        Ok(())
    }
}

impl WireDeserialize for u8 {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
        let bytes = read_bytes(buf, offset, 1)?;
        Ok(bytes[0])
    }
}

// ---------------------------------------------------------------------------
// bool
// ---------------------------------------------------------------------------

impl WireSerialize for bool {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        buf.push(u8::from(*self));
        Ok(())
    }
}

impl WireDeserialize for bool {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
        let v = u8::wire_deserialize(buf, offset)?;
        Ok(v != 0)
    }
}

// ---------------------------------------------------------------------------
// String
// ---------------------------------------------------------------------------

impl WireSerialize for String {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        let len = self.len() as u32;
        len.wire_serialize(buf)?;
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl WireDeserialize for String {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
        let len = u32::wire_deserialize(buf, offset)? as usize;
        let bytes = read_bytes(buf, offset, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }
}

// ---------------------------------------------------------------------------
// bytes::Bytes
// ---------------------------------------------------------------------------

impl WireSerialize for bytes::Bytes {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        let len = self.len() as u32;
        len.wire_serialize(buf)?;
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl WireDeserialize for bytes::Bytes {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
        let len = u32::wire_deserialize(buf, offset)? as usize;
        let bytes = read_bytes(buf, offset, len)?;
        Ok(bytes::Bytes::copy_from_slice(bytes))
    }
}

// ---------------------------------------------------------------------------
// Fixed-size byte arrays (commit hashes)
// ---------------------------------------------------------------------------

impl<const N: usize> WireSerialize for [u8; N] {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> WireDeserialize for [u8; N] {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
        let bytes = read_bytes(buf, offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Vec<T> (u32 count + element-wise; Vec<u8> encodes identically to a raw
// length-prefixed byte buffer)
// ---------------------------------------------------------------------------

impl<T: WireSerialize> WireSerialize for Vec<T> {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        let len = self.len() as u32;
        len.wire_serialize(buf)?;
        for item in self {
            item.wire_serialize(buf)?;
        }
        Ok(())
    }
}

impl<T: WireDeserialize> WireDeserialize for Vec<T> {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
        let len = u32::wire_deserialize(buf, offset)? as usize;
        let mut result = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            result.push(T::wire_deserialize(buf, offset)?);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Option<T>
// ---------------------------------------------------------------------------

impl<T: WireSerialize> WireSerialize for Option<T> {
    fn wire_serialize(&self, buf: &mut Vec<u8>) -> Result<(), WireError> {
        match self {
            None => 0u8.wire_serialize(buf),
            Some(val) => {
                1u8.wire_serialize(buf)?;
                val.wire_serialize(buf)
            }
        }
    }
}

impl<T: WireDeserialize> WireDeserialize for Option<T> {
    fn wire_deserialize(buf: &[u8], offset: &mut usize) -> Result<Self, WireError> {
        let tag = u8::wire_deserialize(buf, offset)?;
        match tag {
            0 => Ok(None),
            _ => Ok(Some(T::wire_deserialize(buf, offset)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: WireSerialize + WireDeserialize + std::fmt::Debug + PartialEq>(val: &T) -> T {
        let mut buf = Vec::new();
        val.wire_serialize(&mut buf).unwrap();
        let mut offset = 0;
        let result = T::wire_deserialize(&buf, &mut offset).unwrap();
        assert_eq!(offset, buf.len(), "all bytes should be consumed");
        result
    }

    #[test]
    fn test_ints() {
        assert_eq!(roundtrip(&255u8), 255u8);
        assert_eq!(roundtrip(&0x1234u16), 0x1234u16);
        assert_eq!(roundtrip(&0xDEADBEEFu32), 0xDEADBEEFu32);
        assert_eq!(roundtrip(&u64::MAX), u64::MAX);
        assert_eq!(roundtrip(&i64::MIN), i64::MIN);
    }

    #[test]
    fn test_bool() {
        assert!(roundtrip(&true));
        assert!(!roundtrip(&false));
    }

    #[test]
    fn test_string() {
        assert_eq!(roundtrip(&String::new()), String::new());
        assert_eq!(
            roundtrip(&"hello world".to_string()),
            "hello world".to_string()
        );
        assert_eq!(
            roundtrip(&"utf-8: \u{1F600}".to_string()),
            "utf-8: \u{1F600}".to_string()
        );
    }

    #[test]
    fn test_vec_u8_matches_raw_bytes() {
        let v = vec![1u8, 2, 3, 4, 5];
        let mut via_vec = Vec::new();
        v.wire_serialize(&mut via_vec).unwrap();

        let b = bytes::Bytes::from(v.clone());
        let mut via_bytes = Vec::new();
        b.wire_serialize(&mut via_bytes).unwrap();

        assert_eq!(via_vec, via_bytes);
    }

    #[test]
    fn test_bytes() {
        let data = bytes::Bytes::from_static(b"hello");
        assert_eq!(roundtrip(&data), data);
        assert_eq!(roundtrip(&bytes::Bytes::new()), bytes::Bytes::new());
    }

    #[test]
    fn test_fixed_array() {
        let arr = [7u8; 16];
        assert_eq!(roundtrip(&arr), arr);

        // Fixed arrays carry no length prefix.
        let mut buf = Vec::new();
        arr.wire_serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn test_vec_string() {
        let v = vec!["cs0".to_string(), "cs1".to_string(), "cs2".to_string()];
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_option() {
        assert_eq!(roundtrip::<Option<u32>>(&None), None);
        assert_eq!(roundtrip(&Some(42u32)), Some(42u32));
    }

    #[test]
    fn test_little_endian_encoding() {
        let mut buf = Vec::new();
        0x04030201u32.wire_serialize(&mut buf).unwrap();
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_insufficient_data() {
        let buf = vec![0u8; 2];
        let mut offset = 0;
        let result = u32::wire_deserialize(&buf, &mut offset);
        match result.unwrap_err() {
            WireError::InsufficientData { need, have } => {
                assert_eq!(need, 4);
                assert_eq!(have, 2);
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = Vec::new();
        2u32.wire_serialize(&mut buf).unwrap();
        buf.extend_from_slice(&[0xFF, 0xFE]);
        let mut offset = 0;
        let result = String::wire_deserialize(&buf, &mut offset);
        assert!(matches!(result, Err(WireError::InvalidUtf8)));
    }

    #[test]
    fn test_multiple_values_in_buffer() {
        let mut buf = Vec::new();
        42u64.wire_serialize(&mut buf).unwrap();
        "cs0".to_string().wire_serialize(&mut buf).unwrap();
        true.wire_serialize(&mut buf).unwrap();

        let mut offset = 0;
        assert_eq!(u64::wire_deserialize(&buf, &mut offset).unwrap(), 42);
        assert_eq!(String::wire_deserialize(&buf, &mut offset).unwrap(), "cs0");
        assert!(bool::wire_deserialize(&buf, &mut offset).unwrap());
        assert_eq!(offset, buf.len());
    }
}
