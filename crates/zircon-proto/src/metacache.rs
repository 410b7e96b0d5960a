//! Metadata cache RPC messages.

use serde::{Deserialize, Serialize};
use zircon_types::{MetadataEntry, ServerName, Version};
use zircon_wire::{WireDeserialize, WireSerialize};

/// Wire form of a [`MetadataEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct MetadataEntryMsg {
    pub most_recent_version: u64,
    pub last_consumed_version: u64,
    pub replicas: Vec<String>,
}

impl From<&MetadataEntry> for MetadataEntryMsg {
    fn from(entry: &MetadataEntry) -> Self {
        Self {
            most_recent_version: entry.most_recent_version.0,
            last_consumed_version: entry.last_consumed_version.0,
            replicas: entry.replicas.iter().map(|r| r.0.clone()).collect(),
        }
    }
}

impl From<MetadataEntryMsg> for MetadataEntry {
    fn from(msg: MetadataEntryMsg) -> Self {
        Self {
            most_recent_version: Version(msg.most_recent_version),
            last_consumed_version: Version(msg.last_consumed_version),
            replicas: msg.replicas.into_iter().map(ServerName).collect(),
        }
    }
}

/// Allocate a fresh chunk number with an unpublished entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct NewEntryReq {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct NewEntryRsp {
    pub chunk: u64,
}

/// Read the entry for a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ReadEntryReq {
    pub chunk: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ReadEntryRsp {
    pub entry: MetadataEntryMsg,
}

/// Compare-and-swap the entry for a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct UpdateEntryReq {
    pub chunk: u64,
    pub previous: MetadataEntryMsg,
    pub next: MetadataEntryMsg,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct UpdateEntryRsp {}

/// Compare-and-tombstone the entry for a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct DeleteEntryReq {
    pub chunk: u64,
    pub previous: MetadataEntryMsg,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct DeleteEntryRsp {}

#[cfg(test)]
mod tests {
    use super::*;
    use zircon_wire::{WireDeserialize, WireSerialize};

    fn roundtrip<T: WireSerialize + WireDeserialize + std::fmt::Debug + PartialEq>(val: &T) -> T {
        let mut buf = Vec::new();
        val.wire_serialize(&mut buf).unwrap();
        let mut offset = 0;
        let result = T::wire_deserialize(&buf, &mut offset).unwrap();
        assert_eq!(offset, buf.len());
        result
    }

    fn sample_entry() -> MetadataEntry {
        MetadataEntry {
            most_recent_version: Version(5),
            last_consumed_version: Version(4),
            replicas: vec![ServerName::from("cs0"), ServerName::from("cs2")],
        }
    }

    #[test]
    fn test_entry_msg_conversion() {
        let entry = sample_entry();
        let msg = MetadataEntryMsg::from(&entry);
        assert_eq!(msg.most_recent_version, 5);
        assert_eq!(msg.replicas, vec!["cs0".to_string(), "cs2".to_string()]);

        let back: MetadataEntry = msg.into();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_update_entry_roundtrip() {
        let prev = MetadataEntryMsg::from(&sample_entry());
        let mut next = prev.clone();
        next.most_recent_version = 6;
        let req = UpdateEntryReq {
            chunk: 17,
            previous: prev,
            next,
        };
        assert_eq!(roundtrip(&req), req);
    }

    #[test]
    fn test_delete_entry_roundtrip() {
        let req = DeleteEntryReq {
            chunk: 17,
            previous: MetadataEntryMsg::from(&sample_entry()),
        };
        assert_eq!(roundtrip(&req), req);
    }

    #[test]
    fn test_new_entry_roundtrip() {
        assert_eq!(roundtrip(&NewEntryReq {}), NewEntryReq {});
        let rsp = NewEntryRsp { chunk: 99 };
        assert_eq!(roundtrip(&rsp), rsp);
    }
}
