//! Frontend router RPC messages.

use serde::{Deserialize, Serialize};
use zircon_wire::{WireDeserialize, WireSerialize};

/// Which metadata cache owns this chunk's entry?
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct LocateCacheReq {
    pub chunk: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct LocateCacheRsp {
    pub name: String,
    pub address: String,
}

/// Sample `count` live chunkservers for a new chunk's replica set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct PickReplicasReq {
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct PickReplicasRsp {
    pub replicas: Vec<String>,
}

/// Resolve a logical server name to its current address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ResolveReq {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ResolveRsp {
    pub address: String,
}

/// Enumerate the registered chunkservers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ListChunkserversReq {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ServerEntryMsg {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ListChunkserversRsp {
    pub servers: Vec<ServerEntryMsg>,
}

/// Pick a metadata cache to direct chunk allocation at.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct PickMetadataCacheReq {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct PickMetadataCacheRsp {
    pub name: String,
    pub address: String,
}

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

    #[test]
    fn test_locate_roundtrip() {
        let req = LocateCacheReq { chunk: 12 };
        assert_eq!(roundtrip(&req), req);

        let rsp = LocateCacheRsp {
            name: "mdc0".into(),
            address: "10.0.0.5:7000".into(),
        };
        assert_eq!(roundtrip(&rsp), rsp);
    }

    #[test]
    fn test_pick_replicas_roundtrip() {
        let rsp = PickReplicasRsp {
            replicas: vec!["cs0".into(), "cs1".into(), "cs2".into()],
        };
        assert_eq!(roundtrip(&rsp), rsp);
    }

    #[test]
    fn test_list_chunkservers_roundtrip() {
        let rsp = ListChunkserversRsp {
            servers: vec![ServerEntryMsg {
                name: "cs0".into(),
                address: "10.0.0.1:9000".into(),
            }],
        };
        assert_eq!(roundtrip(&rsp), rsp);
    }
}
