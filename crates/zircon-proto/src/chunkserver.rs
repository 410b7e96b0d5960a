//! Chunkserver RPC messages.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zircon_wire::{WireDeserialize, WireSerialize};

/// Read part of a chunk at or above a minimum version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ReadChunkReq {
    pub chunk: u64,
    pub offset: u32,
    pub length: u32,
    /// 0 means any version.
    pub minimum: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ReadChunkRsp {
    pub data: Bytes,
    pub version: u64,
}

/// Stage a write without committing it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct StartWriteReq {
    pub chunk: u64,
    pub offset: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct StartWriteRsp {}

/// Stage a write locally and forward it to the listed replica addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct StartWriteReplicatedReq {
    pub chunk: u64,
    pub offset: u32,
    pub data: Bytes,
    pub replicas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct StartWriteReplicatedRsp {}

/// Commit a previously staged write as `new_version`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct CommitWriteReq {
    pub chunk: u64,
    pub hash: [u8; 16],
    pub old_version: u64,
    pub new_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct CommitWriteRsp {}

/// Advance the reader-visible version and prune older committed versions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct UpdateLatestVersionReq {
    pub chunk: u64,
    pub old_version: u64,
    pub new_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct UpdateLatestVersionRsp {}

/// Push a committed version of a chunk to another chunkserver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ReplicateReq {
    pub chunk: u64,
    pub address: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ReplicateRsp {}

/// Allocate a chunk with initial data, zero-padded to the chunk ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct AddChunkReq {
    pub chunk: u64,
    pub initial_data: Bytes,
    pub initial_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct AddChunkRsp {}

/// Delete a chunk at a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct DeleteChunkReq {
    pub chunk: u64,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct DeleteChunkRsp {}

/// Enumerate all chunks and their latest visible versions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ListAllChunksReq {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ChunkVersionMsg {
    pub chunk: u64,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, WireSerialize, WireDeserialize)]
pub struct ListAllChunksRsp {
    pub chunks: Vec<ChunkVersionMsg>,
}
