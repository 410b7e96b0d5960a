//! Core chunk-level data types shared by every plane.

use std::fmt;

use serde::{Deserialize, Serialize};
use zircon_utils::murmur3::murmurhash3_x64_128_bytes;

use crate::address::ServerName;
use crate::ids::{ChunkNum, Version};

/// 8 MiB, the fixed logical size of every chunk. Shorter writes leave
/// trailing zeros.
pub const MAX_CHUNK_SIZE: u32 = 8 * 1024 * 1024;

/// A `(chunk, latest visible version)` pair as enumerated by a chunkserver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkVersion {
    pub chunk: ChunkNum,
    pub version: Version,
}

/// Identifier of a staged-but-uncommitted write on a chunkserver.
///
/// Computed as a deterministic digest of `(offset, payload)` so that a
/// retried `start_write` collapses onto the already-staged entry instead of
/// accumulating duplicates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitHash(pub [u8; 16]);

impl CommitHash {
    /// Digest a staged write.
    pub fn digest(offset: u32, data: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(4 + data.len());
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(data);
        Self(murmurhash3_x64_128_bytes(&buf, 0))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitHash(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// The authoritative per-chunk record held by the owning metadata cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// The latest version any replica has committed.
    pub most_recent_version: Version,
    /// The latest version replicas have been told to expose to readers.
    /// Always `<= most_recent_version`.
    pub last_consumed_version: Version,
    /// Replicas holding this chunk, by logical name. Empty iff tombstoned.
    pub replicas: Vec<ServerName>,
}

impl MetadataEntry {
    /// The unpublished entry a fresh chunk number starts from.
    pub fn unpublished() -> Self {
        Self::default()
    }

    /// Whether this entry has been published (has a replica set).
    pub fn is_published(&self) -> bool {
        !self.replicas.is_empty()
    }
}
