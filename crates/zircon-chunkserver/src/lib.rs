//! Chunkserver crate for zircon.
//!
//! This crate implements the per-chunk multi-version store and the service
//! that exposes it: staged writes, atomic commit at a new version,
//! advancement of the reader-visible version with pruning of older versions,
//! replica fan-out of staged data, and healing of under-replicated chunks.

pub mod chunk_store;
pub mod config;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use zircon_service_derive::{method, zircon_service};
use zircon_types::{ChunkNum, ChunkVersion, CommitHash, Result, ServerAddress, Version};

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// The chunkserver RPC interface.
///
/// Strongly consistent because it is a connection to a single chunkserver;
/// every method is safe to call concurrently. Version arguments follow the
/// global sentinel convention: `Version::ANY` (0) means "any version".
#[zircon_service(id = 1, name = "Chunkserver")]
#[async_trait]
pub trait IChunkserver: Send + Sync {
    /// Read `length` bytes at `offset` out of the chunk.
    ///
    /// Succeeds if the locally visible version is at least `minimum` (or
    /// `minimum` is the any-version sentinel), returning exactly `length`
    /// bytes and the version actually read. A stale replica fails with the
    /// current visible version carried in the error so the caller can wait
    /// for replication to catch up.
    #[method(id = 1)]
    async fn read(
        &self,
        chunk: ChunkNum,
        offset: u32,
        length: u32,
        minimum: Version,
    ) -> Result<(Bytes, Version)>;

    /// Stage `(offset, data)` for a later commit. Does not perform a write.
    ///
    /// The staged entry is keyed by the deterministic digest of
    /// `(offset, data)`, so retries collapse onto one entry.
    #[method(id = 2)]
    async fn start_write(&self, chunk: ChunkNum, offset: u32, data: Bytes) -> Result<()>;

    /// Stage locally, then forward the same staged write to every listed
    /// replica. Fails if any replica fails to stage; staged data left on the
    /// replicas that did succeed is harmless and expires via GC.
    #[method(id = 3)]
    async fn start_write_replicated(
        &self,
        chunk: ChunkNum,
        offset: u32,
        data: Bytes,
        replicas: Vec<ServerAddress>,
    ) -> Result<()>;

    /// Commit a staged write: apply it to the payload at `old_version` and
    /// store the result as `new_version`. Does not change the visible
    /// version. The staged entry is consumed on success.
    #[method(id = 4)]
    async fn commit_write(
        &self,
        chunk: ChunkNum,
        hash: CommitHash,
        old_version: Version,
        new_version: Version,
    ) -> Result<()>;

    /// Advance the version returned to readers and delete every committed
    /// version strictly below it. No-op success when the visible version is
    /// already at or past `new_version`.
    #[method(id = 5)]
    async fn update_latest_version(
        &self,
        chunk: ChunkNum,
        old_version: Version,
        new_version: Version,
    ) -> Result<()>;

    /// Push the committed payload for `version` to the chunkserver at
    /// `address` (invokes `add` there). Used by the control plane to heal
    /// under-replicated chunks.
    #[method(id = 6)]
    async fn replicate(
        &self,
        chunk: ChunkNum,
        address: ServerAddress,
        version: Version,
    ) -> Result<()>;

    /// Allocate the chunk locally; `initial_data` is zero-padded to the
    /// chunk ceiling. `initial_version` must be positive.
    #[method(id = 7)]
    async fn add(
        &self,
        chunk: ChunkNum,
        initial_data: Bytes,
        initial_version: Version,
    ) -> Result<()>;

    /// Remove the chunk iff `version` is its visible version and nothing
    /// newer has been committed.
    #[method(id = 8)]
    async fn delete(&self, chunk: ChunkNum, version: Version) -> Result<()>;

    /// Enumerate `(chunk, visible version)` pairs in unspecified order.
    #[method(id = 9)]
    async fn list_all_chunks(&self) -> Result<Vec<ChunkVersion>>;
}

// ---------------------------------------------------------------------------
// Outbound connections
// ---------------------------------------------------------------------------

/// Resolves a chunkserver address to a client handle.
///
/// The service only needs this narrow slice of the connection cache for
/// replica fan-out; tests plug in a map of in-process servers.
#[async_trait]
pub trait ChunkserverDialer: Send + Sync {
    async fn chunkserver(&self, addr: &ServerAddress) -> Result<Arc<dyn IChunkserver>>;
}

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use chunk_store::ChunkStore;
pub use config::ChunkserverConfig;
pub use service::ChunkserverServiceImpl;

// Re-export the generated service metadata module.
pub use i_chunkserver_service_meta as chunkserver_service_meta;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_meta_constants() {
        assert_eq!(chunkserver_service_meta::SERVICE_ID, 1);
        assert_eq!(chunkserver_service_meta::SERVICE_NAME, "Chunkserver");
    }

    #[test]
    fn test_method_ids() {
        use chunkserver_service_meta::MethodId;

        assert_eq!(MethodId::Read.as_u16(), 1);
        assert_eq!(MethodId::StartWriteReplicated.as_u16(), 3);
        assert_eq!(MethodId::ListAllChunks.as_u16(), 9);
        assert_eq!(MethodId::from_u16(5), Some(MethodId::UpdateLatestVersion));
        assert_eq!(MethodId::from_u16(99), None);
    }

    #[test]
    fn test_method_name_lookup() {
        assert_eq!(chunkserver_service_meta::method_name(1), Some("read"));
        assert_eq!(
            chunkserver_service_meta::method_name(4),
            Some("commit_write")
        );
        assert_eq!(chunkserver_service_meta::method_name(0), None);
    }
}
