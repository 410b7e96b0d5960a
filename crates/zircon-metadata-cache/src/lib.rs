//! Metadata cache crate for zircon.
//!
//! A metadata cache holds the authoritative [`MetadataEntry`] records for the
//! chunk ranges it owns. All mutations are compare-and-swap under a per-chunk
//! lock, which makes the cache the serialization point for the write path:
//! the total order of successful CAS updates defines the canonical version
//! history of each chunk. Ownership of a range is a coordination-service
//! lease; operations on a chunk owned elsewhere redirect the caller to the
//! actual owner.

pub mod config;
pub mod ownership;
pub mod service;

use async_trait::async_trait;
use zircon_service_derive::{method, zircon_service};
use zircon_types::{ChunkNum, MetadataEntry, Result};

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// The metadata cache RPC interface.
///
/// Errors carrying an owner hint signal redirection: retry the same call
/// against that cache. A stale-entry error means the compare failed; re-read
/// and retry.
#[zircon_service(id = 2, name = "MetadataCache")]
#[async_trait]
pub trait IMetadataCache: Send + Sync {
    /// Allocate a fresh chunk number and initialize an unpublished entry for
    /// it. The entry becomes visible to readers once the first
    /// `update_entry` fills in its replica set.
    #[method(id = 1)]
    async fn new_entry(&self) -> Result<ChunkNum>;

    /// Read the entry for a chunk.
    #[method(id = 2)]
    async fn read_entry(&self, chunk: ChunkNum) -> Result<MetadataEntry>;

    /// Compare-and-swap the entry: succeeds iff the stored entry equals
    /// `previous` field-by-field and this cache owns the chunk.
    #[method(id = 3)]
    async fn update_entry(
        &self,
        chunk: ChunkNum,
        previous: MetadataEntry,
        next: MetadataEntry,
    ) -> Result<()>;

    /// As `update_entry`, but tombstones the entry. Subsequent reads report
    /// not-found.
    #[method(id = 4)]
    async fn delete_entry(&self, chunk: ChunkNum, previous: MetadataEntry) -> Result<()>;
}

pub use config::CacheConfig;
pub use ownership::{owner_lease_key, range_of, OwnershipTable};
pub use service::MetadataCacheImpl;

// Re-export the generated service metadata module.
pub use i_metadata_cache_service_meta as metadata_cache_service_meta;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_meta_constants() {
        assert_eq!(metadata_cache_service_meta::SERVICE_ID, 2);
        assert_eq!(metadata_cache_service_meta::SERVICE_NAME, "MetadataCache");
    }

    #[test]
    fn test_method_ids() {
        use metadata_cache_service_meta::MethodId;

        assert_eq!(MethodId::NewEntry.as_u16(), 1);
        assert_eq!(MethodId::UpdateEntry.as_u16(), 3);
        assert_eq!(MethodId::from_u16(4), Some(MethodId::DeleteEntry));
        assert_eq!(MethodId::from_u16(9), None);
    }
}
