//! Metadata cache service implementation.
//!
//! Entries live in a concurrent map keyed by chunk number; the map's
//! per-entry access is the per-chunk lock under which every compare-and-swap
//! runs. Ownership is checked before the entry is touched, and the check
//! never runs while the entry lock is held (lease calls may suspend).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use zircon_coord::{Coordinator, Sequence};
use zircon_types::{
    make_error_msg, CacheCode, ChunkNum, MetadataEntry, Result, ServerName, Status,
};

use crate::config::CacheConfig;
use crate::ownership::OwnershipTable;
use crate::IMetadataCache;

/// Coordination-service key of the chunk-number sequence.
const CHUNK_SEQUENCE_KEY: &str = "mdcache/chunk-seq";

pub struct MetadataCacheImpl {
    entries: DashMap<ChunkNum, MetadataEntry>,
    ownership: OwnershipTable,
    sequence: Sequence,
}

impl MetadataCacheImpl {
    pub fn new(config: &CacheConfig, coord: Arc<dyn Coordinator>) -> Self {
        Self {
            entries: DashMap::new(),
            ownership: OwnershipTable::new(
                Arc::clone(&coord),
                ServerName::from(config.name.as_str()),
                config.lease_ttl,
            ),
            sequence: Sequence::new(coord, CHUNK_SEQUENCE_KEY),
        }
    }

    /// This cache's logical name.
    pub fn name(&self) -> &ServerName {
        self.ownership.name()
    }

    /// The ownership table, for the renewal loop and cooperative shutdown.
    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    /// Number of entries currently held (published or not).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn entry_not_found(chunk: ChunkNum) -> Status {
        Status::with_message(
            CacheCode::ENTRY_NOT_FOUND,
            format!("no entry for chunk {}", chunk),
        )
    }

    fn check_transition(
        chunk: ChunkNum,
        previous: &MetadataEntry,
        next: &MetadataEntry,
    ) -> Result<()> {
        if next.most_recent_version < previous.most_recent_version
            || next.last_consumed_version < previous.last_consumed_version
        {
            return make_error_msg(
                CacheCode::INVALID_ENTRY,
                format!("chunk {}: entry versions may not move backwards", chunk),
            );
        }
        if next.last_consumed_version > next.most_recent_version {
            return make_error_msg(
                CacheCode::INVALID_ENTRY,
                format!(
                    "chunk {}: consumed version {} ahead of most recent {}",
                    chunk, next.last_consumed_version, next.most_recent_version
                ),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl IMetadataCache for MetadataCacheImpl {
    async fn new_entry(&self) -> Result<ChunkNum> {
        let chunk = ChunkNum(self.sequence.next().await?);
        // The fresh number must land on a cache that owns its range;
        // redirection here sends the caller to allocate at the owner.
        self.ownership.ensure_owner(chunk).await?;

        self.entries.insert(chunk, MetadataEntry::unpublished());
        debug!(%chunk, "allocated chunk number");
        Ok(chunk)
    }

    async fn read_entry(&self, chunk: ChunkNum) -> Result<MetadataEntry> {
        self.ownership.ensure_owner(chunk).await?;

        self.entries
            .get(&chunk)
            .map(|e| e.value().clone())
            .ok_or_else(|| Self::entry_not_found(chunk))
    }

    async fn update_entry(
        &self,
        chunk: ChunkNum,
        previous: MetadataEntry,
        next: MetadataEntry,
    ) -> Result<()> {
        self.ownership.ensure_owner(chunk).await?;
        Self::check_transition(chunk, &previous, &next)?;

        let mut entry = self
            .entries
            .get_mut(&chunk)
            .ok_or_else(|| Self::entry_not_found(chunk))?;

        if *entry != previous {
            return Err(Status::with_message(
                CacheCode::STALE_ENTRY,
                format!(
                    "chunk {}: entry changed (most recent now {})",
                    chunk,
                    entry.most_recent_version
                ),
            )
            .with_version(entry.most_recent_version));
        }

        debug!(
            %chunk,
            most_recent = %next.most_recent_version,
            last_consumed = %next.last_consumed_version,
            "entry updated"
        );
        *entry = next;
        Ok(())
    }

    async fn delete_entry(&self, chunk: ChunkNum, previous: MetadataEntry) -> Result<()> {
        self.ownership.ensure_owner(chunk).await?;

        let mut stale = None;
        let removed = self.entries.remove_if(&chunk, |_, entry| {
            if *entry == previous {
                true
            } else {
                stale = Some(entry.most_recent_version);
                false
            }
        });

        match (removed, stale) {
            (Some(_), _) => {
                debug!(%chunk, "entry tombstoned");
                Ok(())
            }
            (None, Some(most_recent)) => Err(Status::with_message(
                CacheCode::STALE_ENTRY,
                format!(
                    "chunk {}: entry changed (most recent now {})",
                    chunk, most_recent
                ),
            )
            .with_version(most_recent)),
            (None, None) => Err(Self::entry_not_found(chunk)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zircon_coord::MemCoordinator;
    use zircon_types::Version;

    fn cache_named(coord: &Arc<MemCoordinator>, name: &str) -> MetadataCacheImpl {
        let config = CacheConfig {
            name: name.into(),
            ..CacheConfig::default()
        };
        MetadataCacheImpl::new(&config, Arc::clone(coord) as Arc<dyn Coordinator>)
    }

    fn cache() -> MetadataCacheImpl {
        cache_named(&Arc::new(MemCoordinator::new()), "mdc0")
    }

    fn published(replicas: &[&str]) -> MetadataEntry {
        MetadataEntry {
            most_recent_version: Version(1),
            last_consumed_version: Version(1),
            replicas: replicas.iter().map(|r| ServerName::from(*r)).collect(),
        }
    }

    #[tokio::test]
    async fn test_new_entry_allocates_fresh_numbers() {
        let mdc = cache();
        let a = mdc.new_entry().await.unwrap();
        let b = mdc.new_entry().await.unwrap();
        assert_ne!(a, b);
        assert_eq!(mdc.entry_count(), 2);

        let entry = mdc.read_entry(a).await.unwrap();
        assert_eq!(entry, MetadataEntry::unpublished());
    }

    #[tokio::test]
    async fn test_read_missing_entry() {
        let mdc = cache();
        let err = mdc.read_entry(ChunkNum(404)).await.unwrap_err();
        assert_eq!(err.code(), CacheCode::ENTRY_NOT_FOUND);
        assert!(err.owner().is_none());
    }

    #[tokio::test]
    async fn test_publish_then_update() {
        let mdc = cache();
        let chunk = mdc.new_entry().await.unwrap();

        let first = published(&["cs0", "cs1", "cs2"]);
        mdc.update_entry(chunk, MetadataEntry::unpublished(), first.clone())
            .await
            .unwrap();

        let mut second = first.clone();
        second.most_recent_version = Version(2);
        mdc.update_entry(chunk, first, second.clone()).await.unwrap();

        assert_eq!(mdc.read_entry(chunk).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_update_cas_mismatch() {
        let mdc = cache();
        let chunk = mdc.new_entry().await.unwrap();
        let first = published(&["cs0"]);
        mdc.update_entry(chunk, MetadataEntry::unpublished(), first.clone())
            .await
            .unwrap();

        // A second writer with the original expectation loses.
        let mut next = first.clone();
        next.most_recent_version = Version(2);
        let err = mdc
            .update_entry(chunk, MetadataEntry::unpublished(), next)
            .await
            .unwrap_err();
        assert_eq!(err.code(), CacheCode::STALE_ENTRY);
        assert_eq!(err.version(), Some(Version(1)));

        // No state change on failure.
        assert_eq!(mdc.read_entry(chunk).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_update_rejects_backwards_versions() {
        let mdc = cache();
        let chunk = mdc.new_entry().await.unwrap();
        let mut current = published(&["cs0"]);
        current.most_recent_version = Version(5);
        current.last_consumed_version = Version(5);
        mdc.update_entry(chunk, MetadataEntry::unpublished(), current.clone())
            .await
            .unwrap();

        let mut backwards = current.clone();
        backwards.most_recent_version = Version(4);
        backwards.last_consumed_version = Version(4);
        let err = mdc
            .update_entry(chunk, current.clone(), backwards)
            .await
            .unwrap_err();
        assert_eq!(err.code(), CacheCode::INVALID_ENTRY);

        let mut consumed_ahead = current.clone();
        consumed_ahead.last_consumed_version = Version(9);
        let err = mdc
            .update_entry(chunk, current, consumed_ahead)
            .await
            .unwrap_err();
        assert_eq!(err.code(), CacheCode::INVALID_ENTRY);
    }

    #[tokio::test]
    async fn test_delete_entry_cas() {
        let mdc = cache();
        let chunk = mdc.new_entry().await.unwrap();
        let entry = published(&["cs0"]);
        mdc.update_entry(chunk, MetadataEntry::unpublished(), entry.clone())
            .await
            .unwrap();

        // Wrong expectation: refused.
        let err = mdc
            .delete_entry(chunk, MetadataEntry::unpublished())
            .await
            .unwrap_err();
        assert_eq!(err.code(), CacheCode::STALE_ENTRY);

        mdc.delete_entry(chunk, entry).await.unwrap();
        let err = mdc.read_entry(chunk).await.unwrap_err();
        assert_eq!(err.code(), CacheCode::ENTRY_NOT_FOUND);
        assert_eq!(mdc.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_mutations_redirect_to_owner() {
        let coord = Arc::new(MemCoordinator::new());
        let owner = cache_named(&coord, "mdc0");
        let other = cache_named(&coord, "mdc1");

        let chunk = owner.new_entry().await.unwrap();

        let err = other
            .update_entry(chunk, MetadataEntry::unpublished(), published(&["cs0"]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CacheCode::NOT_OWNER);
        assert_eq!(err.owner().map(|o| o.as_str()), Some("mdc0"));

        let err = other.read_entry(chunk).await.unwrap_err();
        assert_eq!(err.code(), CacheCode::NOT_OWNER);
    }

    #[tokio::test]
    async fn test_chunk_numbers_shared_across_caches() {
        // Two caches drawing from the same coordinator never collide.
        let coord = Arc::new(MemCoordinator::new());
        let a = cache_named(&coord, "mdc0");
        let chunk_a = a.new_entry().await.unwrap();

        // mdc0 owns the range now, so mdc1's allocation redirects rather
        // than handing out a number it cannot serve.
        let b = cache_named(&coord, "mdc1");
        let err = b.new_entry().await.unwrap_err();
        assert_eq!(err.code(), CacheCode::NOT_OWNER);

        let chunk_a2 = a.new_entry().await.unwrap();
        assert!(chunk_a2 > chunk_a);
    }
}
