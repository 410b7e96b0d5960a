//! Lease-backed ownership of chunk ranges.
//!
//! Exactly one metadata cache may mutate a chunk's entry at a time. Rather
//! than lease every chunk individually, the chunk-number space is split into
//! fixed ranges and the lease key `mdcache/owner/<range>` elects one owner
//! per range. A cache takes the lease lazily on first touch and keeps it
//! renewed; a touch on a range owned elsewhere produces the redirection
//! error that sends the caller to the current holder.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use zircon_coord::Coordinator;
use zircon_types::{CacheCode, ChunkNum, Result, ServerName, Status};

/// Chunks per ownership range (as a shift of the chunk number).
pub const OWNER_RANGE_SHIFT: u32 = 16;

/// The ownership range a chunk belongs to.
pub fn range_of(chunk: ChunkNum) -> u64 {
    chunk.0 >> OWNER_RANGE_SHIFT
}

/// The coordination-service lease key electing a range's owner.
pub fn owner_lease_key(range: u64) -> String {
    format!("mdcache/owner/{}", range)
}

pub struct OwnershipTable {
    coord: Arc<dyn Coordinator>,
    name: ServerName,
    lease_ttl: Duration,
    /// Ranges this cache has taken, for periodic renewal.
    held: DashSet<u64>,
}

impl OwnershipTable {
    pub fn new(coord: Arc<dyn Coordinator>, name: ServerName, lease_ttl: Duration) -> Self {
        Self {
            coord,
            name,
            lease_ttl,
            held: DashSet::new(),
        }
    }

    pub fn name(&self) -> &ServerName {
        &self.name
    }

    /// Confirm this cache owns `chunk`, taking the range lease if it is
    /// free. On failure the error names the live holder so the caller can
    /// redirect.
    pub async fn ensure_owner(&self, chunk: ChunkNum) -> Result<()> {
        let range = range_of(chunk);
        let key = owner_lease_key(range);

        if self
            .coord
            .acquire_lease(&key, self.name.as_str(), self.lease_ttl)
            .await?
        {
            self.held.insert(range);
            return Ok(());
        }

        self.held.remove(&range);
        let holder = self.coord.lease_holder(&key).await?;
        let mut status = Status::with_message(
            CacheCode::NOT_OWNER,
            format!("chunk {} is owned by another cache", chunk),
        );
        if let Some(holder) = holder {
            status = status.with_owner(ServerName(holder));
        }
        Err(status)
    }

    /// Renew every held range lease; drops ranges whose lease was lost.
    pub async fn renew_held(&self) {
        let ranges: Vec<u64> = self.held.iter().map(|r| *r).collect();
        for range in ranges {
            let key = owner_lease_key(range);
            match self
                .coord
                .renew_lease(&key, self.name.as_str(), self.lease_ttl)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(range, "ownership lease lost");
                    self.held.remove(&range);
                }
                Err(e) => {
                    tracing::warn!(range, error = %e, "ownership renewal failed");
                }
            }
        }
    }

    /// Cooperatively give up every held range.
    pub async fn release_all(&self) {
        let ranges: Vec<u64> = self.held.iter().map(|r| *r).collect();
        for range in ranges {
            let key = owner_lease_key(range);
            if let Err(e) = self.coord.release_lease(&key, self.name.as_str()).await {
                tracing::warn!(range, error = %e, "ownership release failed");
            }
            self.held.remove(&range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zircon_coord::MemCoordinator;

    fn table(coord: &Arc<MemCoordinator>, name: &str) -> OwnershipTable {
        OwnershipTable::new(
            Arc::clone(coord) as Arc<dyn Coordinator>,
            ServerName::from(name),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_range_of() {
        assert_eq!(range_of(ChunkNum(0)), 0);
        assert_eq!(range_of(ChunkNum(65535)), 0);
        assert_eq!(range_of(ChunkNum(65536)), 1);
        assert_eq!(owner_lease_key(3), "mdcache/owner/3");
    }

    #[tokio::test]
    async fn test_first_touch_takes_ownership() {
        let coord = Arc::new(MemCoordinator::new());
        let table = table(&coord, "mdc0");
        table.ensure_owner(ChunkNum(1)).await.unwrap();
        // Same range again is a renewal, not a conflict.
        table.ensure_owner(ChunkNum(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_redirect_names_holder() {
        let coord = Arc::new(MemCoordinator::new());
        let a = table(&coord, "mdc0");
        let b = table(&coord, "mdc1");

        a.ensure_owner(ChunkNum(1)).await.unwrap();

        let err = b.ensure_owner(ChunkNum(2)).await.unwrap_err();
        assert_eq!(err.code(), CacheCode::NOT_OWNER);
        assert_eq!(err.owner().map(|o| o.as_str()), Some("mdc0"));
    }

    #[tokio::test]
    async fn test_release_hands_off() {
        let coord = Arc::new(MemCoordinator::new());
        let a = table(&coord, "mdc0");
        let b = table(&coord, "mdc1");

        a.ensure_owner(ChunkNum(1)).await.unwrap();
        a.release_all().await;

        b.ensure_owner(ChunkNum(1)).await.unwrap();
        let err = a.ensure_owner(ChunkNum(1)).await.unwrap_err();
        assert_eq!(err.owner().map(|o| o.as_str()), Some("mdc1"));
    }

    #[tokio::test]
    async fn test_renew_held_detects_loss() {
        let coord = Arc::new(MemCoordinator::new());
        let a = OwnershipTable::new(
            Arc::clone(&coord) as Arc<dyn Coordinator>,
            ServerName::from("mdc0"),
            Duration::from_millis(10),
        );
        a.ensure_owner(ChunkNum(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        // Lease expired; another cache moves in.
        let b = table(&coord, "mdc1");
        b.ensure_owner(ChunkNum(1)).await.unwrap();

        a.renew_held().await;
        let err = a.ensure_owner(ChunkNum(1)).await.unwrap_err();
        assert_eq!(err.owner().map(|o| o.as_str()), Some("mdc1"));
    }
}
