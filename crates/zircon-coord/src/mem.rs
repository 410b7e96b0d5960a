//! In-process coordinator used by tests and single-node deployments.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use zircon_types::Result;

use crate::kv::{Coordinator, KeyValue};

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// A [`Coordinator`] backed by process-local maps.
///
/// Linearizability comes for free from the mutex; lease expiry uses the wall
/// clock the same way an external store's TTL would.
#[derive(Default)]
pub struct MemCoordinator {
    keys: Mutex<BTreeMap<String, Vec<u8>>>,
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemCoordinator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Coordinator for MemCoordinator {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.keys.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.keys.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn put_if_match(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool> {
        let mut keys = self.keys.lock();
        let current = keys.get(key).map(|v| v.as_slice());
        if current != expected {
            return Ok(false);
        }
        keys.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.keys.lock().remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let keys = self.keys.lock();
        Ok(keys
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn acquire_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.lock();
        match leases.get(key) {
            Some(lease) if lease.is_live() && lease.holder != holder => Ok(false),
            _ => {
                leases.insert(
                    key.to_string(),
                    Lease {
                        holder: holder.to_string(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn renew_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.lock();
        match leases.get_mut(key) {
            Some(lease) if lease.is_live() && lease.holder == holder => {
                lease.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, key: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.lock();
        if let Some(lease) = leases.get(key) {
            if lease.holder == holder {
                leases.remove(key);
            }
        }
        Ok(())
    }

    async fn lease_holder(&self, key: &str) -> Result<Option<String>> {
        let leases = self.leases.lock();
        Ok(leases
            .get(key)
            .filter(|l| l.is_live())
            .map(|l| l.holder.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_put_delete() {
        let coord = MemCoordinator::new();
        assert_eq!(coord.get("a").await.unwrap(), None);

        coord.put("a", b"1").await.unwrap();
        assert_eq!(coord.get("a").await.unwrap(), Some(b"1".to_vec()));

        coord.delete("a").await.unwrap();
        assert_eq!(coord.get("a").await.unwrap(), None);
        // Deleting again is a no-op.
        coord.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_if_match() {
        let coord = MemCoordinator::new();

        // Create-if-absent.
        assert!(coord.put_if_match("k", None, b"v1").await.unwrap());
        // Absent expectation now fails.
        assert!(!coord.put_if_match("k", None, b"v2").await.unwrap());
        // Matching expectation succeeds.
        assert!(coord.put_if_match("k", Some(b"v1"), b"v2").await.unwrap());
        // Stale expectation fails without a state change.
        assert!(!coord.put_if_match("k", Some(b"v1"), b"v3").await.unwrap());
        assert_eq!(coord.get("k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let coord = MemCoordinator::new();
        coord.put("server/addr/cs0", b"a").await.unwrap();
        coord.put("server/addr/cs1", b"b").await.unwrap();
        coord.put("server/seq", b"c").await.unwrap();

        let kvs = coord.list_prefix("server/addr/").await.unwrap();
        assert_eq!(kvs.len(), 2);
        assert_eq!(kvs[0].key, "server/addr/cs0");
        assert_eq!(kvs[1].key, "server/addr/cs1");
    }

    #[tokio::test]
    async fn test_lease_lifecycle() {
        let coord = MemCoordinator::new();
        let ttl = Duration::from_secs(60);

        assert!(coord.acquire_lease("owner/0", "mdc0", ttl).await.unwrap());
        // Another holder cannot take a live lease.
        assert!(!coord.acquire_lease("owner/0", "mdc1", ttl).await.unwrap());
        // The holder can re-acquire (renews).
        assert!(coord.acquire_lease("owner/0", "mdc0", ttl).await.unwrap());

        assert_eq!(
            coord.lease_holder("owner/0").await.unwrap(),
            Some("mdc0".to_string())
        );

        assert!(coord.renew_lease("owner/0", "mdc0", ttl).await.unwrap());
        assert!(!coord.renew_lease("owner/0", "mdc1", ttl).await.unwrap());

        coord.release_lease("owner/0", "mdc1").await.unwrap();
        assert_eq!(
            coord.lease_holder("owner/0").await.unwrap(),
            Some("mdc0".to_string()),
            "release by a non-holder must not drop the lease"
        );

        coord.release_lease("owner/0", "mdc0").await.unwrap();
        assert_eq!(coord.lease_holder("owner/0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lease_expiry() {
        let coord = MemCoordinator::new();
        let ttl = Duration::from_millis(10);

        assert!(coord.acquire_lease("owner/1", "mdc0", ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(coord.lease_holder("owner/1").await.unwrap(), None);
        // An expired lease is up for grabs.
        assert!(coord
            .acquire_lease("owner/1", "mdc1", Duration::from_secs(60))
            .await
            .unwrap());
        // And the old holder can no longer renew.
        assert!(!coord
            .renew_lease("owner/1", "mdc0", Duration::from_secs(60))
            .await
            .unwrap());
    }
}
