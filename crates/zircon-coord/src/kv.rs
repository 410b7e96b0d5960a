use std::time::Duration;

use async_trait::async_trait;
use zircon_types::Result;

/// Key-value pair returned by prefix reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// The coordination-service client surface consumed by zircon.
///
/// Leased keys disappear when the lease is lost, which is how metadata-cache
/// ownership is modeled. `put_if_match` with `expected: None` means
/// create-if-absent.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Unconditionally write a key.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Atomically write a key iff its current value equals `expected`.
    /// Returns `false` on mismatch with no state change.
    async fn put_if_match(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool>;

    /// Delete a key. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read every key starting with `prefix`, in key order.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>>;

    /// Try to take the lease on `key` for `holder`. Succeeds if the lease is
    /// free, expired, or already held by `holder` (which also renews it).
    async fn acquire_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Extend a lease currently held by `holder`. Returns `false` if the
    /// lease has been lost.
    async fn renew_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Release a lease held by `holder`. Releasing a lease held by someone
    /// else is a no-op.
    async fn release_lease(&self, key: &str, holder: &str) -> Result<()>;

    /// Return the current live holder of a lease, if any.
    async fn lease_holder(&self, key: &str) -> Result<Option<String>>;
}
