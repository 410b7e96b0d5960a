//! The client-side coordinator for chunk operations.
//!
//! A write walks the protocol end to end: resolve the metadata entry, stage
//! the data on the primary (which fans it out to the other replicas), commit
//! on every replica at the next version, compare-and-swap the entry's
//! most-recent version (the serialization point deciding races between
//! writers), advance the reader-visible version on every replica, and
//! finally raise the entry's last-consumed version. Losers of the
//! serialization CAS leave committed payloads behind on replicas; the next
//! successful advance past them prunes those orphans.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use zircon_chunkserver::IChunkserver;
use zircon_frontend::IFrontend;
use zircon_metadata_cache::IMetadataCache;
use zircon_rpc::Connections;
use zircon_types::{
    CacheCode, ChunkCode, ChunkNum, CommitHash, MetadataEntry, Result, ServerAddress, Status,
    Version, MAX_CHUNK_SIZE,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::retry::ExponentialBackoff;

/// How many ownership redirects to chase before giving up on an operation.
const MAX_REDIRECTS: u32 = 8;

/// Stored version 1 holds the zero-fill payload written at allocation, so
/// versions handed to callers count committed writes instead: a fresh chunk
/// reads back as version 0 and the first write produces version 1.
fn to_caller(stored: Version) -> Version {
    Version(stored.0.saturating_sub(1))
}

fn to_stored(caller: Version) -> Version {
    Version(caller.0 + 1)
}

fn is_transport(code: u16) -> bool {
    (2000..3000).contains(&code)
}

#[derive(Clone)]
pub struct Client {
    frontend: Arc<dyn IFrontend>,
    conns: Arc<dyn Connections>,
    config: ClientConfig,
}

impl Client {
    /// Build a client over an already-resolved frontend handle.
    pub fn new(
        frontend: Arc<dyn IFrontend>,
        conns: Arc<dyn Connections>,
        config: ClientConfig,
    ) -> Self {
        Self {
            frontend,
            conns,
            config,
        }
    }

    /// Build a client from configuration, dialing the configured frontend.
    pub async fn connect(config: ClientConfig, conns: Arc<dyn Connections>) -> ClientResult<Self> {
        let frontend = conns
            .frontend(&ServerAddress::from(config.frontend_addr.as_str()))
            .await?;
        Ok(Self::new(frontend, conns, config))
    }

    /// Tear down every connection this client holds.
    pub async fn close(&self) {
        self.conns.close_all().await;
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            self.config.retry.init_wait,
            self.config.retry.max_wait,
            self.config.retry.total_budget,
        )
    }

    // -----------------------------------------------------------------------
    // Metadata plane helpers
    // -----------------------------------------------------------------------

    async fn cache_for_chunk(&self, chunk: ChunkNum) -> ClientResult<Arc<dyn IMetadataCache>> {
        let (_, addr) = self.frontend.locate(chunk).await?;
        Ok(self.conns.metadata_cache(&addr).await?)
    }

    async fn cache_named(&self, status: &Status) -> ClientResult<Option<Arc<dyn IMetadataCache>>> {
        match status.owner() {
            Some(owner) => {
                let addr = self.frontend.resolve(owner.clone()).await?;
                Ok(Some(self.conns.metadata_cache(&addr).await?))
            }
            None => Ok(None),
        }
    }

    /// Run a metadata-cache operation, following ownership redirects and
    /// backing off on transport failures.
    async fn with_cache<T, F, Fut>(&self, chunk: ChunkNum, op: F) -> ClientResult<T>
    where
        F: Fn(Arc<dyn IMetadataCache>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff();
        let mut redirects = 0;
        let mut mdc = self.cache_for_chunk(chunk).await?;

        loop {
            match op(Arc::clone(&mdc)).await {
                Ok(value) => return Ok(value),
                Err(status) if status.code() == CacheCode::NOT_OWNER => {
                    redirects += 1;
                    if redirects > MAX_REDIRECTS {
                        return Err(ClientError::RetryExhausted(format!(
                            "chunk {}: {} ownership redirects",
                            chunk, redirects
                        )));
                    }
                    debug!(%chunk, owner = ?status.owner(), "following ownership redirect");
                    mdc = match self.cache_named(&status).await? {
                        Some(next) => next,
                        None => self.cache_for_chunk(chunk).await?,
                    };
                }
                Err(status) if is_transport(status.code()) => {
                    let Some(wait) = backoff.next_wait() else {
                        return Err(ClientError::RetryExhausted(status.to_string()));
                    };
                    tokio::time::sleep(wait).await;
                }
                Err(status) => return Err(status.into()),
            }
        }
    }

    async fn read_entry(&self, chunk: ChunkNum) -> ClientResult<MetadataEntry> {
        self.with_cache(chunk, |mdc| async move { mdc.read_entry(chunk).await })
            .await
    }

    async fn update_entry(
        &self,
        chunk: ChunkNum,
        previous: MetadataEntry,
        next: MetadataEntry,
    ) -> ClientResult<()> {
        self.with_cache(chunk, move |mdc| {
            let previous = previous.clone();
            let next = next.clone();
            async move { mdc.update_entry(chunk, previous, next).await }
        })
        .await
    }

    async fn delete_entry(&self, chunk: ChunkNum, previous: MetadataEntry) -> ClientResult<()> {
        self.with_cache(chunk, move |mdc| {
            let previous = previous.clone();
            async move { mdc.delete_entry(chunk, previous).await }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Data plane helpers
    // -----------------------------------------------------------------------

    async fn replica_addresses(&self, entry: &MetadataEntry) -> ClientResult<Vec<ServerAddress>> {
        let mut addrs = Vec::with_capacity(entry.replicas.len());
        for name in &entry.replicas {
            addrs.push(self.frontend.resolve(name.clone()).await?);
        }
        Ok(addrs)
    }

    /// Commit the staged write on every replica. Failed replicas get one
    /// retry; any replica still failing aborts the write.
    async fn commit_on_replicas(
        &self,
        chunk: ChunkNum,
        addrs: &[ServerAddress],
        hash: CommitHash,
        old_version: Version,
        new_version: Version,
    ) -> ClientResult<()> {
        let mut tasks = JoinSet::new();
        for addr in addrs {
            let conns = Arc::clone(&self.conns);
            let addr = addr.clone();
            tasks.spawn(async move {
                let result = match conns.chunkserver(&addr).await {
                    Ok(cs) => cs.commit_write(chunk, hash, old_version, new_version).await,
                    Err(e) => Err(e),
                };
                (addr, result)
            });
        }

        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((addr, Err(e))) => failed.push((addr, e)),
                Err(e) => {
                    return Err(ClientError::RetryExhausted(format!(
                        "commit task failed: {}",
                        e
                    )))
                }
            }
        }

        for (addr, first_err) in failed {
            // A competing writer owns this version on that replica; the
            // caller must diverge, not retry.
            if first_err.code() == ChunkCode::COMMIT_CONFLICT {
                return Err(first_err.into());
            }
            debug!(%chunk, %addr, error = %first_err, "retrying failed commit");
            let cs = self.conns.chunkserver(&addr).await?;
            cs.commit_write(chunk, hash, old_version, new_version)
                .await
                .map_err(|e| {
                    if e.code() == ChunkCode::COMMIT_CONFLICT {
                        ClientError::Status(e)
                    } else {
                        ClientError::Status(Status::with_message(
                            ChunkCode::REPLICATION_FAILED,
                            format!("chunk {}: commit failed on {}: {}", chunk, addr, e),
                        ))
                    }
                })?;
        }
        Ok(())
    }

    /// Advance the reader-visible version on one replica, using the version
    /// hint on a stale failure to jump a lagging replica forward.
    async fn advance_latest_on(
        &self,
        addr: &ServerAddress,
        chunk: ChunkNum,
        old_version: Version,
        new_version: Version,
    ) -> Result<()> {
        let cs = self.conns.chunkserver(addr).await?;
        match cs
            .update_latest_version(chunk, old_version, new_version)
            .await
        {
            Ok(()) => Ok(()),
            Err(status) if status.code() == ChunkCode::STALE_VERSION => {
                match status.version() {
                    Some(current) if current < new_version => {
                        cs.update_latest_version(chunk, current, new_version).await
                    }
                    _ => Err(status),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Advance the reader-visible version on every replica, retrying
    /// transient failures (the operation is idempotent under its versions).
    async fn advance_latest(
        &self,
        chunk: ChunkNum,
        addrs: &[ServerAddress],
        old_version: Version,
        new_version: Version,
    ) -> ClientResult<()> {
        for addr in addrs {
            let mut backoff = self.backoff();
            loop {
                match self
                    .advance_latest_on(addr, chunk, old_version, new_version)
                    .await
                {
                    Ok(()) => break,
                    Err(status) if is_transport(status.code()) => {
                        let Some(wait) = backoff.next_wait() else {
                            return Err(ClientError::RetryExhausted(status.to_string()));
                        };
                        tokio::time::sleep(wait).await;
                    }
                    Err(status) => return Err(status.into()),
                }
            }
        }
        Ok(())
    }

    /// Raise the entry's last-consumed version to at least `new_stored`.
    /// Safe to repeat: a concurrent writer racing past us satisfies the goal
    /// just as well.
    async fn raise_consumed(&self, chunk: ChunkNum, new_stored: Version) -> ClientResult<()> {
        loop {
            let entry = self.read_entry(chunk).await?;
            if entry.last_consumed_version >= new_stored {
                return Ok(());
            }
            let mut next = entry.clone();
            next.last_consumed_version = new_stored;
            match self.update_entry(chunk, entry, next).await {
                Ok(()) => return Ok(()),
                Err(ClientError::Status(status))
                    if status.code() == CacheCode::STALE_ENTRY =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn check_bounds(chunk: ChunkNum, offset: u32, len: usize) -> ClientResult<()> {
        if offset as u64 + len as u64 > MAX_CHUNK_SIZE as u64 {
            return Err(ClientError::Status(Status::with_message(
                ChunkCode::OUT_OF_BOUNDS,
                format!(
                    "chunk {}: range [{}, {}) exceeds chunk size {}",
                    chunk,
                    offset,
                    offset as u64 + len as u64,
                    MAX_CHUNK_SIZE
                ),
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Allocate a new chunk: a fresh number from a metadata cache, a replica
    /// set from the frontend, zero-filled payloads on every replica, and a
    /// published entry.
    pub async fn new_chunk(&self) -> ClientResult<ChunkNum> {
        // Allocate the number, following redirects from the seeded cache.
        let (_, addr) = self.frontend.pick_metadata_cache().await?;
        let mut mdc = self.conns.metadata_cache(&addr).await?;
        let mut redirects = 0;
        let chunk = loop {
            match mdc.new_entry().await {
                Ok(chunk) => break chunk,
                Err(status) if status.code() == CacheCode::NOT_OWNER => {
                    redirects += 1;
                    if redirects > MAX_REDIRECTS {
                        return Err(ClientError::RetryExhausted(
                            "chunk allocation kept redirecting".into(),
                        ));
                    }
                    mdc = match self.cache_named(&status).await? {
                        Some(next) => next,
                        None => return Err(status.into()),
                    };
                }
                Err(status) => return Err(status.into()),
            }
        };

        let replicas = self
            .frontend
            .pick_replicas(self.config.replica_count)
            .await?;

        let entry = MetadataEntry {
            most_recent_version: Version(1),
            last_consumed_version: Version(1),
            replicas: replicas.clone(),
        };
        let addrs = self.replica_addresses(&entry).await?;

        // Zero-fill every replica at the initial stored version.
        let mut added = Vec::new();
        for addr in &addrs {
            let cs = self.conns.chunkserver(addr).await?;
            if let Err(e) = cs.add(chunk, Bytes::new(), Version(1)).await {
                warn!(%chunk, %addr, error = %e, "replica allocation failed");
                // Best-effort cleanup; the chunk number itself stays burned.
                for done in &added {
                    let _ = self.cleanup_replica(done, chunk, Version(1)).await;
                }
                return Err(e.into());
            }
            added.push(addr.clone());
        }

        // Publish. A failure here leaves replicas to the same cleanup.
        if let Err(e) = self
            .update_entry(chunk, MetadataEntry::unpublished(), entry)
            .await
        {
            for done in &added {
                let _ = self.cleanup_replica(done, chunk, Version(1)).await;
            }
            return Err(e);
        }

        debug!(%chunk, replica_count = addrs.len(), "allocated chunk");
        Ok(chunk)
    }

    async fn cleanup_replica(
        &self,
        addr: &ServerAddress,
        chunk: ChunkNum,
        version: Version,
    ) -> Result<()> {
        let cs = self.conns.chunkserver(addr).await?;
        cs.delete(chunk, version).await
    }

    /// Read `length` bytes at `offset`. Returns the payload and the version
    /// it reflects. Stateless: any replica that has caught up to the entry's
    /// consumed version will do.
    pub async fn read(
        &self,
        chunk: ChunkNum,
        offset: u32,
        length: u32,
    ) -> ClientResult<(Bytes, Version)> {
        Self::check_bounds(chunk, offset, length as usize)?;

        let mut backoff = self.backoff();
        loop {
            let entry = self.read_entry(chunk).await?;
            if !entry.is_published() {
                return Err(ClientError::Status(Status::with_message(
                    CacheCode::ENTRY_NOT_FOUND,
                    format!("chunk {} has no replicas yet", chunk),
                )));
            }
            let addrs = self.replica_addresses(&entry).await?;

            let start = rand::thread_rng().gen_range(0..addrs.len());
            let mut last_failure = String::new();
            for i in 0..addrs.len() {
                let addr = &addrs[(start + i) % addrs.len()];
                let cs = match self.conns.chunkserver(addr).await {
                    Ok(cs) => cs,
                    Err(e) => {
                        last_failure = e.to_string();
                        continue;
                    }
                };
                match cs
                    .read(chunk, offset, length, entry.last_consumed_version)
                    .await
                {
                    Ok((data, _)) => {
                        return Ok((data, to_caller(entry.last_consumed_version)));
                    }
                    Err(status)
                        if status.code() == ChunkCode::STALE_VERSION
                            || is_transport(status.code()) =>
                    {
                        // Behind or unreachable; another replica may serve.
                        last_failure = status.to_string();
                    }
                    Err(status) => return Err(status.into()),
                }
            }

            let Some(wait) = backoff.next_wait() else {
                return Err(ClientError::RetryExhausted(format!(
                    "chunk {}: no replica could serve the read: {}",
                    chunk, last_failure
                )));
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Write `data` at `offset`, conditioned on `previous` being the current
    /// version (`Version::ANY` skips the check). Returns the new version.
    pub async fn write(
        &self,
        chunk: ChunkNum,
        offset: u32,
        previous: Version,
        data: Bytes,
    ) -> ClientResult<Version> {
        Self::check_bounds(chunk, offset, data.len())?;

        let mut backoff = self.backoff();
        // Candidate versions normally advance by one. When a competing
        // writer owns our candidate on some replica, we retry at a diverged
        // candidate; the loser's committed payload stays orphaned until an
        // advance passes it.
        let mut version_skip = 0u64;
        loop {
            let entry = self.read_entry(chunk).await?;
            if !entry.is_published() {
                return Err(ClientError::Status(Status::with_message(
                    CacheCode::ENTRY_NOT_FOUND,
                    format!("chunk {} has no replicas yet", chunk),
                )));
            }

            // The entry's most-recent version is the write precondition.
            if !previous.is_any() && entry.most_recent_version != to_stored(previous) {
                return Err(ClientError::StaleVersion {
                    current: to_caller(entry.most_recent_version),
                });
            }

            let addrs = self.replica_addresses(&entry).await?;
            let primary = self.conns.chunkserver(&addrs[0]).await?;
            primary
                .start_write_replicated(chunk, offset, data.clone(), addrs[1..].to_vec())
                .await?;

            let hash = CommitHash::digest(offset, &data);
            let new_stored = Version(entry.most_recent_version.0 + 1 + version_skip);
            match self
                .commit_on_replicas(chunk, &addrs, hash, entry.most_recent_version, new_stored)
                .await
            {
                Ok(()) => {}
                Err(ClientError::Status(status))
                    if status.code() == ChunkCode::COMMIT_CONFLICT =>
                {
                    let Some(wait) = backoff.next_wait() else {
                        return Err(ClientError::RetryExhausted(
                            "write kept colliding on candidate versions".into(),
                        ));
                    };
                    version_skip = rand::thread_rng().gen_range(1..(1 << 16));
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(e) => return Err(e),
            }

            // The serialization point: whoever lands this CAS owns the new
            // version.
            let mut published = entry.clone();
            published.most_recent_version = new_stored;
            match self.update_entry(chunk, entry.clone(), published).await {
                Ok(()) => {
                    // Make the version visible, then record it as consumed.
                    self.advance_latest(chunk, &addrs, entry.last_consumed_version, new_stored)
                        .await?;
                    self.raise_consumed(chunk, new_stored).await?;
                    return Ok(to_caller(new_stored));
                }
                Err(ClientError::Status(status))
                    if status.code() == CacheCode::STALE_ENTRY =>
                {
                    // Another writer won; our committed payload on the
                    // replicas is orphaned until an advance past it.
                    if previous.is_any() {
                        let Some(wait) = backoff.next_wait() else {
                            return Err(ClientError::RetryExhausted(
                                "write kept losing the version race".into(),
                            ));
                        };
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    let current = match self.read_entry(chunk).await {
                        Ok(now) => now.most_recent_version,
                        Err(_) => status.version().unwrap_or(new_stored),
                    };
                    return Err(ClientError::StaleVersion {
                        current: to_caller(current),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete the chunk at its current version: tombstone the entry, then
    /// remove the payloads. Replica removals that fail are left to the
    /// control plane's reconciliation against `list_all_chunks`.
    pub async fn delete(&self, chunk: ChunkNum, version: Version) -> ClientResult<()> {
        let entry = self.read_entry(chunk).await?;
        let stored = to_stored(version);
        if entry.last_consumed_version != stored {
            return Err(ClientError::StaleVersion {
                current: to_caller(entry.most_recent_version),
            });
        }

        let addrs = self.replica_addresses(&entry).await?;
        match self.delete_entry(chunk, entry).await {
            Ok(()) => {}
            Err(ClientError::Status(status)) if status.code() == CacheCode::STALE_ENTRY => {
                return Err(ClientError::StaleVersion {
                    current: status.version().map(to_caller).unwrap_or(version),
                });
            }
            Err(e) => return Err(e),
        }

        for addr in &addrs {
            if let Err(e) = self.cleanup_replica(addr, chunk, stored).await {
                warn!(%chunk, %addr, error = %e, "replica removal failed after tombstone");
            }
        }
        Ok(())
    }
}
