//! Chunkserver service implementation.
//!
//! [`ChunkserverServiceImpl`] implements [`IChunkserver`] by delegating the
//! per-chunk operations to a [`ChunkStore`] and using a
//! [`ChunkserverDialer`] for the two operations that talk to other
//! chunkservers: staged-write fan-out and healing. Store access and network
//! calls never overlap; the store's critical sections stay short.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use zircon_types::{
    make_error_msg, ChunkCode, ChunkNum, ChunkVersion, CommitHash, Result, ServerAddress, Version,
};

use crate::chunk_store::ChunkStore;
use crate::{ChunkserverDialer, IChunkserver};

/// Concrete implementation of the chunkserver service trait.
#[derive(Clone)]
pub struct ChunkserverServiceImpl {
    store: Arc<ChunkStore>,
    dialer: Arc<dyn ChunkserverDialer>,
}

impl ChunkserverServiceImpl {
    /// Create a new service over the given store and peer dialer.
    pub fn new(store: Arc<ChunkStore>, dialer: Arc<dyn ChunkserverDialer>) -> Self {
        Self { store, dialer }
    }

    /// Return a reference to the underlying chunk store.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    async fn forward_staged_write(
        &self,
        chunk: ChunkNum,
        offset: u32,
        data: Bytes,
        replicas: Vec<ServerAddress>,
    ) -> Result<()> {
        let mut tasks = JoinSet::new();
        for addr in replicas {
            let dialer = Arc::clone(&self.dialer);
            let data = data.clone();
            tasks.spawn(async move {
                let result = match dialer.chunkserver(&addr).await {
                    Ok(peer) => peer.start_write(chunk, offset, data).await,
                    Err(e) => Err(e),
                };
                (addr, result)
            });
        }

        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((addr, Err(e))) => {
                    warn!(%chunk, %addr, error = %e, "replica failed to stage write");
                    failed.push(format!("{}: {}", addr, e));
                }
                Err(e) => failed.push(format!("forwarding task failed: {}", e)),
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            // Staged data left on the replicas that did succeed is keyed by
            // the same hash, so a retry collapses onto it and GC reclaims it
            // otherwise.
            make_error_msg(
                ChunkCode::REPLICATION_FAILED,
                format!("chunk {}: staging failed on {}", chunk, failed.join("; ")),
            )
        }
    }
}

#[async_trait]
impl IChunkserver for ChunkserverServiceImpl {
    async fn read(
        &self,
        chunk: ChunkNum,
        offset: u32,
        length: u32,
        minimum: Version,
    ) -> Result<(Bytes, Version)> {
        debug!(%chunk, offset, length, %minimum, "read");
        self.store.read(chunk, offset, length, minimum)
    }

    async fn start_write(&self, chunk: ChunkNum, offset: u32, data: Bytes) -> Result<()> {
        debug!(%chunk, offset, data_len = data.len(), "start_write");
        self.store.start_write(chunk, offset, data)?;
        Ok(())
    }

    async fn start_write_replicated(
        &self,
        chunk: ChunkNum,
        offset: u32,
        data: Bytes,
        replicas: Vec<ServerAddress>,
    ) -> Result<()> {
        debug!(
            %chunk,
            offset,
            data_len = data.len(),
            replica_count = replicas.len(),
            "start_write_replicated"
        );
        // Stage locally first; a local failure means nothing was sent.
        self.store.start_write(chunk, offset, data.clone())?;

        if replicas.is_empty() {
            return Ok(());
        }
        self.forward_staged_write(chunk, offset, data, replicas).await
    }

    async fn commit_write(
        &self,
        chunk: ChunkNum,
        hash: CommitHash,
        old_version: Version,
        new_version: Version,
    ) -> Result<()> {
        debug!(%chunk, %hash, %old_version, %new_version, "commit_write");
        self.store.commit_write(chunk, hash, old_version, new_version)
    }

    async fn update_latest_version(
        &self,
        chunk: ChunkNum,
        old_version: Version,
        new_version: Version,
    ) -> Result<()> {
        debug!(%chunk, %old_version, %new_version, "update_latest_version");
        self.store.update_latest_version(chunk, old_version, new_version)
    }

    async fn replicate(
        &self,
        chunk: ChunkNum,
        address: ServerAddress,
        version: Version,
    ) -> Result<()> {
        debug!(%chunk, %address, %version, "replicate");
        let payload = self.store.read_version(chunk, version)?;
        let peer = self.dialer.chunkserver(&address).await?;
        peer.add(chunk, payload, version).await
    }

    async fn add(
        &self,
        chunk: ChunkNum,
        initial_data: Bytes,
        initial_version: Version,
    ) -> Result<()> {
        debug!(%chunk, data_len = initial_data.len(), %initial_version, "add");
        self.store.add(chunk, initial_data, initial_version)
    }

    async fn delete(&self, chunk: ChunkNum, version: Version) -> Result<()> {
        debug!(%chunk, %version, "delete");
        match self.store.delete(chunk, version) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(%chunk, %version, error = %e, "delete failed");
                Err(e)
            }
        }
    }

    async fn list_all_chunks(&self) -> Result<Vec<ChunkVersion>> {
        Ok(self.store.list_all_chunks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    const TEST_SIZE: u32 = 1024;

    /// Dialer over a map of in-process chunkservers.
    #[derive(Default)]
    struct StaticDialer {
        servers: DashMap<ServerAddress, Arc<dyn IChunkserver>>,
    }

    #[async_trait]
    impl ChunkserverDialer for StaticDialer {
        async fn chunkserver(&self, addr: &ServerAddress) -> Result<Arc<dyn IChunkserver>> {
            self.servers
                .get(addr)
                .map(|s| Arc::clone(s.value()))
                .ok_or_else(|| {
                    zircon_types::Status::with_message(
                        zircon_types::RPCCode::CONNECT_FAILED,
                        format!("no chunkserver at {}", addr),
                    )
                })
        }
    }

    fn cluster(count: usize) -> (Vec<ChunkserverServiceImpl>, Vec<ServerAddress>) {
        let dialer = Arc::new(StaticDialer::default());
        let mut servers = Vec::new();
        let mut addrs = Vec::new();
        for i in 0..count {
            let addr = ServerAddress::from(format!("cs-{}:9000", i).as_str());
            let service = ChunkserverServiceImpl::new(
                Arc::new(ChunkStore::with_max_chunk_size(TEST_SIZE)),
                Arc::clone(&dialer) as Arc<dyn ChunkserverDialer>,
            );
            dialer
                .servers
                .insert(addr.clone(), Arc::new(service.clone()) as Arc<dyn IChunkserver>);
            servers.push(service);
            addrs.push(addr);
        }
        (servers, addrs)
    }

    #[tokio::test]
    async fn test_write_commit_read_cycle() {
        let (servers, _) = cluster(1);
        let cs = &servers[0];
        let chunk = ChunkNum(7);

        cs.add(chunk, Bytes::new(), Version(1)).await.unwrap();
        cs.start_write(chunk, 0, Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let hash = CommitHash::digest(0, b"hello");
        cs.commit_write(chunk, hash, Version(1), Version(2))
            .await
            .unwrap();
        cs.update_latest_version(chunk, Version(1), Version(2))
            .await
            .unwrap();

        let (data, version) = cs.read(chunk, 0, 5, Version(2)).await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert_eq!(version, Version(2));
    }

    #[tokio::test]
    async fn test_start_write_replicated_stages_everywhere() {
        let (servers, addrs) = cluster(3);
        let chunk = ChunkNum(73);
        for cs in &servers {
            cs.add(chunk, Bytes::new(), Version(1)).await.unwrap();
        }

        servers[0]
            .start_write_replicated(
                chunk,
                55,
                Bytes::from_static(b"this is a hello\x00 world!!\n"),
                addrs[1..].to_vec(),
            )
            .await
            .unwrap();

        // Every replica can now commit the same hash.
        let hash = CommitHash::digest(55, b"this is a hello\x00 world!!\n");
        for cs in &servers {
            cs.commit_write(chunk, hash, Version(1), Version(2))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_start_write_replicated_reports_failed_replica() {
        let (servers, mut addrs) = cluster(2);
        let chunk = ChunkNum(1);
        for cs in &servers {
            cs.add(chunk, Bytes::new(), Version(1)).await.unwrap();
        }
        addrs.push(ServerAddress::from("unreachable:1"));

        let err = servers[0]
            .start_write_replicated(chunk, 0, Bytes::from_static(b"|||"), addrs[1..].to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ChunkCode::REPLICATION_FAILED);
        assert!(err.message().unwrap_or("").contains("unreachable:1"));
    }

    #[tokio::test]
    async fn test_start_write_replicated_missing_chunk_on_peer() {
        let (servers, addrs) = cluster(2);
        let chunk = ChunkNum(2);
        // Only the primary holds the chunk.
        servers[0].add(chunk, Bytes::new(), Version(1)).await.unwrap();

        let err = servers[0]
            .start_write_replicated(chunk, 0, Bytes::from_static(b"data"), addrs[1..].to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ChunkCode::REPLICATION_FAILED);
    }

    #[tokio::test]
    async fn test_replicate_heals_target() {
        let (servers, addrs) = cluster(2);
        let chunk = ChunkNum(74);

        servers[0]
            .add(chunk, Bytes::from_static(b"payload"), Version(56))
            .await
            .unwrap();

        servers[0]
            .replicate(chunk, addrs[1].clone(), Version(56))
            .await
            .unwrap();

        let (data, version) = servers[1].read(chunk, 0, 7, Version(56)).await.unwrap();
        assert_eq!(&data[..], b"payload");
        assert_eq!(version, Version(56));
    }

    #[tokio::test]
    async fn test_replicate_requires_local_version() {
        let (servers, addrs) = cluster(2);
        let chunk = ChunkNum(74);
        servers[0]
            .add(chunk, Bytes::new(), Version(1))
            .await
            .unwrap();

        let err = servers[0]
            .replicate(chunk, addrs[1].clone(), Version(9))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ChunkCode::VERSION_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_all_chunks() {
        let (servers, _) = cluster(1);
        servers[0]
            .add(ChunkNum(81), Bytes::new(), Version(68))
            .await
            .unwrap();
        servers[0]
            .add(ChunkNum(82), Bytes::new(), Version(69))
            .await
            .unwrap();

        let mut chunks = servers[0].list_all_chunks().await.unwrap();
        chunks.sort_by_key(|cv| cv.chunk);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk, ChunkNum(81));
        assert_eq!(chunks[1].version, Version(69));
    }
}
