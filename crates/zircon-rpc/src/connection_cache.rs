//! Connection caches: one RPC client handle per address.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use zircon_chunkserver::{ChunkserverDialer, IChunkserver};
use zircon_frontend::IFrontend;
use zircon_metadata_cache::IMetadataCache;
use zircon_net::RpcClient;
use zircon_net_tcp::{TcpConnector, TcpSocket};
use zircon_types::{RPCCode, Result, ServerAddress, Status};

use crate::proxy::{ChunkserverProxy, FrontendProxy, MetadataCacheProxy};
use crate::Connections;

/// Default per-call deadline for cached clients.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Production cache (TCP)
// ---------------------------------------------------------------------------

/// The production [`Connections`] implementation.
///
/// A single [`RpcClient`] (and its transport) underlies every proxy, so each
/// address has at most one TCP connection regardless of how many planes talk
/// to it. Proxy objects themselves are cheap and cached per address per
/// role.
pub struct ConnectionCache {
    rpc: Arc<RpcClient<TcpSocket>>,
    connector: Arc<TcpConnector>,
    deadline: Duration,
    chunkservers: DashMap<ServerAddress, Arc<dyn IChunkserver>>,
    caches: DashMap<ServerAddress, Arc<dyn IMetadataCache>>,
    frontends: DashMap<ServerAddress, Arc<dyn IFrontend>>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::with_deadline(DEFAULT_DEADLINE)
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            rpc: Arc::new(RpcClient::default()),
            connector: Arc::new(TcpConnector),
            deadline,
            chunkservers: DashMap::new(),
            caches: DashMap::new(),
            frontends: DashMap::new(),
        }
    }
}

impl Default for ConnectionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connections for ConnectionCache {
    async fn chunkserver(&self, addr: &ServerAddress) -> Result<Arc<dyn IChunkserver>> {
        if let Some(proxy) = self.chunkservers.get(addr) {
            return Ok(Arc::clone(proxy.value()));
        }
        let proxy: Arc<dyn IChunkserver> = Arc::new(ChunkserverProxy::new(
            Arc::clone(&self.rpc),
            Arc::clone(&self.connector) as _,
            addr.clone(),
            self.deadline,
        ));
        self.chunkservers.insert(addr.clone(), Arc::clone(&proxy));
        Ok(proxy)
    }

    async fn metadata_cache(&self, addr: &ServerAddress) -> Result<Arc<dyn IMetadataCache>> {
        if let Some(proxy) = self.caches.get(addr) {
            return Ok(Arc::clone(proxy.value()));
        }
        let proxy: Arc<dyn IMetadataCache> = Arc::new(MetadataCacheProxy::new(
            Arc::clone(&self.rpc),
            Arc::clone(&self.connector) as _,
            addr.clone(),
            self.deadline,
        ));
        self.caches.insert(addr.clone(), Arc::clone(&proxy));
        Ok(proxy)
    }

    async fn frontend(&self, addr: &ServerAddress) -> Result<Arc<dyn IFrontend>> {
        if let Some(proxy) = self.frontends.get(addr) {
            return Ok(Arc::clone(proxy.value()));
        }
        let proxy: Arc<dyn IFrontend> = Arc::new(FrontendProxy::new(
            Arc::clone(&self.rpc),
            Arc::clone(&self.connector) as _,
            addr.clone(),
            self.deadline,
        ));
        self.frontends.insert(addr.clone(), Arc::clone(&proxy));
        Ok(proxy)
    }

    async fn close_all(&self) {
        self.chunkservers.clear();
        self.caches.clear();
        self.frontends.clear();
        self.rpc.transport().close_all().await;
    }
}

#[async_trait]
impl ChunkserverDialer for ConnectionCache {
    async fn chunkserver(&self, addr: &ServerAddress) -> Result<Arc<dyn IChunkserver>> {
        Connections::chunkserver(self, addr).await
    }
}

// ---------------------------------------------------------------------------
// In-process registry
// ---------------------------------------------------------------------------

/// A [`Connections`] over directly registered trait objects.
///
/// Tests wire a whole cluster in one process with this; nothing crosses a
/// socket, but every call site goes through the same trait surface as
/// production.
#[derive(Default)]
pub struct StaticConnections {
    chunkservers: DashMap<ServerAddress, Arc<dyn IChunkserver>>,
    caches: DashMap<ServerAddress, Arc<dyn IMetadataCache>>,
    frontends: DashMap<ServerAddress, Arc<dyn IFrontend>>,
}

impl StaticConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunkserver(&self, addr: ServerAddress, server: Arc<dyn IChunkserver>) {
        self.chunkservers.insert(addr, server);
    }

    pub fn add_metadata_cache(&self, addr: ServerAddress, cache: Arc<dyn IMetadataCache>) {
        self.caches.insert(addr, cache);
    }

    pub fn add_frontend(&self, addr: ServerAddress, frontend: Arc<dyn IFrontend>) {
        self.frontends.insert(addr, frontend);
    }
}

fn not_connected(kind: &str, addr: &ServerAddress) -> Status {
    Status::with_message(
        RPCCode::CONNECT_FAILED,
        format!("no {} registered at {}", kind, addr),
    )
}

#[async_trait]
impl Connections for StaticConnections {
    async fn chunkserver(&self, addr: &ServerAddress) -> Result<Arc<dyn IChunkserver>> {
        self.chunkservers
            .get(addr)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| not_connected("chunkserver", addr))
    }

    async fn metadata_cache(&self, addr: &ServerAddress) -> Result<Arc<dyn IMetadataCache>> {
        self.caches
            .get(addr)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| not_connected("metadata cache", addr))
    }

    async fn frontend(&self, addr: &ServerAddress) -> Result<Arc<dyn IFrontend>> {
        self.frontends
            .get(addr)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| not_connected("frontend", addr))
    }

    async fn close_all(&self) {}
}

#[async_trait]
impl ChunkserverDialer for StaticConnections {
    async fn chunkserver(&self, addr: &ServerAddress) -> Result<Arc<dyn IChunkserver>> {
        Connections::chunkserver(self, addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ChunkserverAdapter, MetadataCacheAdapter};
    use bytes::Bytes;
    use zircon_chunkserver::{ChunkStore, ChunkserverServiceImpl};
    use zircon_coord::MemCoordinator;
    use zircon_metadata_cache::{CacheConfig, MetadataCacheImpl};
    use zircon_net::Server;
    use zircon_net_tcp::TcpListener;
    use zircon_types::{
        CacheCode, ChunkCode, ChunkNum, CommitHash, MetadataEntry, ServerName, Version,
    };

    const TEST_SIZE: u32 = 4096;

    /// Serve a chunkserver over real TCP and return its address.
    async fn publish_chunkserver(conns: Arc<StaticConnections>) -> (ServerAddress, Server) {
        let store = Arc::new(ChunkStore::with_max_chunk_size(TEST_SIZE));
        let service = Arc::new(ChunkserverServiceImpl::new(store, conns as _));

        let listener = TcpListener::bind(&ServerAddress::from("127.0.0.1:0"))
            .await
            .unwrap();
        let addr = zircon_net::Listener::local_addr(&listener);

        let mut server = Server::new();
        server.register_service(Box::new(ChunkserverAdapter::new(service as _)));
        server.start(listener);
        (addr, server)
    }

    #[tokio::test]
    async fn test_chunkserver_over_tcp() {
        let (addr, mut server) = publish_chunkserver(Arc::new(StaticConnections::new())).await;

        let cache = ConnectionCache::new();
        let cs = Connections::chunkserver(&cache, &addr).await.unwrap();

        let chunk = ChunkNum(73);
        cs.add(chunk, Bytes::from_static(b"quest"), Version(1))
            .await
            .unwrap();
        cs.start_write(chunk, 5, Bytes::from_static(b"ing"))
            .await
            .unwrap();
        cs.commit_write(
            chunk,
            CommitHash::digest(5, b"ing"),
            Version(1),
            Version(2),
        )
        .await
        .unwrap();
        cs.update_latest_version(chunk, Version(1), Version(2))
            .await
            .unwrap();

        let (data, version) = cs.read(chunk, 0, 8, Version(2)).await.unwrap();
        assert_eq!(&data[..], b"questing");
        assert_eq!(version, Version(2));

        let chunks = cs.list_all_chunks().await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].version, Version(2));

        cs.delete(chunk, Version(2)).await.unwrap();

        cache.close_all().await;
        server.stop();
    }

    #[tokio::test]
    async fn test_error_hints_cross_the_wire() {
        let (addr, mut server) = publish_chunkserver(Arc::new(StaticConnections::new())).await;

        let cache = ConnectionCache::new();
        let cs = Connections::chunkserver(&cache, &addr).await.unwrap();

        let chunk = ChunkNum(75);
        cs.add(chunk, Bytes::new(), Version(6)).await.unwrap();

        // A stale read carries the server's version back to the caller.
        let err = cs.read(chunk, 0, 1, Version(59)).await.unwrap_err();
        assert_eq!(err.code(), ChunkCode::STALE_VERSION);
        assert_eq!(err.version(), Some(Version(6)));

        // Not-found errors survive the envelope too.
        let err = cs.read(ChunkNum(404), 0, 1, Version::ANY).await.unwrap_err();
        assert_eq!(err.code(), ChunkCode::CHUNK_NOT_FOUND);

        cache.close_all().await;
        server.stop();
    }

    #[tokio::test]
    async fn test_replicated_staging_across_tcp_servers() {
        // Two chunkservers over TCP; the primary dials the secondary through
        // its own connection cache when forwarding staged writes.
        let dialer = Arc::new(ConnectionCache::new());

        let store_a = Arc::new(ChunkStore::with_max_chunk_size(TEST_SIZE));
        let service_a = Arc::new(ChunkserverServiceImpl::new(
            Arc::clone(&store_a),
            Arc::clone(&dialer) as _,
        ));
        let listener_a = TcpListener::bind(&ServerAddress::from("127.0.0.1:0"))
            .await
            .unwrap();
        let addr_a = zircon_net::Listener::local_addr(&listener_a);
        let mut server_a = Server::new();
        server_a.register_service(Box::new(ChunkserverAdapter::new(
            Arc::clone(&service_a) as _
        )));
        server_a.start(listener_a);

        let store_b = Arc::new(ChunkStore::with_max_chunk_size(TEST_SIZE));
        let service_b = Arc::new(ChunkserverServiceImpl::new(
            Arc::clone(&store_b),
            Arc::clone(&dialer) as _,
        ));
        let listener_b = TcpListener::bind(&ServerAddress::from("127.0.0.1:0"))
            .await
            .unwrap();
        let addr_b = zircon_net::Listener::local_addr(&listener_b);
        let mut server_b = Server::new();
        server_b.register_service(Box::new(ChunkserverAdapter::new(
            Arc::clone(&service_b) as _
        )));
        server_b.start(listener_b);

        let chunk = ChunkNum(9);
        let client_cache = ConnectionCache::new();
        let primary = Connections::chunkserver(&client_cache, &addr_a).await.unwrap();
        let secondary = Connections::chunkserver(&client_cache, &addr_b).await.unwrap();

        primary.add(chunk, Bytes::new(), Version(1)).await.unwrap();
        secondary.add(chunk, Bytes::new(), Version(1)).await.unwrap();

        primary
            .start_write_replicated(
                chunk,
                0,
                Bytes::from_static(b"fan out"),
                vec![addr_b.clone()],
            )
            .await
            .unwrap();

        // Both replicas can commit the same staged hash.
        let hash = CommitHash::digest(0, b"fan out");
        primary
            .commit_write(chunk, hash, Version(1), Version(2))
            .await
            .unwrap();
        secondary
            .commit_write(chunk, hash, Version(1), Version(2))
            .await
            .unwrap();

        client_cache.close_all().await;
        dialer.close_all().await;
        server_a.stop();
        server_b.stop();
    }

    #[tokio::test]
    async fn test_metadata_cache_over_tcp() {
        let coord = Arc::new(MemCoordinator::new());
        let config = CacheConfig {
            name: "mdc0".into(),
            ..CacheConfig::default()
        };
        let mdc = Arc::new(MetadataCacheImpl::new(&config, coord as _));

        let listener = TcpListener::bind(&ServerAddress::from("127.0.0.1:0"))
            .await
            .unwrap();
        let addr = zircon_net::Listener::local_addr(&listener);
        let mut server = Server::new();
        server.register_service(Box::new(MetadataCacheAdapter::new(mdc as _)));
        server.start(listener);

        let cache = ConnectionCache::new();
        let proxy = cache.metadata_cache(&addr).await.unwrap();

        let chunk = proxy.new_entry().await.unwrap();
        let published = MetadataEntry {
            most_recent_version: Version(1),
            last_consumed_version: Version(1),
            replicas: vec![ServerName::from("cs0"), ServerName::from("cs1")],
        };
        proxy
            .update_entry(chunk, MetadataEntry::unpublished(), published.clone())
            .await
            .unwrap();
        assert_eq!(proxy.read_entry(chunk).await.unwrap(), published);

        // CAS failure and its version hint survive the wire.
        let err = proxy
            .update_entry(chunk, MetadataEntry::unpublished(), published.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), CacheCode::STALE_ENTRY);
        assert_eq!(err.version(), Some(Version(1)));

        proxy.delete_entry(chunk, published).await.unwrap();
        let err = proxy.read_entry(chunk).await.unwrap_err();
        assert_eq!(err.code(), CacheCode::ENTRY_NOT_FOUND);

        cache.close_all().await;
        server.stop();
    }

    #[tokio::test]
    async fn test_static_connections_lookup() {
        let conns = StaticConnections::new();
        let addr = ServerAddress::from("cs-addr-0");

        let err = match Connections::chunkserver(&conns, &addr).await {
            Ok(_) => panic!("expected chunkserver lookup to fail"),
            Err(err) => err,
        };
        assert_eq!(err.code(), RPCCode::CONNECT_FAILED);

        let store = Arc::new(ChunkStore::with_max_chunk_size(TEST_SIZE));
        let service = Arc::new(ChunkserverServiceImpl::new(
            store,
            Arc::new(StaticConnections::new()) as _,
        ));
        conns.add_chunkserver(addr.clone(), service as _);
        assert!(Connections::chunkserver(&conns, &addr).await.is_ok());
    }
}
