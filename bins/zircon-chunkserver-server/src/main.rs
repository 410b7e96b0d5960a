use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use zircon_chunkserver::{ChunkStore, ChunkserverConfig, ChunkserverServiceImpl};
use zircon_coord::{Coordinator, MemCoordinator, RoleRegistry, ServerRole};
use zircon_net::Server;
use zircon_net_tcp::TcpListener;
use zircon_rpc::{ChunkserverAdapter, ConnectionCache};
use zircon_types::{ServerAddress, ServerName};
use zircon_utils::BackgroundRunner;

/// Zircon chunkserver
#[derive(Parser, Debug)]
#[command(name = "zircon-chunkserver-server", version, about)]
struct Args {
    /// Logical server name to register under
    #[arg(long, default_value = "cs0")]
    name: String,

    /// Address to listen on (port 0 picks a free port)
    #[arg(long, default_value = "0.0.0.0:9600")]
    listen: String,

    /// Coordination service endpoint
    #[arg(long, default_value = "127.0.0.1:2379")]
    coordinator: String,

    /// Seconds between staged-write GC sweeps
    #[arg(long, default_value_t = 30)]
    gc_interval_secs: u64,

    /// Seconds a staged write may wait for its commit
    #[arg(long, default_value_t = 300)]
    prepared_write_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ChunkserverConfig {
        name: args.name.clone(),
        listen_addr: args.listen.clone(),
        coordinator_endpoints: vec![args.coordinator.clone()],
        gc_interval: Duration::from_secs(args.gc_interval_secs),
        prepared_write_ttl: Duration::from_secs(args.prepared_write_ttl_secs),
    };

    tracing::info!(name = %config.name, listen = %config.listen_addr, "starting chunkserver");

    // TODO: dial an external coordination service at `config.coordinator_endpoints`
    // once a production Coordinator client lands; the in-process one below
    // only serves single-node deployments.
    let coord: Arc<dyn Coordinator> = Arc::new(MemCoordinator::new());

    let store = Arc::new(ChunkStore::new());
    let dialer = Arc::new(ConnectionCache::new());
    let service = Arc::new(ChunkserverServiceImpl::new(Arc::clone(&store), dialer));

    let listener = TcpListener::bind(&ServerAddress::from(config.listen_addr.as_str())).await?;
    let bound = zircon_net::Listener::local_addr(&listener);

    let registry = RoleRegistry::new(coord);
    registry
        .register(
            &ServerName::from(config.name.as_str()),
            &bound,
            ServerRole::Chunkserver,
        )
        .await?;

    let mut server = Server::new();
    server.register_service(Box::new(ChunkserverAdapter::new(service as _)));
    server.start(listener);

    // Periodic reclamation of staged writes whose commit never arrived.
    let mut runner = BackgroundRunner::new();
    let sweep_store = Arc::clone(&store);
    let ttl = config.prepared_write_ttl;
    runner.spawn_periodic(config.gc_interval, move || {
        let store = Arc::clone(&sweep_store);
        async move {
            let dropped = store.sweep_expired_prepared(ttl);
            if dropped > 0 {
                tracing::info!(dropped, "expired staged writes");
            }
        }
    });

    tracing::info!(%bound, "chunkserver serving");
    tokio::signal::ctrl_c().await?;
    tracing::info!("chunkserver shutting down");

    runner.shutdown().await;
    server.stop();
    Ok(())
}
