use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use zircon_coord::{Coordinator, MemCoordinator, RoleRegistry, ServerRole};
use zircon_metadata_cache::{CacheConfig, MetadataCacheImpl};
use zircon_net::Server;
use zircon_net_tcp::TcpListener;
use zircon_rpc::MetadataCacheAdapter;
use zircon_types::{ServerAddress, ServerName};
use zircon_utils::BackgroundRunner;

/// Zircon metadata cache server
#[derive(Parser, Debug)]
#[command(name = "zircon-metadata-server", version, about)]
struct Args {
    /// Logical server name to register under
    #[arg(long, default_value = "mdc0")]
    name: String,

    /// Address to listen on (port 0 picks a free port)
    #[arg(long, default_value = "0.0.0.0:9700")]
    listen: String,

    /// Coordination service endpoint
    #[arg(long, default_value = "127.0.0.1:2379")]
    coordinator: String,

    /// Seconds an ownership lease lives between renewals
    #[arg(long, default_value_t = 30)]
    lease_ttl_secs: u64,

    /// Seconds between lease renewals
    #[arg(long, default_value_t = 10)]
    renew_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = CacheConfig {
        name: args.name.clone(),
        listen_addr: args.listen.clone(),
        coordinator_endpoints: vec![args.coordinator.clone()],
        lease_ttl: Duration::from_secs(args.lease_ttl_secs),
        renew_interval: Duration::from_secs(args.renew_interval_secs),
    };

    tracing::info!(name = %config.name, listen = %config.listen_addr, "starting metadata cache");

    // TODO: dial an external coordination service at `config.coordinator_endpoints`
    // once a production Coordinator client lands; the in-process one below
    // only serves single-node deployments.
    let coord: Arc<dyn Coordinator> = Arc::new(MemCoordinator::new());

    let cache = Arc::new(MetadataCacheImpl::new(&config, Arc::clone(&coord)));

    let listener = TcpListener::bind(&ServerAddress::from(config.listen_addr.as_str())).await?;
    let bound = zircon_net::Listener::local_addr(&listener);

    let registry = RoleRegistry::new(coord);
    registry
        .register(
            &ServerName::from(config.name.as_str()),
            &bound,
            ServerRole::MetadataCache,
        )
        .await?;

    let mut server = Server::new();
    server.register_service(Box::new(MetadataCacheAdapter::new(
        Arc::clone(&cache) as _
    )));
    server.start(listener);

    // Keep held ownership leases renewed.
    let mut runner = BackgroundRunner::new();
    let renew_cache = Arc::clone(&cache);
    runner.spawn_periodic(config.renew_interval, move || {
        let cache = Arc::clone(&renew_cache);
        async move {
            cache.ownership().renew_held().await;
        }
    });

    tracing::info!(%bound, "metadata cache serving");
    tokio::signal::ctrl_c().await?;
    tracing::info!("metadata cache shutting down");

    // Hand off ownership cooperatively before exiting.
    cache.ownership().release_all().await;
    runner.shutdown().await;
    server.stop();
    Ok(())
}
