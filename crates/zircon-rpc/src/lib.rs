//! RPC plumbing between zircon planes.
//!
//! The service traits ([`IChunkserver`], [`IMetadataCache`], [`IFrontend`])
//! are abstract at every call site so tests can substitute in-process
//! implementations for network clients. This crate provides both sides of
//! the substitution:
//!
//! - [`proxy`]: client-side implementations of the traits that serialize
//!   requests over a shared [`zircon_net::Transport`],
//! - [`adapter`]: server-side [`zircon_net::ServiceHandler`]s that decode
//!   requests and dispatch into a trait object,
//! - [`connection_cache`]: the [`Connections`] trait with the production
//!   per-address cache and the in-process registry used by tests.

pub mod adapter;
pub mod connection_cache;
pub mod proxy;

use std::sync::Arc;

use async_trait::async_trait;
use zircon_chunkserver::IChunkserver;
use zircon_frontend::IFrontend;
use zircon_metadata_cache::IMetadataCache;
use zircon_types::{Result, ServerAddress};

/// Client handles by address, deduplicated.
///
/// This is the only place RPC client lifecycles live; higher layers receive
/// trait objects and never dial on their own.
#[async_trait]
pub trait Connections: Send + Sync {
    async fn chunkserver(&self, addr: &ServerAddress) -> Result<Arc<dyn IChunkserver>>;
    async fn metadata_cache(&self, addr: &ServerAddress) -> Result<Arc<dyn IMetadataCache>>;
    async fn frontend(&self, addr: &ServerAddress) -> Result<Arc<dyn IFrontend>>;

    /// Tear down every open connection.
    async fn close_all(&self);
}

pub use adapter::{ChunkserverAdapter, FrontendAdapter, MetadataCacheAdapter};
pub use connection_cache::{ConnectionCache, StaticConnections};
pub use proxy::{ChunkserverProxy, FrontendProxy, MetadataCacheProxy};
