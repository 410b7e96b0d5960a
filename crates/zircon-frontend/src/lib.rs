//! Frontend router for zircon.
//!
//! The frontend answers one question for clients: for a given chunk, which
//! metadata cache owns the entry, and which chunkservers are alive to hold
//! replicas. It is a thin read-mostly layer over the coordination service's
//! role registry and ownership leases; it never touches chunk data.

pub mod service;

use async_trait::async_trait;
use zircon_service_derive::{method, zircon_service};
use zircon_types::{ChunkNum, Result, ServerAddress, ServerName};

/// The frontend RPC interface.
#[zircon_service(id = 3, name = "Frontend")]
#[async_trait]
pub trait IFrontend: Send + Sync {
    /// Name and address of the metadata cache responsible for `chunk`.
    ///
    /// Prefers the live ownership-lease holder; with no lease outstanding,
    /// assigns deterministically over the registered caches so every client
    /// converges on the same first owner.
    #[method(id = 1)]
    async fn locate(&self, chunk: ChunkNum) -> Result<(ServerName, ServerAddress)>;

    /// Sample `count` distinct live chunkservers for a new chunk's replica
    /// set.
    #[method(id = 2)]
    async fn pick_replicas(&self, count: u32) -> Result<Vec<ServerName>>;

    /// Resolve a logical server name to its current address.
    #[method(id = 3)]
    async fn resolve(&self, name: ServerName) -> Result<ServerAddress>;

    /// Enumerate registered chunkservers.
    #[method(id = 4)]
    async fn list_chunkservers(&self) -> Result<Vec<(ServerName, ServerAddress)>>;

    /// A metadata cache to direct chunk allocation at. The chosen cache may
    /// redirect if the allocated number lands in a range owned elsewhere.
    #[method(id = 5)]
    async fn pick_metadata_cache(&self) -> Result<(ServerName, ServerAddress)>;
}

pub use service::FrontendImpl;

// Re-export the generated service metadata module.
pub use i_frontend_service_meta as frontend_service_meta;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_meta_constants() {
        assert_eq!(frontend_service_meta::SERVICE_ID, 3);
        assert_eq!(frontend_service_meta::SERVICE_NAME, "Frontend");
    }

    #[test]
    fn test_method_ids() {
        use frontend_service_meta::MethodId;

        assert_eq!(MethodId::Locate.as_u16(), 1);
        assert_eq!(MethodId::PickReplicas.as_u16(), 2);
        assert_eq!(MethodId::from_u16(4), Some(MethodId::ListChunkservers));
        assert_eq!(MethodId::PickMetadataCache.as_u16(), 5);
    }
}
