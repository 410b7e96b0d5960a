//! Frontend implementation over the coordination service.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::debug;

use zircon_coord::{Coordinator, RoleRegistry, ServerRole};
use zircon_metadata_cache::{owner_lease_key, range_of};
use zircon_types::{
    make_error_msg, ChunkNum, CoordCode, Result, ServerAddress, ServerName, StatusCode,
};

pub struct FrontendImpl {
    coord: Arc<dyn Coordinator>,
    registry: RoleRegistry,
}

impl FrontendImpl {
    pub fn new(coord: Arc<dyn Coordinator>) -> Self {
        let registry = RoleRegistry::new(Arc::clone(&coord));
        Self { coord, registry }
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }
}

#[async_trait]
impl crate::IFrontend for FrontendImpl {
    async fn locate(&self, chunk: ChunkNum) -> Result<(ServerName, ServerAddress)> {
        // A live lease holder is authoritative.
        let key = owner_lease_key(range_of(chunk));
        if let Some(holder) = self.coord.lease_holder(&key).await? {
            let name = ServerName(holder);
            let address = self.registry.resolve(&name).await?;
            debug!(%chunk, %name, "located owner by lease");
            return Ok((name, address));
        }

        // No lease yet: deterministic assignment over the registered caches
        // so concurrent clients agree on who should take the range.
        let mut caches = self.registry.list_role(ServerRole::MetadataCache).await?;
        if caches.is_empty() {
            return make_error_msg(
                CoordCode::KEY_NOT_FOUND,
                "no metadata caches registered".to_string(),
            );
        }
        caches.sort_by(|a, b| a.0.cmp(&b.0));
        let index = (range_of(chunk) % caches.len() as u64) as usize;
        let (name, address) = caches.swap_remove(index);
        debug!(%chunk, %name, "located owner by assignment");
        Ok((name, address))
    }

    async fn pick_replicas(&self, count: u32) -> Result<Vec<ServerName>> {
        let servers = self.registry.list_role(ServerRole::Chunkserver).await?;
        if servers.len() < count as usize {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!(
                    "need {} replicas but only {} chunkservers are registered",
                    count,
                    servers.len()
                ),
            );
        }

        let mut names: Vec<ServerName> = servers.into_iter().map(|(name, _)| name).collect();
        names.shuffle(&mut rand::thread_rng());
        names.truncate(count as usize);
        Ok(names)
    }

    async fn resolve(&self, name: ServerName) -> Result<ServerAddress> {
        self.registry.resolve(&name).await
    }

    async fn list_chunkservers(&self) -> Result<Vec<(ServerName, ServerAddress)>> {
        self.registry.list_role(ServerRole::Chunkserver).await
    }

    async fn pick_metadata_cache(&self) -> Result<(ServerName, ServerAddress)> {
        let mut caches = self.registry.list_role(ServerRole::MetadataCache).await?;
        if caches.is_empty() {
            return make_error_msg(
                CoordCode::KEY_NOT_FOUND,
                "no metadata caches registered".to_string(),
            );
        }
        // Stable choice; the allocating cache redirects if the fresh number
        // lands in a range it does not own.
        caches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(caches.swap_remove(0))
    }
}
