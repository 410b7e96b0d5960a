//! Server role registry over the coordination service.
//!
//! Every server publishes itself under `server/addr/<name>`; the frontend
//! resolves logical names and enumerates live chunkservers from these keys.
//! Metadata entries can then name replicas without holding addresses,
//! breaking the metadata-to-chunkserver reference cycle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zircon_types::{CoordCode, Result, ServerAddress, ServerName, StatusCode};

use crate::kv::Coordinator;

const ADDR_PREFIX: &str = "server/addr/";

/// The role a registered server plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Chunkserver,
    MetadataCache,
    Frontend,
}

/// The value stored under a server's registry key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub address: String,
    pub role: ServerRole,
}

/// Register/resolve servers through the coordination service.
#[derive(Clone)]
pub struct RoleRegistry {
    coord: Arc<dyn Coordinator>,
}

impl RoleRegistry {
    pub fn new(coord: Arc<dyn Coordinator>) -> Self {
        Self { coord }
    }

    /// Publish (or refresh) a server's address and role.
    pub async fn register(
        &self,
        name: &ServerName,
        address: &ServerAddress,
        role: ServerRole,
    ) -> Result<()> {
        let record = ServerRecord {
            address: address.as_str().to_string(),
            role,
        };
        let value = serde_json::to_vec(&record)
            .map_err(|e| err_encoding(format!("encode server record: {}", e)))?;
        self.coord
            .put(&format!("{}{}", ADDR_PREFIX, name), &value)
            .await?;
        tracing::debug!(%name, %address, ?role, "registered server");
        Ok(())
    }

    /// Remove a server from the registry.
    pub async fn unregister(&self, name: &ServerName) -> Result<()> {
        self.coord.delete(&format!("{}{}", ADDR_PREFIX, name)).await
    }

    /// Resolve a logical name to its current address.
    pub async fn resolve(&self, name: &ServerName) -> Result<ServerAddress> {
        let key = format!("{}{}", ADDR_PREFIX, name);
        let value = self.coord.get(&key).await?.ok_or_else(|| {
            zircon_types::Status::with_message(
                CoordCode::KEY_NOT_FOUND,
                format!("server {} not registered", name),
            )
        })?;
        let record: ServerRecord = serde_json::from_slice(&value)
            .map_err(|e| err_encoding(format!("decode server record: {}", e)))?;
        Ok(ServerAddress(record.address))
    }

    /// Enumerate every registered server with the given role.
    pub async fn list_role(&self, role: ServerRole) -> Result<Vec<(ServerName, ServerAddress)>> {
        let kvs = self.coord.list_prefix(ADDR_PREFIX).await?;
        let mut servers = Vec::new();
        for kv in kvs {
            let record: ServerRecord = match serde_json::from_slice(&kv.value) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(key = %kv.key, "skipping unreadable server record: {}", e);
                    continue;
                }
            };
            if record.role == role {
                let name = kv.key.trim_start_matches(ADDR_PREFIX).to_string();
                servers.push((ServerName(name), ServerAddress(record.address)));
            }
        }
        Ok(servers)
    }
}

fn err_encoding(msg: String) -> zircon_types::Status {
    zircon_types::Status::with_message(StatusCode::INVALID_CONFIG, msg)
}
