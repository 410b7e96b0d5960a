//! Server-side adapters: decode a request, dispatch into the service trait
//! object, encode the response.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use zircon_chunkserver::{chunkserver_service_meta, IChunkserver};
use zircon_frontend::{frontend_service_meta, IFrontend};
use zircon_metadata_cache::{metadata_cache_service_meta, IMetadataCache};
use zircon_net::ServiceHandler;
use zircon_proto::{chunkserver as cs, frontend as fe, metacache as mc};
use zircon_types::{ChunkNum, CommitHash, RPCCode, Result, ServerAddress, ServerName, Status, Version};
use zircon_wire::{WireDeserialize, WireSerialize};

fn decode<T: WireDeserialize>(payload: &[u8]) -> Result<T> {
    let mut offset = 0;
    T::wire_deserialize(payload, &mut offset)
        .map_err(|e| Status::with_message(RPCCode::INVALID_MESSAGE, e.to_string()))
}

fn encode<T: WireSerialize>(msg: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    msg.wire_serialize(&mut buf)
        .map_err(|e| Status::with_message(RPCCode::INVALID_MESSAGE, e.to_string()))?;
    Ok(Bytes::from(buf))
}

fn unknown_method(method_id: u16) -> Status {
    Status::with_message(RPCCode::INVALID_METHOD_ID, format!("method {}", method_id))
}

// ---------------------------------------------------------------------------
// Chunkserver adapter
// ---------------------------------------------------------------------------

pub struct ChunkserverAdapter {
    inner: Arc<dyn IChunkserver>,
}

impl ChunkserverAdapter {
    pub fn new(inner: Arc<dyn IChunkserver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ServiceHandler for ChunkserverAdapter {
    fn service_id(&self) -> u16 {
        chunkserver_service_meta::SERVICE_ID
    }

    fn service_name(&self) -> &str {
        chunkserver_service_meta::SERVICE_NAME
    }

    async fn handle(&self, method_id: u16, request: Bytes) -> std::result::Result<Bytes, Status> {
        use chunkserver_service_meta::MethodId;

        let method = MethodId::from_u16(method_id).ok_or_else(|| unknown_method(method_id))?;
        match method {
            MethodId::Read => {
                let req: cs::ReadChunkReq = decode(&request)?;
                let (data, version) = self
                    .inner
                    .read(
                        ChunkNum(req.chunk),
                        req.offset,
                        req.length,
                        Version(req.minimum),
                    )
                    .await?;
                encode(&cs::ReadChunkRsp {
                    data,
                    version: version.0,
                })
            }
            MethodId::StartWrite => {
                let req: cs::StartWriteReq = decode(&request)?;
                self.inner
                    .start_write(ChunkNum(req.chunk), req.offset, req.data)
                    .await?;
                encode(&cs::StartWriteRsp {})
            }
            MethodId::StartWriteReplicated => {
                let req: cs::StartWriteReplicatedReq = decode(&request)?;
                self.inner
                    .start_write_replicated(
                        ChunkNum(req.chunk),
                        req.offset,
                        req.data,
                        req.replicas.into_iter().map(ServerAddress).collect(),
                    )
                    .await?;
                encode(&cs::StartWriteReplicatedRsp {})
            }
            MethodId::CommitWrite => {
                let req: cs::CommitWriteReq = decode(&request)?;
                self.inner
                    .commit_write(
                        ChunkNum(req.chunk),
                        CommitHash(req.hash),
                        Version(req.old_version),
                        Version(req.new_version),
                    )
                    .await?;
                encode(&cs::CommitWriteRsp {})
            }
            MethodId::UpdateLatestVersion => {
                let req: cs::UpdateLatestVersionReq = decode(&request)?;
                self.inner
                    .update_latest_version(
                        ChunkNum(req.chunk),
                        Version(req.old_version),
                        Version(req.new_version),
                    )
                    .await?;
                encode(&cs::UpdateLatestVersionRsp {})
            }
            MethodId::Replicate => {
                let req: cs::ReplicateReq = decode(&request)?;
                self.inner
                    .replicate(
                        ChunkNum(req.chunk),
                        ServerAddress(req.address),
                        Version(req.version),
                    )
                    .await?;
                encode(&cs::ReplicateRsp {})
            }
            MethodId::Add => {
                let req: cs::AddChunkReq = decode(&request)?;
                self.inner
                    .add(
                        ChunkNum(req.chunk),
                        req.initial_data,
                        Version(req.initial_version),
                    )
                    .await?;
                encode(&cs::AddChunkRsp {})
            }
            MethodId::Delete => {
                let req: cs::DeleteChunkReq = decode(&request)?;
                self.inner
                    .delete(ChunkNum(req.chunk), Version(req.version))
                    .await?;
                encode(&cs::DeleteChunkRsp {})
            }
            MethodId::ListAllChunks => {
                let _req: cs::ListAllChunksReq = decode(&request)?;
                let chunks = self.inner.list_all_chunks().await?;
                encode(&cs::ListAllChunksRsp {
                    chunks: chunks
                        .into_iter()
                        .map(|cv| cs::ChunkVersionMsg {
                            chunk: cv.chunk.0,
                            version: cv.version.0,
                        })
                        .collect(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata cache adapter
// ---------------------------------------------------------------------------

pub struct MetadataCacheAdapter {
    inner: Arc<dyn IMetadataCache>,
}

impl MetadataCacheAdapter {
    pub fn new(inner: Arc<dyn IMetadataCache>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ServiceHandler for MetadataCacheAdapter {
    fn service_id(&self) -> u16 {
        metadata_cache_service_meta::SERVICE_ID
    }

    fn service_name(&self) -> &str {
        metadata_cache_service_meta::SERVICE_NAME
    }

    async fn handle(&self, method_id: u16, request: Bytes) -> std::result::Result<Bytes, Status> {
        use metadata_cache_service_meta::MethodId;

        let method = MethodId::from_u16(method_id).ok_or_else(|| unknown_method(method_id))?;
        match method {
            MethodId::NewEntry => {
                let _req: mc::NewEntryReq = decode(&request)?;
                let chunk = self.inner.new_entry().await?;
                encode(&mc::NewEntryRsp { chunk: chunk.0 })
            }
            MethodId::ReadEntry => {
                let req: mc::ReadEntryReq = decode(&request)?;
                let entry = self.inner.read_entry(ChunkNum(req.chunk)).await?;
                encode(&mc::ReadEntryRsp {
                    entry: (&entry).into(),
                })
            }
            MethodId::UpdateEntry => {
                let req: mc::UpdateEntryReq = decode(&request)?;
                self.inner
                    .update_entry(
                        ChunkNum(req.chunk),
                        req.previous.into(),
                        req.next.into(),
                    )
                    .await?;
                encode(&mc::UpdateEntryRsp {})
            }
            MethodId::DeleteEntry => {
                let req: mc::DeleteEntryReq = decode(&request)?;
                self.inner
                    .delete_entry(ChunkNum(req.chunk), req.previous.into())
                    .await?;
                encode(&mc::DeleteEntryRsp {})
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frontend adapter
// ---------------------------------------------------------------------------

pub struct FrontendAdapter {
    inner: Arc<dyn IFrontend>,
}

impl FrontendAdapter {
    pub fn new(inner: Arc<dyn IFrontend>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ServiceHandler for FrontendAdapter {
    fn service_id(&self) -> u16 {
        frontend_service_meta::SERVICE_ID
    }

    fn service_name(&self) -> &str {
        frontend_service_meta::SERVICE_NAME
    }

    async fn handle(&self, method_id: u16, request: Bytes) -> std::result::Result<Bytes, Status> {
        use frontend_service_meta::MethodId;

        let method = MethodId::from_u16(method_id).ok_or_else(|| unknown_method(method_id))?;
        match method {
            MethodId::Locate => {
                let req: fe::LocateCacheReq = decode(&request)?;
                let (name, address) = self.inner.locate(ChunkNum(req.chunk)).await?;
                encode(&fe::LocateCacheRsp {
                    name: name.0,
                    address: address.0,
                })
            }
            MethodId::PickReplicas => {
                let req: fe::PickReplicasReq = decode(&request)?;
                let replicas = self.inner.pick_replicas(req.count).await?;
                encode(&fe::PickReplicasRsp {
                    replicas: replicas.into_iter().map(|n| n.0).collect(),
                })
            }
            MethodId::Resolve => {
                let req: fe::ResolveReq = decode(&request)?;
                let address = self.inner.resolve(ServerName(req.name)).await?;
                encode(&fe::ResolveRsp { address: address.0 })
            }
            MethodId::ListChunkservers => {
                let _req: fe::ListChunkserversReq = decode(&request)?;
                let servers = self.inner.list_chunkservers().await?;
                encode(&fe::ListChunkserversRsp {
                    servers: servers
                        .into_iter()
                        .map(|(name, address)| fe::ServerEntryMsg {
                            name: name.0,
                            address: address.0,
                        })
                        .collect(),
                })
            }
            MethodId::PickMetadataCache => {
                let _req: fe::PickMetadataCacheReq = decode(&request)?;
                let (name, address) = self.inner.pick_metadata_cache().await?;
                encode(&fe::PickMetadataCacheRsp {
                    name: name.0,
                    address: address.0,
                })
            }
        }
    }
}
