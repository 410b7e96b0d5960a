//! Client-side proxies implementing the service traits over the wire.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use zircon_chunkserver::{chunkserver_service_meta, IChunkserver};
use zircon_frontend::{frontend_service_meta, IFrontend};
use zircon_metadata_cache::{metadata_cache_service_meta, IMetadataCache};
use zircon_net::transport::AsyncConnector;
use zircon_net::{RpcClient, Socket};
use zircon_proto::{chunkserver as cs, frontend as fe, metacache as mc};
use zircon_types::{
    ChunkNum, ChunkVersion, CommitHash, MetadataEntry, RPCCode, Result, ServerAddress, ServerName,
    Status, Version,
};
use zircon_wire::{WireDeserialize, WireSerialize};

fn encode<T: WireSerialize>(msg: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    msg.wire_serialize(&mut buf)
        .map_err(|e| Status::with_message(RPCCode::INVALID_MESSAGE, e.to_string()))?;
    Ok(Bytes::from(buf))
}

fn decode<T: WireDeserialize>(payload: &[u8]) -> Result<T> {
    let mut offset = 0;
    T::wire_deserialize(payload, &mut offset)
        .map_err(|e| Status::with_message(RPCCode::INVALID_MESSAGE, e.to_string()))
}

/// Shared state of one proxied endpoint.
struct Endpoint<S: Socket> {
    rpc: Arc<RpcClient<S>>,
    connector: Arc<dyn AsyncConnector<S>>,
    addr: ServerAddress,
    deadline: Duration,
}

impl<S: Socket> Endpoint<S> {
    async fn call<Req: WireSerialize, Rsp: WireDeserialize>(
        &self,
        service_id: u16,
        method_id: u16,
        req: &Req,
    ) -> Result<Rsp> {
        let body = encode(req)?;
        let rsp = self
            .rpc
            .call(
                &self.addr,
                service_id,
                method_id,
                body,
                self.deadline,
                self.connector.as_ref(),
            )
            .await
            .map_err(|e| e.into_status())?;
        decode(&rsp)
    }
}

// ---------------------------------------------------------------------------
// Chunkserver proxy
// ---------------------------------------------------------------------------

pub struct ChunkserverProxy<S: Socket> {
    endpoint: Endpoint<S>,
}

impl<S: Socket> ChunkserverProxy<S> {
    pub fn new(
        rpc: Arc<RpcClient<S>>,
        connector: Arc<dyn AsyncConnector<S>>,
        addr: ServerAddress,
        deadline: Duration,
    ) -> Self {
        Self {
            endpoint: Endpoint {
                rpc,
                connector,
                addr,
                deadline,
            },
        }
    }

    async fn call<Req: WireSerialize, Rsp: WireDeserialize>(
        &self,
        method: chunkserver_service_meta::MethodId,
        req: &Req,
    ) -> Result<Rsp> {
        self.endpoint
            .call(chunkserver_service_meta::SERVICE_ID, method.as_u16(), req)
            .await
    }
}

#[async_trait]
impl<S: Socket> IChunkserver for ChunkserverProxy<S> {
    async fn read(
        &self,
        chunk: ChunkNum,
        offset: u32,
        length: u32,
        minimum: Version,
    ) -> Result<(Bytes, Version)> {
        let rsp: cs::ReadChunkRsp = self
            .call(
                chunkserver_service_meta::MethodId::Read,
                &cs::ReadChunkReq {
                    chunk: chunk.0,
                    offset,
                    length,
                    minimum: minimum.0,
                },
            )
            .await?;
        Ok((rsp.data, Version(rsp.version)))
    }

    async fn start_write(&self, chunk: ChunkNum, offset: u32, data: Bytes) -> Result<()> {
        let _: cs::StartWriteRsp = self
            .call(
                chunkserver_service_meta::MethodId::StartWrite,
                &cs::StartWriteReq {
                    chunk: chunk.0,
                    offset,
                    data,
                },
            )
            .await?;
        Ok(())
    }

    async fn start_write_replicated(
        &self,
        chunk: ChunkNum,
        offset: u32,
        data: Bytes,
        replicas: Vec<ServerAddress>,
    ) -> Result<()> {
        let _: cs::StartWriteReplicatedRsp = self
            .call(
                chunkserver_service_meta::MethodId::StartWriteReplicated,
                &cs::StartWriteReplicatedReq {
                    chunk: chunk.0,
                    offset,
                    data,
                    replicas: replicas.into_iter().map(|a| a.0).collect(),
                },
            )
            .await?;
        Ok(())
    }

    async fn commit_write(
        &self,
        chunk: ChunkNum,
        hash: CommitHash,
        old_version: Version,
        new_version: Version,
    ) -> Result<()> {
        let _: cs::CommitWriteRsp = self
            .call(
                chunkserver_service_meta::MethodId::CommitWrite,
                &cs::CommitWriteReq {
                    chunk: chunk.0,
                    hash: hash.0,
                    old_version: old_version.0,
                    new_version: new_version.0,
                },
            )
            .await?;
        Ok(())
    }

    async fn update_latest_version(
        &self,
        chunk: ChunkNum,
        old_version: Version,
        new_version: Version,
    ) -> Result<()> {
        let _: cs::UpdateLatestVersionRsp = self
            .call(
                chunkserver_service_meta::MethodId::UpdateLatestVersion,
                &cs::UpdateLatestVersionReq {
                    chunk: chunk.0,
                    old_version: old_version.0,
                    new_version: new_version.0,
                },
            )
            .await?;
        Ok(())
    }

    async fn replicate(
        &self,
        chunk: ChunkNum,
        address: ServerAddress,
        version: Version,
    ) -> Result<()> {
        let _: cs::ReplicateRsp = self
            .call(
                chunkserver_service_meta::MethodId::Replicate,
                &cs::ReplicateReq {
                    chunk: chunk.0,
                    address: address.0,
                    version: version.0,
                },
            )
            .await?;
        Ok(())
    }

    async fn add(
        &self,
        chunk: ChunkNum,
        initial_data: Bytes,
        initial_version: Version,
    ) -> Result<()> {
        let _: cs::AddChunkRsp = self
            .call(
                chunkserver_service_meta::MethodId::Add,
                &cs::AddChunkReq {
                    chunk: chunk.0,
                    initial_data,
                    initial_version: initial_version.0,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, chunk: ChunkNum, version: Version) -> Result<()> {
        let _: cs::DeleteChunkRsp = self
            .call(
                chunkserver_service_meta::MethodId::Delete,
                &cs::DeleteChunkReq {
                    chunk: chunk.0,
                    version: version.0,
                },
            )
            .await?;
        Ok(())
    }

    async fn list_all_chunks(&self) -> Result<Vec<ChunkVersion>> {
        let rsp: cs::ListAllChunksRsp = self
            .call(
                chunkserver_service_meta::MethodId::ListAllChunks,
                &cs::ListAllChunksReq {},
            )
            .await?;
        Ok(rsp
            .chunks
            .into_iter()
            .map(|cv| ChunkVersion {
                chunk: ChunkNum(cv.chunk),
                version: Version(cv.version),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Metadata cache proxy
// ---------------------------------------------------------------------------

pub struct MetadataCacheProxy<S: Socket> {
    endpoint: Endpoint<S>,
}

impl<S: Socket> MetadataCacheProxy<S> {
    pub fn new(
        rpc: Arc<RpcClient<S>>,
        connector: Arc<dyn AsyncConnector<S>>,
        addr: ServerAddress,
        deadline: Duration,
    ) -> Self {
        Self {
            endpoint: Endpoint {
                rpc,
                connector,
                addr,
                deadline,
            },
        }
    }

    async fn call<Req: WireSerialize, Rsp: WireDeserialize>(
        &self,
        method: metadata_cache_service_meta::MethodId,
        req: &Req,
    ) -> Result<Rsp> {
        self.endpoint
            .call(
                metadata_cache_service_meta::SERVICE_ID,
                method.as_u16(),
                req,
            )
            .await
    }
}

#[async_trait]
impl<S: Socket> IMetadataCache for MetadataCacheProxy<S> {
    async fn new_entry(&self) -> Result<ChunkNum> {
        let rsp: mc::NewEntryRsp = self
            .call(
                metadata_cache_service_meta::MethodId::NewEntry,
                &mc::NewEntryReq {},
            )
            .await?;
        Ok(ChunkNum(rsp.chunk))
    }

    async fn read_entry(&self, chunk: ChunkNum) -> Result<MetadataEntry> {
        let rsp: mc::ReadEntryRsp = self
            .call(
                metadata_cache_service_meta::MethodId::ReadEntry,
                &mc::ReadEntryReq { chunk: chunk.0 },
            )
            .await?;
        Ok(rsp.entry.into())
    }

    async fn update_entry(
        &self,
        chunk: ChunkNum,
        previous: MetadataEntry,
        next: MetadataEntry,
    ) -> Result<()> {
        let _: mc::UpdateEntryRsp = self
            .call(
                metadata_cache_service_meta::MethodId::UpdateEntry,
                &mc::UpdateEntryReq {
                    chunk: chunk.0,
                    previous: (&previous).into(),
                    next: (&next).into(),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_entry(&self, chunk: ChunkNum, previous: MetadataEntry) -> Result<()> {
        let _: mc::DeleteEntryRsp = self
            .call(
                metadata_cache_service_meta::MethodId::DeleteEntry,
                &mc::DeleteEntryReq {
                    chunk: chunk.0,
                    previous: (&previous).into(),
                },
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Frontend proxy
// ---------------------------------------------------------------------------

pub struct FrontendProxy<S: Socket> {
    endpoint: Endpoint<S>,
}

impl<S: Socket> FrontendProxy<S> {
    pub fn new(
        rpc: Arc<RpcClient<S>>,
        connector: Arc<dyn AsyncConnector<S>>,
        addr: ServerAddress,
        deadline: Duration,
    ) -> Self {
        Self {
            endpoint: Endpoint {
                rpc,
                connector,
                addr,
                deadline,
            },
        }
    }

    async fn call<Req: WireSerialize, Rsp: WireDeserialize>(
        &self,
        method: frontend_service_meta::MethodId,
        req: &Req,
    ) -> Result<Rsp> {
        self.endpoint
            .call(frontend_service_meta::SERVICE_ID, method.as_u16(), req)
            .await
    }
}

#[async_trait]
impl<S: Socket> IFrontend for FrontendProxy<S> {
    async fn locate(&self, chunk: ChunkNum) -> Result<(ServerName, ServerAddress)> {
        let rsp: fe::LocateCacheRsp = self
            .call(
                frontend_service_meta::MethodId::Locate,
                &fe::LocateCacheReq { chunk: chunk.0 },
            )
            .await?;
        Ok((ServerName(rsp.name), ServerAddress(rsp.address)))
    }

    async fn pick_replicas(&self, count: u32) -> Result<Vec<ServerName>> {
        let rsp: fe::PickReplicasRsp = self
            .call(
                frontend_service_meta::MethodId::PickReplicas,
                &fe::PickReplicasReq { count },
            )
            .await?;
        Ok(rsp.replicas.into_iter().map(ServerName).collect())
    }

    async fn resolve(&self, name: ServerName) -> Result<ServerAddress> {
        let rsp: fe::ResolveRsp = self
            .call(
                frontend_service_meta::MethodId::Resolve,
                &fe::ResolveReq { name: name.0 },
            )
            .await?;
        Ok(ServerAddress(rsp.address))
    }

    async fn list_chunkservers(&self) -> Result<Vec<(ServerName, ServerAddress)>> {
        let rsp: fe::ListChunkserversRsp = self
            .call(
                frontend_service_meta::MethodId::ListChunkservers,
                &fe::ListChunkserversReq {},
            )
            .await?;
        Ok(rsp
            .servers
            .into_iter()
            .map(|s| (ServerName(s.name), ServerAddress(s.address)))
            .collect())
    }

    async fn pick_metadata_cache(&self) -> Result<(ServerName, ServerAddress)> {
        let rsp: fe::PickMetadataCacheRsp = self
            .call(
                frontend_service_meta::MethodId::PickMetadataCache,
                &fe::PickMetadataCacheReq {},
            )
            .await?;
        Ok((ServerName(rsp.name), ServerAddress(rsp.address)))
    }
}
