use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing;
use zircon_proto::ErrorInfo;
use zircon_types::{status_code_t, RPCCode, Status, StatusCode};
use zircon_wire::{WireDeserialize, WireSerialize};

use crate::error::NetError;
use crate::service::ServiceRegistry;
use crate::socket::{Listener, Socket};
use crate::transport::{recv_message, send_message};

/// Size of the request envelope: `[service_id: u16 LE][method_id: u16 LE]`.
pub const REQUEST_ENVELOPE_SIZE: usize = 4;

/// Size of the response envelope: `[status_code: u16 LE]`.
pub const RESPONSE_ENVELOPE_SIZE: usize = 2;

/// Build the on-wire request envelope:
/// `[service_id: u16 LE][method_id: u16 LE][body...]`.
pub fn encode_request(service_id: u16, method_id: u16, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(REQUEST_ENVELOPE_SIZE + body.len());
    buf.put_u16_le(service_id);
    buf.put_u16_le(method_id);
    buf.extend_from_slice(body);
    buf.freeze()
}

/// Build the on-wire response envelope: `[status_code: u16 LE][body...]`.
///
/// A zero status code is followed by the operation response message; any
/// other code is followed by a serialized [`ErrorInfo`] carrying the error
/// text plus the version/owner hints.
pub fn encode_response(result: Result<Bytes, Status>) -> Bytes {
    match result {
        Ok(body) => {
            let mut buf = BytesMut::with_capacity(RESPONSE_ENVELOPE_SIZE + body.len());
            buf.put_u16_le(StatusCode::OK);
            buf.extend_from_slice(&body);
            buf.freeze()
        }
        Err(status) => {
            let info = ErrorInfo::from_status(&status);
            let mut body = Vec::new();
            // ErrorInfo serialization cannot fail; fall back to an empty body
            // if it somehow does.
            let _ = info.wire_serialize(&mut body);
            let mut buf = BytesMut::with_capacity(RESPONSE_ENVELOPE_SIZE + body.len());
            buf.put_u16_le(status.code());
            buf.extend_from_slice(&body);
            buf.freeze()
        }
    }
}

/// Split a response payload into the operation body or the carried status.
pub fn decode_response(payload: Bytes) -> Result<Bytes, Status> {
    if payload.len() < RESPONSE_ENVELOPE_SIZE {
        return Err(Status::with_message(
            RPCCode::INVALID_MESSAGE,
            format!("response too small: {} bytes", payload.len()),
        ));
    }
    let code: status_code_t = u16::from_le_bytes([payload[0], payload[1]]);
    let body = payload.slice(RESPONSE_ENVELOPE_SIZE..);
    if code == StatusCode::OK {
        return Ok(body);
    }
    let mut offset = 0;
    match ErrorInfo::wire_deserialize(&body, &mut offset) {
        Ok(info) => Err(info.into_status(code)),
        Err(_) => Err(Status::new(code)),
    }
}

/// RPC server that hosts registered services.
///
/// The server accepts connections from a `Listener`, reads framed RPC
/// messages, dispatches them to the appropriate `ServiceHandler`, and writes
/// back the enveloped response. Shutdown is coordinated through `stop()`.
pub struct Server {
    services: Arc<ServiceRegistry>,
    /// Signalled when `stop()` is called to cancel the accept loop.
    shutdown: Arc<Notify>,
    running: bool,
}

impl Server {
    pub fn new() -> Self {
        Self {
            services: Arc::new(ServiceRegistry::new()),
            shutdown: Arc::new(Notify::new()),
            running: false,
        }
    }

    /// Register a service handler with this server.
    pub fn register_service(&self, service: Box<dyn crate::service::ServiceHandler>) {
        self.services.register(service);
    }

    /// Return a reference to the service registry.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Start accepting connections from the provided `Listener`.
    ///
    /// This spawns a background task that runs until `stop()` is called.
    /// Each accepted connection is handled in its own spawned task.
    pub fn start<L: Listener + 'static>(&mut self, listener: L) {
        if self.running {
            tracing::warn!("server already running, ignoring duplicate start");
            return;
        }
        self.running = true;

        let services = Arc::clone(&self.services);
        let shutdown = Arc::clone(&self.shutdown);
        let addr = listener.local_addr();

        tracing::info!(%addr, "server starting");

        tokio::spawn(async move {
            Self::accept_loop(listener, services, shutdown).await;
            tracing::info!(%addr, "server accept loop exited");
        });
    }

    /// Stop the server, signaling the accept loop and all active connections.
    pub fn stop(&mut self) {
        if self.running {
            tracing::info!("server stopping");
            self.shutdown.notify_waiters();
            self.running = false;
        }
    }

    /// Return whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    // -----------------------------------------------------------------------
    // Internal implementation
    // -----------------------------------------------------------------------

    async fn accept_loop<L: Listener>(
        listener: L,
        services: Arc<ServiceRegistry>,
        shutdown: Arc<Notify>,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    tracing::info!("server shutdown signal received");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok(socket) => {
                            let services = Arc::clone(&services);
                            let shutdown = Arc::clone(&shutdown);
                            tasks.spawn(async move {
                                if let Err(e) = Self::handle_connection(socket, services, shutdown).await {
                                    tracing::debug!("connection handler finished: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {}", e);
                            // Brief pause to avoid tight error loops.
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }
            }
        }

        // Wait for all active connection tasks to finish.
        tasks.shutdown().await;
    }

    async fn handle_connection<S: Socket>(
        socket: S,
        services: Arc<ServiceRegistry>,
        shutdown: Arc<Notify>,
    ) -> Result<(), NetError> {
        let peer = socket.peer_addr();
        tracing::debug!(%peer, "new connection");

        loop {
            // Check for shutdown between requests.
            let payload = tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    tracing::debug!(%peer, "connection shutdown");
                    return Err(NetError::ShuttingDown);
                }

                result = recv_message(&socket) => {
                    result?
                }
            };

            // Decode the request envelope.
            if payload.len() < REQUEST_ENVELOPE_SIZE {
                tracing::warn!(%peer, "request too small: {} bytes", payload.len());
                continue;
            }

            let service_id = u16::from_le_bytes([payload[0], payload[1]]);
            let method_id = u16::from_le_bytes([payload[2], payload[3]]);
            let body = payload.slice(REQUEST_ENVELOPE_SIZE..);

            tracing::debug!(
                %peer,
                service_id,
                method_id,
                body_len = body.len(),
                "dispatching request"
            );

            let result = match services.get(service_id) {
                Some(handler) => handler.handle(method_id, body).await,
                None => {
                    tracing::warn!(%peer, service_id, "service not found");
                    Err(Status::with_message(
                        RPCCode::INVALID_SERVICE_ID,
                        format!("service {}", service_id),
                    ))
                }
            };

            if let Err(status) = &result {
                tracing::debug!(%peer, service_id, method_id, status = %status, "handler returned error");
            }

            send_message(&socket, &encode_response(result)).await?;
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
