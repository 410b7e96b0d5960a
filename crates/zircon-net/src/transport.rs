use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use zircon_types::ServerAddress;

use crate::error::NetError;
use crate::message::{MessageHeader, MESSAGE_HEADER_SIZE, MESSAGE_MAX_SIZE};
use crate::socket::Socket;

// ---------------------------------------------------------------------------
// AsyncConnector
// ---------------------------------------------------------------------------

/// Trait for types that can establish new connections to a remote address.
#[async_trait]
pub trait AsyncConnector<S: Socket>: Send + Sync {
    async fn connect(&self, addr: &ServerAddress) -> Result<S, NetError>;
}

// ---------------------------------------------------------------------------
// Message framing helpers
// ---------------------------------------------------------------------------

/// Frame a payload with a `MessageHeader` and send it over a socket.
///
/// The on-wire format is:
/// ```text
/// [checksum: 4 bytes LE][size: 4 bytes LE][payload: `size` bytes]
/// ```
pub async fn send_message<S: Socket>(socket: &S, payload: &[u8]) -> Result<(), NetError> {
    if payload.len() > MESSAGE_MAX_SIZE {
        return Err(NetError::MessageTooLarge {
            size: payload.len(),
            max: MESSAGE_MAX_SIZE,
        });
    }

    let header = MessageHeader::for_payload(payload);

    let mut frame = Vec::with_capacity(MESSAGE_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);

    socket.send(Bytes::from(frame)).await
}

/// Read a framed message from a socket and validate its header.
///
/// Returns the payload bytes (without the header). The checksum and magic
/// number are verified; any mismatch returns the appropriate `NetError`.
pub async fn recv_message<S: Socket>(socket: &S) -> Result<Bytes, NetError> {
    let data = socket.recv().await?;

    if data.is_empty() {
        return Err(NetError::ConnectionClosed);
    }

    if data.len() < MESSAGE_HEADER_SIZE {
        return Err(NetError::IncompleteHeader {
            need: MESSAGE_HEADER_SIZE,
            have: data.len(),
        });
    }

    let mut header_bytes = [0u8; MESSAGE_HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..MESSAGE_HEADER_SIZE]);
    let header = MessageHeader::from_bytes(&header_bytes);

    let payload = &data[MESSAGE_HEADER_SIZE..];

    let declared_size = header.size as usize;
    if payload.len() < declared_size {
        return Err(NetError::IncompleteHeader {
            need: MESSAGE_HEADER_SIZE + declared_size,
            have: data.len(),
        });
    }

    let payload = &payload[..declared_size];
    header.validate(payload)?;

    Ok(Bytes::copy_from_slice(payload))
}

// ---------------------------------------------------------------------------
// Transport (connection cache)
// ---------------------------------------------------------------------------

/// Manages a cache of open connections keyed by remote address.
///
/// One connection per address; the first use of an address dials it through
/// the connector, later uses share the cached socket. This is the only place
/// socket lifecycles live.
pub struct Transport<S: Socket> {
    connections: DashMap<ServerAddress, Arc<S>>,
}

impl<S: Socket> Transport<S> {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Retrieve an existing connection or establish a new one via `connector`.
    pub async fn get_or_connect(
        &self,
        addr: &ServerAddress,
        connector: &(dyn AsyncConnector<S> + '_),
    ) -> Result<Arc<S>, NetError> {
        // Fast path: return cached connection.
        if let Some(entry) = self.connections.get(addr) {
            return Ok(Arc::clone(entry.value()));
        }

        // Slow path: connect and cache.
        let socket = connector.connect(addr).await?;
        let arc = Arc::new(socket);
        self.connections.insert(addr.clone(), Arc::clone(&arc));
        Ok(arc)
    }

    /// Remove a connection from the cache.
    pub fn remove(&self, addr: &ServerAddress) {
        self.connections.remove(addr);
    }

    /// Close every cached connection and drop it from the cache.
    pub async fn close_all(&self) {
        let addrs: Vec<ServerAddress> =
            self.connections.iter().map(|e| e.key().clone()).collect();
        for addr in addrs {
            if let Some((_, socket)) = self.connections.remove(&addr) {
                socket.close().await;
            }
        }
    }

    /// Return the number of cached connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Return whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl<S: Socket> Default for Transport<S> {
    fn default() -> Self {
        Self::new()
    }
}
