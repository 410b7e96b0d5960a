use async_trait::async_trait;
use bytes::Bytes;
use zircon_types::ServerAddress;

use crate::error::NetError;

/// Trait representing an abstract network socket.
///
/// `recv` returns one complete frame (header plus payload); transports that
/// are stream-oriented handle the length-delimited buffering internally.
/// Implementations may use TCP or in-memory channels for testing.
#[async_trait]
pub trait Socket: Send + Sync + 'static {
    /// Send data over the socket.
    async fn send(&self, data: Bytes) -> Result<(), NetError>;

    /// Receive one complete frame from the socket.
    async fn recv(&self) -> Result<Bytes, NetError>;

    /// Return the remote peer address.
    fn peer_addr(&self) -> ServerAddress;

    /// Close the socket gracefully.
    async fn close(&self);
}

/// Trait for accepting incoming connections.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// The type of socket produced when a connection is accepted.
    type Socket: Socket;

    /// Accept the next incoming connection.
    async fn accept(&self) -> Result<Self::Socket, NetError>;

    /// Return the local address this listener is bound to.
    fn local_addr(&self) -> ServerAddress;
}
