//! TCP transport implementation for the zircon networking layer.
//!
//! Provides [`TcpSocket`] and [`TcpListener`] which wrap tokio's TCP
//! primitives and implement the [`zircon_net::Socket`] and
//! [`zircon_net::Listener`] traits.
//!
//! The socket splits a `TcpStream` into independent read/write halves so that
//! sending and receiving can proceed concurrently without holding a single
//! lock over the entire stream. `recv` performs length-delimited reads (exact
//! header, then exact payload) so the layer above always sees one complete
//! frame per call.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use zircon_net::message::{MessageHeader, MESSAGE_HEADER_SIZE, MESSAGE_MAX_SIZE};
use zircon_net::transport::AsyncConnector;
use zircon_net::{Listener, NetError, Socket};
use zircon_types::ServerAddress;

// ---------------------------------------------------------------------------
// TcpSocket
// ---------------------------------------------------------------------------

/// A TCP socket wrapping a tokio [`TcpStream`](tokio::net::TcpStream).
pub struct TcpSocket {
    reader: Arc<Mutex<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    peer_addr: ServerAddress,
}

impl TcpSocket {
    /// Wrap an already-connected [`tokio::net::TcpStream`].
    pub fn from_stream(stream: tokio::net::TcpStream) -> Result<Self, NetError> {
        let peer_sa = stream.peer_addr()?;
        let peer_addr = ServerAddress(peer_sa.to_string());

        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: Arc::new(Mutex::new(read_half)),
            writer: Arc::new(Mutex::new(write_half)),
            peer_addr,
        })
    }

    /// Shut down the write half; ignore errors (e.g. already closed).
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for TcpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocket")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

#[async_trait]
impl Socket for TcpSocket {
    async fn send(&self, data: Bytes) -> Result<(), NetError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, NetError> {
        let mut reader = self.reader.lock().await;

        // Exact header read, then exact payload read, so the caller always
        // gets one whole frame regardless of TCP segmentation.
        let mut header_bytes = [0u8; MESSAGE_HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header_bytes).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(NetError::ConnectionClosed);
            }
            return Err(e.into());
        }
        let header = MessageHeader::from_bytes(&header_bytes);

        let size = header.size as usize;
        if size > MESSAGE_MAX_SIZE {
            return Err(NetError::MessageTooLarge {
                size,
                max: MESSAGE_MAX_SIZE,
            });
        }

        let mut frame = BytesMut::zeroed(MESSAGE_HEADER_SIZE + size);
        frame[..MESSAGE_HEADER_SIZE].copy_from_slice(&header_bytes);
        reader.read_exact(&mut frame[MESSAGE_HEADER_SIZE..]).await?;

        Ok(frame.freeze())
    }

    fn peer_addr(&self) -> ServerAddress {
        self.peer_addr.clone()
    }

    async fn close(&self) {
        self.shutdown().await;
    }
}

// ---------------------------------------------------------------------------
// TcpListener
// ---------------------------------------------------------------------------

/// A TCP listener wrapping [`tokio::net::TcpListener`].
pub struct TcpListener {
    inner: tokio::net::TcpListener,
    local_addr: ServerAddress,
}

impl TcpListener {
    /// Bind to the given `host:port` address. Binding port 0 picks a free
    /// port; the resolved address is available from `local_addr`.
    pub async fn bind(addr: &ServerAddress) -> Result<Self, NetError> {
        let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;

        let actual = listener.local_addr()?;
        let local_addr = ServerAddress(actual.to_string());

        tracing::info!(%local_addr, "TCP listener bound");

        Ok(Self {
            inner: listener,
            local_addr,
        })
    }
}

#[async_trait]
impl Listener for TcpListener {
    type Socket = TcpSocket;

    async fn accept(&self) -> Result<TcpSocket, NetError> {
        let (stream, peer_sa) = self.inner.accept().await?;
        tracing::debug!(peer = %peer_sa, "accepted TCP connection");
        TcpSocket::from_stream(stream)
    }

    fn local_addr(&self) -> ServerAddress {
        self.local_addr.clone()
    }
}

impl std::fmt::Debug for TcpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpListener")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AsyncConnector implementation
// ---------------------------------------------------------------------------

/// A connector that creates [`TcpSocket`] instances by opening TCP
/// connections, for use with [`zircon_net::Transport`].
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

#[async_trait]
impl AsyncConnector<TcpSocket> for TcpConnector {
    async fn connect(&self, addr: &ServerAddress) -> Result<TcpSocket, NetError> {
        tracing::debug!(%addr, "connecting via TCP");
        let stream = tokio::net::TcpStream::connect(addr.as_str()).await?;
        TcpSocket::from_stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zircon_net::transport::{recv_message, send_message};

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let listener = TcpListener::bind(&ServerAddress::from("127.0.0.1:0"))
            .await
            .unwrap();
        let addr = listener.local_addr();

        let server = tokio::spawn(async move {
            let socket = listener.accept().await.unwrap();
            let payload = recv_message(&socket).await.unwrap();
            send_message(&socket, &payload).await.unwrap();
        });

        let client = TcpConnector.connect(&addr).await.unwrap();
        send_message(&client, b"over tcp").await.unwrap();
        let echoed = recv_message(&client).await.unwrap();
        assert_eq!(echoed.as_ref(), b"over tcp");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_large_frame_segmentation() {
        let listener = TcpListener::bind(&ServerAddress::from("127.0.0.1:0"))
            .await
            .unwrap();
        let addr = listener.local_addr();

        // A payload well beyond one TCP segment must still arrive whole.
        let payload = vec![0xC3u8; 1_000_000];
        let expected = payload.clone();

        let server = tokio::spawn(async move {
            let socket = listener.accept().await.unwrap();
            let received = recv_message(&socket).await.unwrap();
            assert_eq!(received.as_ref(), expected.as_slice());
        });

        let client = TcpConnector.connect(&addr).await.unwrap();
        send_message(&client, &payload).await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening.
        let result = TcpConnector
            .connect(&ServerAddress::from("127.0.0.1:1"))
            .await;
        assert!(result.is_err());
    }
}
