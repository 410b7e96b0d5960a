use thiserror::Error;
use zircon_types::{RPCCode, Status};

/// Errors that can occur in the networking layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// The connection was closed by the remote peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// An operation exceeded its deadline.
    #[error("timeout")]
    Timeout,

    /// An I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The message checksum did not match the computed CRC32C.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The received message does not carry the frame magic.
    #[error("invalid message: not a zircon frame (checksum low byte: {0:#04x})")]
    InvalidMagic(u8),

    /// The message size exceeds the maximum allowed.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The message header is incomplete.
    #[error("incomplete header: need {need} bytes, have {have}")]
    IncompleteHeader { need: usize, have: usize },

    /// The requested service was not found in the registry.
    #[error("service not found: service_id={0}")]
    ServiceNotFound(u16),

    /// The server is shutting down and not accepting new requests.
    #[error("server shutting down")]
    ShuttingDown,

    /// A serialization error from the wire format.
    #[error("wire error: {0}")]
    WireError(#[from] zircon_wire::WireError),

    /// An error returned by the remote service handler.
    #[error("service error: {0}")]
    ServiceError(Status),
}

impl NetError {
    /// Convert into a cross-service status for the layers above.
    pub fn into_status(self) -> Status {
        match self {
            NetError::ServiceError(status) => status,
            NetError::Timeout => Status::new(RPCCode::TIMEOUT),
            NetError::ConnectionClosed => Status::new(RPCCode::SOCKET_CLOSED),
            NetError::Io(e) => Status::with_message(RPCCode::SOCKET_ERROR, e.to_string()),
            NetError::ServiceNotFound(id) => {
                Status::with_message(RPCCode::INVALID_SERVICE_ID, format!("service {}", id))
            }
            other => Status::with_message(RPCCode::SEND_FAILED, other.to_string()),
        }
    }
}
