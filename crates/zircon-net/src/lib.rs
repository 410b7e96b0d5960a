pub mod client;
pub mod error;
pub mod message;
pub mod server;
pub mod service;
pub mod socket;
pub mod transport;

pub use client::RpcClient;
pub use error::NetError;
pub use message::{MessageHeader, MESSAGE_HEADER_SIZE, MESSAGE_MAX_SIZE};
pub use server::{encode_request, Server};
pub use service::{ServiceHandler, ServiceRegistry};
pub use socket::{Listener, Socket};
pub use transport::{AsyncConnector, Transport};
