use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex;
use zircon_types::ServerAddress;

use crate::error::NetError;
use crate::server::{decode_response, encode_request};
use crate::socket::Socket;
use crate::transport::{recv_message, send_message, AsyncConnector, Transport};

/// An RPC client that sends requests over a `Transport`.
///
/// Requests are framed with a `MessageHeader`; the payload layout is
/// `[service_id: u16 LE][method_id: u16 LE][body...]`, and the response is
/// decoded through the status-code envelope. Calls to the same address are
/// serialized over its one connection so responses pair with their
/// requests. Every call carries a deadline; on expiry the caller sees
/// `NetError::Timeout` and may retry idempotent operations.
pub struct RpcClient<S: Socket> {
    transport: Transport<S>,
    call_locks: DashMap<ServerAddress, Arc<Mutex<()>>>,
}

impl<S: Socket> RpcClient<S> {
    pub fn new(transport: Transport<S>) -> Self {
        Self {
            transport,
            call_locks: DashMap::new(),
        }
    }

    fn call_lock(&self, addr: &ServerAddress) -> Arc<Mutex<()>> {
        self.call_locks
            .entry(addr.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Send an RPC request to `addr` and wait for the response body.
    ///
    /// The `connector` is used to establish a new connection if one is not
    /// already cached in the underlying transport. Errors reported by the
    /// remote handler surface as `NetError::ServiceError`.
    pub async fn call(
        &self,
        addr: &ServerAddress,
        service_id: u16,
        method_id: u16,
        request: Bytes,
        deadline: Duration,
        connector: &(dyn AsyncConnector<S> + '_),
    ) -> Result<Bytes, NetError> {
        let lock = self.call_lock(addr);
        let _guard = lock.lock().await;

        let socket = self.transport.get_or_connect(addr, connector).await?;

        let exchange = async {
            let envelope = encode_request(service_id, method_id, &request);
            send_message(socket.as_ref(), &envelope).await?;
            recv_message(socket.as_ref()).await
        };

        let payload = match tokio::time::timeout(deadline, exchange).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                // A transport failure poisons the cached connection.
                self.transport.remove(addr);
                return Err(e);
            }
            Err(_) => {
                self.transport.remove(addr);
                return Err(NetError::Timeout);
            }
        };

        decode_response(payload).map_err(NetError::ServiceError)
    }

    /// Return a reference to the underlying transport.
    pub fn transport(&self) -> &Transport<S> {
        &self.transport
    }
}

impl<S: Socket> Default for RpcClient<S> {
    fn default() -> Self {
        Self::new(Transport::new())
    }
}
