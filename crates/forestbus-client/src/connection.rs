//! Transport connections to individual cluster nodes.
//!
//! A [`Connector`] opens an [`RpcChannel`] to a node address. The default
//! [`TcpConnector`] opens a [`TcpChannel`]: one TCP socket with a background
//! reader task, able to carry many requests at once. Responses are routed
//! back to their callers by request id, so a long-polling read on one topic
//! does not stall a send on another topic to the same node.
//!
//! When the reader sees EOF or an I/O error the channel is marked closed and
//! every call still waiting on it fails with [`ForestBusError::Closed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use forestbus_common::transport::{JsonCodec, TcpTransport, DEFAULT_CONNECT_TIMEOUT};
use forestbus_common::{ForestBusError, Method, Request, RequestId, Response, RpcArgs};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// A live request/response channel to one node.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Issues one call and waits for its response.
    ///
    /// `Err` means the call could not complete at the transport level. A
    /// node-side failure arrives as `Ok` with the error inside the response.
    async fn call(&self, method: Method, args: RpcArgs) -> Result<Response, ForestBusError>;

    /// Releases the underlying connection. Safe to call more than once.
    async fn close(&self);
}

/// Opens channels to node addresses.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, address: &str) -> Result<Arc<dyn RpcChannel>, ForestBusError>;
}

/// Connector for the TCP frame protocol.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, request_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, None)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn RpcChannel>, ForestBusError> {
        let stream = TcpTransport::connect(address, self.connect_timeout).await?;
        let channel = TcpChannel::new(address, stream, self.request_timeout);
        Ok(Arc::new(channel))
    }
}

type PendingCalls = HashMap<RequestId, oneshot::Sender<Response>>;

/// Calls waiting for a response, plus the closed flag.
///
/// The flag is only flipped while the map lock is held, so a call either
/// registers before the reader shuts down (and is then failed by it) or sees
/// the channel closed and never registers.
struct Pending {
    calls: StdMutex<PendingCalls>,
    closed: AtomicBool,
}

impl Pending {
    fn lock(&self) -> MutexGuard<'_, PendingCalls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: RequestId) -> Result<oneshot::Receiver<Response>, ForestBusError> {
        let mut calls = self.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(ForestBusError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        calls.insert(id, tx);
        Ok(rx)
    }

    fn forget(&self, id: RequestId) {
        self.lock().remove(&id);
    }

    fn complete(&self, response: Response) {
        let waiter = self.lock().remove(&response.id);
        match waiter {
            Some(tx) => {
                // Receiver gone means the caller timed out
                let _ = tx.send(response);
            }
            None => tracing::debug!(id = response.id, "response for unknown request"),
        }
    }

    /// Marks the channel closed and fails every waiting call.
    fn shut(&self) {
        let mut calls = self.lock();
        self.closed.store(true, Ordering::Release);
        calls.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Multiplexed channel over one TCP connection.
pub struct TcpChannel {
    address: String,
    writer: Mutex<OwnedWriteHalf>,
    pending: Arc<Pending>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    request_timeout: Option<Duration>,
}

impl TcpChannel {
    /// Wraps a connected stream and starts its reader task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(address: &str, stream: tokio::net::TcpStream, request_timeout: Option<Duration>) -> Self {
        let (reader, writer) = stream.into_split();
        let pending = Arc::new(Pending {
            calls: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let task = tokio::spawn(read_loop(address.to_string(), reader, pending.clone()));

        Self {
            address: address.to_string(),
            writer: Mutex::new(writer),
            pending,
            reader: StdMutex::new(Some(task)),
            request_timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    /// Writes one request frame.
    ///
    /// The channel is shut if the write fails or the caller is dropped
    /// mid-frame: a partly written frame leaves the stream unusable for every
    /// other caller on it.
    async fn send(&self, request: &Request) -> Result<(), ForestBusError> {
        let encoded = JsonCodec::encode_request(request)?;
        let mut writer = self.writer.lock().await;
        let mut frame = FrameWrite {
            pending: &self.pending,
            finished: false,
        };
        let result = TcpTransport::write_frame(&mut *writer, &encoded).await;
        frame.finished = result.is_ok();
        result
    }
}

/// Shuts the channel when dropped before the frame is fully written.
struct FrameWrite<'a> {
    pending: &'a Pending,
    finished: bool,
}

impl Drop for FrameWrite<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.pending.shut();
        }
    }
}

/// Removes a call from the pending map however the caller leaves.
struct Registration<'a> {
    pending: &'a Pending,
    id: RequestId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.pending.forget(self.id);
    }
}

#[async_trait]
impl RpcChannel for TcpChannel {
    async fn call(&self, method: Method, args: RpcArgs) -> Result<Response, ForestBusError> {
        let request = Request::new(method, args);
        let reply = self.pending.register(request.id)?;
        let _registration = Registration {
            pending: &self.pending,
            id: request.id,
        };

        self.send(&request).await?;

        match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, reply).await {
                Ok(result) => result.map_err(|_| ForestBusError::Closed),
                Err(_) => Err(ForestBusError::Timeout(timeout)),
            },
            None => reply.await.map_err(|_| ForestBusError::Closed),
        }
    }

    async fn close(&self) {
        self.pending.shut();
        let task = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        if let Some(task) = self
            .reader
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

async fn read_loop(address: String, mut reader: OwnedReadHalf, pending: Arc<Pending>) {
    loop {
        match TcpTransport::read_frame(&mut reader).await {
            Ok(Some(frame)) => match JsonCodec::decode_response(&frame) {
                Ok(response) => pending.complete(response),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "undecodable response frame");
                    break;
                }
            },
            Ok(None) => {
                tracing::debug!(address = %address, "connection closed by node");
                break;
            }
            Err(e) => {
                tracing::debug!(address = %address, error = %e, "connection read failed");
                break;
            }
        }
    }
    pending.shut();
}

#[cfg(test)]
mod tests {
    use super::*;
    use forestbus_common::transport::TcpServer;
    use serde_json::json;

    async fn start_node<F, Fut>(handler: F) -> (String, forestbus_common::transport::ServerHandle)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = forestbus_common::Result<Response>> + Send + 'static,
    {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        (addr, server.serve(handler))
    }

    #[tokio::test]
    async fn test_call_returns_matching_response() {
        let (addr, node) = start_node(|request: Request| async move {
            Ok(Response::success(request.id, json!({"method": request.method})))
        })
        .await;

        let channel = TcpConnector::default().connect(&addr).await.unwrap();
        let response = channel.call(Method::GetClusterDetails, json!({})).await.unwrap();

        assert_eq!(response.result, Some(json!({"method": "RPCHandler.GetClusterDetails"})));
        channel.close().await;
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_fast_call() {
        let (addr, node) = start_node(|request: Request| async move {
            if request.method() == Some(Method::ReceiveMessages) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok(Response::success(request.id, json!({"method": request.method})))
        })
        .await;

        let channel = TcpConnector::default().connect(&addr).await.unwrap();
        let slow_channel = channel.clone();
        let slow = tokio::spawn(async move {
            slow_channel.call(Method::ReceiveMessages, json!({})).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fast = tokio::time::timeout(
            Duration::from_millis(300),
            channel.call(Method::GetTopicDetails, json!({})),
        )
        .await
        .expect("fast call should not wait behind the slow one")
        .unwrap();
        assert_eq!(fast.result, Some(json!({"method": "RPCHandler.GetTopicDetails"})));

        let slow = slow.await.unwrap().unwrap();
        assert_eq!(slow.result, Some(json!({"method": "RPCHandler.ReceiveMessages"})));

        channel.close().await;
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_pending_call_fails_when_node_goes_away() {
        let (addr, node) = start_node(|request: Request| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Response::success(request.id, json!({})))
        })
        .await;

        let channel = TcpConnector::default().connect(&addr).await.unwrap();
        let waiting_channel = channel.clone();
        let waiting = tokio::spawn(async move {
            waiting_channel.call(Method::ReceiveMessages, json!({})).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        node.shutdown().await;

        let result = tokio::time::timeout(Duration::from_secs(2), waiting)
            .await
            .expect("call should fail once the connection drops")
            .unwrap();
        assert!(matches!(result, Err(ForestBusError::Closed)));

        let after = channel.call(Method::GetTopicDetails, json!({})).await;
        assert!(after.is_err());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (addr, node) = start_node(|request: Request| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Response::success(request.id, json!({})))
        })
        .await;

        let connector = TcpConnector::new(DEFAULT_CONNECT_TIMEOUT, Some(Duration::from_millis(100)));
        let channel = connector.connect(&addr).await.unwrap();
        let result = channel.call(Method::GetTopicDetails, json!({})).await;

        assert!(matches!(result, Err(ForestBusError::Timeout(d)) if d == Duration::from_millis(100)));
        channel.close().await;
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_dropped_mid_frame_closes_channel() {
        // A peer that accepts but never reads, so a large frame stalls part way
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let peer = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let stream = TcpTransport::connect(&addr, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        let channel = TcpChannel::new(&addr, stream, None);
        let payload = json!({"SentMessages": ["x".repeat(32 * 1024 * 1024)]});

        // Long enough to encode the frame; the write itself never finishes
        let cancelled = tokio::time::timeout(
            Duration::from_secs(2),
            channel.call(Method::SendMessages, payload),
        )
        .await;
        assert!(cancelled.is_err(), "write should still be blocked on the stalled peer");

        assert!(channel.is_closed());
        assert!(channel.pending.lock().is_empty());
        let after = channel.call(Method::GetTopicDetails, json!({})).await;
        assert!(matches!(after, Err(ForestBusError::Closed)));

        channel.close().await;
        peer.abort();
    }

    #[tokio::test]
    async fn test_timed_out_call_is_forgotten() {
        let (addr, node) = start_node(|request: Request| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Response::success(request.id, json!({})))
        })
        .await;

        let stream = TcpTransport::connect(&addr, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        let channel = TcpChannel::new(&addr, stream, Some(Duration::from_millis(50)));
        let result = channel.call(Method::GetTopicDetails, json!({})).await;

        assert!(matches!(result, Err(ForestBusError::Timeout(_))));
        assert!(channel.pending.lock().is_empty());
        // A timeout is not a broken stream
        assert!(!channel.is_closed());
        channel.close().await;
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (addr, node) = start_node(|request: Request| async move {
            Ok(Response::success(request.id, json!({})))
        })
        .await;

        let channel = TcpConnector::default().connect(&addr).await.unwrap();
        channel.close().await;
        channel.close().await;

        let result = channel.call(Method::GetTopicDetails, json!({})).await;
        assert!(matches!(result, Err(ForestBusError::Closed)));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_node() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpConnector::default().connect(&addr).await;
        assert!(result.is_err());
    }
}
