use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::protocol::error::{ForestBusError, Result};
use crate::protocol::{Request, Response};
use crate::transport::codec::JsonCodec;
use crate::transport::tcp::TcpTransport;

/// Async TCP server speaking the Forest Bus frame protocol.
///
/// Each accepted connection may carry many requests at once: every request is
/// handed to the handler on its own task and the response is written back as
/// soon as it is ready, so a long-polling request does not hold up others on
/// the same connection.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "127.0.0.1:0")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| ForestBusError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ForestBusError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Runs the server on a background task until the returned handle is shut
    /// down or dropped.
    pub fn serve<F, Fut>(self, handler: F) -> ServerHandle
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        let local_addr = self.listener.local_addr().ok();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            if let Err(e) = self.run_with_handler(handler, shutdown_rx).await {
                tracing::warn!(error = %e, "server stopped");
            }
        });

        ServerHandle {
            local_addr,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Accepts connections until `shutdown` flips to `true`.
    ///
    /// On shutdown the listener is dropped and every open connection is
    /// closed; requests still being handled are abandoned.
    pub async fn run_with_handler<F, Fut>(
        self,
        handler: F,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = accepted.map_err(|e| {
                        ForestBusError::Connection(format!("Failed to accept connection: {}", e))
                    })?;
                    tracing::debug!(peer = %peer_addr, "connection established");

                    let handler = handler.clone();
                    let mut conn_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = conn_shutdown.changed() => {}
                            result = handle_connection(stream, handler) => {
                                if let Err(e) = result {
                                    tracing::debug!(peer = %peer_addr, error = %e, "connection error");
                                }
                            }
                        }
                    });
                }
            }
        }
    }
}

/// Handle to a server started with [`TcpServer::serve`].
pub struct ServerHandle {
    local_addr: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stops accepting, closes open connections and waits for the accept loop
    /// to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        // Connection tasks observe the signal on their next poll
        tokio::task::yield_now().await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Handle a single TCP connection.
///
/// Reads frames until EOF and spawns one task per request.
async fn handle_connection<F, Fut>(stream: TcpStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let mut in_flight = InFlight(Vec::new());

    loop {
        let frame = match TcpTransport::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => return Err(e),
        };

        let request = match JsonCodec::decode_request(&frame) {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode request");
                send_response(&writer, &Response::error(0, e.to_string())).await?;
                continue;
            }
        };

        let handler = handler.clone();
        let writer = writer.clone();
        in_flight.0.retain(|task| !task.is_finished());
        in_flight.0.push(tokio::spawn(async move {
            let request_id = request.id;
            let response = match handler(request).await {
                Ok(resp) => resp,
                Err(e) => Response::error(request_id, e.to_string()),
            };
            if let Err(e) = send_response(&writer, &response).await {
                tracing::debug!(error = %e, "failed to send response");
            }
        }));
    }
}

/// Request tasks of one connection. Aborted when the connection goes away so
/// that no task keeps the write half open.
struct InFlight(Vec<JoinHandle<()>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

async fn send_response(writer: &Mutex<OwnedWriteHalf>, response: &Response) -> Result<()> {
    let encoded = JsonCodec::encode_response(response)?;
    let mut writer = writer.lock().await;
    TcpTransport::write_frame(&mut *writer, &encoded).await
}
