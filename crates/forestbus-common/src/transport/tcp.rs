use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::error::{ForestBusError, Result};

/// Default bound on establishing a TCP connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frame body size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// TCP transport for Forest Bus.
///
/// Stateless helpers for connecting to a node and for reading and writing
/// length-prefixed frames. Connection lifetime and request multiplexing are
/// the caller's business.
///
/// # Wire Protocol
///
/// ```text
/// [4-byte length, u32 big-endian] [JSON data]
/// ```
///
/// # Example
///
/// ```no_run
/// use forestbus_common::transport::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut stream = TcpTransport::connect("127.0.0.1:3000", DEFAULT_CONNECT_TIMEOUT).await?;
/// TcpTransport::write_frame(&mut stream, br#"{"id":1,"method":"RPCHandler.GetClusterDetails","args":{}}"#).await?;
/// let reply = TcpTransport::read_frame(&mut stream).await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport;

impl TcpTransport {
    /// Connects to a remote endpoint.
    ///
    /// The address is resolved and each resolved socket address is tried in
    /// turn, each bounded by `timeout`. No retries beyond that.
    ///
    /// # Errors
    ///
    /// Returns `ForestBusError::Connection` if the address cannot be resolved
    /// or no resolved address accepts the connection in time.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
        let socket_addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| ForestBusError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    // Small request frames; don't wait on Nagle
                    stream.set_nodelay(true).map_err(|e| {
                        ForestBusError::Connection(format!("Failed to set TCP_NODELAY: {}", e))
                    })?;
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => last_err = Some(format!("timed out after {}ms", timeout.as_millis())),
            }
        }

        Err(ForestBusError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Writes one frame: length prefix followed by `data`, then flushes.
    pub async fn write_frame<W>(stream: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ForestBusError::FrameTooLarge {
                len: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let len = data.len() as u32;

        stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| Self::map_io_error(e, "writing length prefix"))?;
        stream
            .write_all(data)
            .await
            .map_err(|e| Self::map_io_error(e, "writing data"))?;
        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly at a
    /// frame boundary.
    pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Self::map_io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(ForestBusError::FrameTooLarge {
                len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| Self::map_io_error(e, "reading data"))?;

        Ok(Some(buf))
    }

    /// Map IO errors to appropriate ForestBusError variants
    ///
    /// - Connection errors -> `Connection`
    /// - Other IO errors -> `Io`
    fn map_io_error(err: std::io::Error, context: &str) -> ForestBusError {
        match err.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::NotConnected => {
                ForestBusError::Connection(format!("{}: Connection lost", context))
            }
            _ => ForestBusError::Io(err),
        }
    }
}
