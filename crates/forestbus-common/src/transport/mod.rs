//! Forest Bus Transport Layer
//!
//! This module provides the TCP framing, the JSON codec and a small async
//! server for hosting nodes in-process.
//!
//! # Architecture
//!
//! - **Transport**: TCP, connections are kept open and reused
//! - **Codec**: JSON serialization for protocol messages
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode protocol messages to JSON
//! - **[`TcpTransport`]**: Connect and read/write length-prefixed frames
//! - **[`TcpServer`]**: Async TCP server that dispatches requests to a handler
//!
//! # Message Size Limits
//!
//! Frames larger than [`MAX_MESSAGE_SIZE`] are rejected on both send and
//! receive.

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::JsonCodec;
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT, MAX_MESSAGE_SIZE};
pub use tcp_server::{ServerHandle, TcpServer};

#[cfg(test)]
mod tests;
