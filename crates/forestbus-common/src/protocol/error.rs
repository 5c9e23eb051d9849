use std::time::Duration;

use thiserror::Error;

/// Errors raised by the protocol and transport layers.
///
/// Every variant describes a failure to move a request or response across the
/// wire. Application-level outcomes (unknown topic, not leader, ...) are not
/// errors at this layer; they travel inside a successfully delivered
/// [`Response`](crate::Response).
#[derive(Error, Debug)]
pub enum ForestBusError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed")]
    Closed,

    #[error("Message too large: {len} bytes (max {max} bytes)")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForestBusError>;
