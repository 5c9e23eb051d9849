//! Error types for Forest Bus client operations.
//!
//! A public call ends in exactly one of: success, [`ClientError::NoNodesAvailable`],
//! [`ClientError::ClusterIdentityMismatch`] or [`ClientError::Application`].
//! Transport failures on individual nodes never surface on their own; they
//! push the call on to the next candidate node and are only reported as the
//! `last_error` of `NoNodesAvailable` once every node has failed.
//!
//! ## Error Handling Strategy
//!
//! - **Transient**: `NoNodesAvailable`, application errors with a leadership code
//! - **Configuration**: `ClusterIdentityMismatch`, `Config`
//! - **Logical**: other application errors (unknown topic, ...)
//!
//! ## Examples
//!
//! ```no_run
//! use forestbus_client::{Client, ClientError};
//!
//! # async fn example(client: Client) {
//! match client.get_topic_max_index("orders").await {
//!     Ok(index) => println!("commit index {}", index),
//!     Err(ClientError::NoNodesAvailable { .. }) => eprintln!("cluster unreachable, retry later"),
//!     Err(ClientError::ClusterIdentityMismatch { address, .. }) => {
//!         eprintln!("{} belongs to another cluster", address)
//!     }
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! # }
//! ```

use forestbus_common::ResultCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Every candidate node failed at the connection or transport level.
    #[error("No nodes available for {scope}: last tried {last_address} ({last_error})", scope = describe_scope(.topic))]
    NoNodesAvailable {
        topic: Option<String>,
        last_address: String,
        last_error: String,
    },

    /// A reachable node belongs to a different cluster. Never retried.
    #[error("Node {address} reports cluster id '{actual}', expected '{expected}'")]
    ClusterIdentityMismatch {
        address: String,
        expected: String,
        actual: String,
    },

    /// The node answered but reported a failure.
    #[error("Node {address} rejected request for {scope}: {message} ({code})", scope = describe_scope(.topic))]
    Application {
        topic: Option<String>,
        address: String,
        code: ResultCode,
        message: String,
    },

    /// The node answered with a reply that does not match the method's shape.
    #[error("Invalid response from {address}: {message}")]
    InvalidResponse { address: String, message: String },

    /// Request arguments could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// Invalid construction parameters.
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

fn describe_scope(topic: &Option<String>) -> String {
    match topic {
        Some(topic) => format!("topic '{}'", topic),
        None => "cluster".to_string(),
    }
}

impl ClientError {
    /// Returns true if repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoNodesAvailable { .. } => true,
            Self::Application { code, .. } => code.is_leadership(),
            _ => false,
        }
    }

    /// Address of the node that produced the error, if one did.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::NoNodesAvailable { last_address, .. } => Some(last_address),
            Self::ClusterIdentityMismatch { address, .. }
            | Self::Application { address, .. }
            | Self::InvalidResponse { address, .. } => Some(address),
            Self::Encode(_) | Self::Config(_) => None,
        }
    }
}
