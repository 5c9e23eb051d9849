//! Client for Forest Bus message-log clusters.
//!
//! A [`Client`] is built from the cluster id and the addresses of the
//! cluster's nodes. It routes every call to the node that last served the
//! same topic and falls back through the remaining nodes when that one is
//! unavailable, reconnecting and re-verifying cluster identity on demand.
//!
//! # Modules
//!
//! - `client`: public operations and the per-call retry loop
//! - `pool`: verified connections keyed by node address
//! - `selector`: candidate ordering and leader hints
//! - `connection`: transport channels to single nodes
//! - `error`: the [`ClientError`] taxonomy

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod selector;
mod state;

#[cfg(test)]
mod testing;

pub use client::{Client, ClusterDetails, MessageBatch};
pub use config::ClientConfig;
pub use connection::{Connector, RpcChannel, TcpChannel, TcpConnector};
pub use error::{ClientError, Result};
pub use forestbus_common::ResultCode;
pub use metrics::ClientStats;
pub use pool::NodeConnection;
pub use selector::{CandidateOrder, LeaderAffinity, NodeSelector};
