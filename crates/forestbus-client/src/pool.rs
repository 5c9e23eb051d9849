//! Connection pool keyed by node address.
//!
//! A node is connected lazily, the first time a call needs it, and its
//! cluster identity is verified before the connection is pooled. Callers that
//! need the same address while it is being connected wait for that one
//! attempt instead of opening their own. Broken connections are evicted by
//! identity, never by address, so a late failure report cannot evict a
//! healthy replacement.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use forestbus_common::{
    ClusterDetailsReply, ForestBusError, GetClusterDetailsArgs, Method, RemoteCall, Response,
    RpcArgs,
};
use tokio::sync::OnceCell;

use crate::connection::{Connector, RpcChannel};
use crate::metrics::ClientMetrics;
use crate::state::SharedState;

static CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A verified connection to one node.
pub struct NodeConnection {
    id: u64,
    address: String,
    channel: Arc<dyn RpcChannel>,
    closed: AtomicBool,
}

impl NodeConnection {
    fn new(address: &str, channel: Arc<dyn RpcChannel>) -> Self {
        Self {
            id: CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            address: address.to_string(),
            channel,
            closed: AtomicBool::new(false),
        }
    }

    /// Process-unique id, distinct for every connection ever opened.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn call(&self, method: Method, args: RpcArgs) -> Result<Response, ForestBusError> {
        if self.is_closed() {
            return Err(ForestBusError::Closed);
        }
        self.channel.call(method, args).await
    }

    /// Closes the underlying channel. Later calls are no-ops.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.channel.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Why a node could not be handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectError {
    /// The node cannot be used right now; try the next one.
    Unreachable(String),
    /// The node belongs to another cluster.
    IdentityMismatch { expected: String, actual: String },
}

/// One connect to one address, shared by every caller that asks for the
/// address before it settles.
pub(crate) type ConnectAttempt = Arc<OnceCell<Result<Arc<NodeConnection>, ConnectError>>>;

pub(crate) struct ConnectionPool {
    cluster_id: String,
    connector: Arc<dyn Connector>,
    state: SharedState,
    metrics: Arc<ClientMetrics>,
}

impl ConnectionPool {
    pub(crate) fn new(
        cluster_id: String,
        connector: Arc<dyn Connector>,
        state: SharedState,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        Self {
            cluster_id,
            connector,
            state,
            metrics,
        }
    }

    /// Returns the pooled connection for `address`, connecting and verifying
    /// a new one if there is none.
    ///
    /// The pool lock is not held while connecting. Concurrent callers for an
    /// address that is not pooled yet share a single attempt and all see its
    /// outcome. A failed attempt is not remembered; the next call tries again.
    pub(crate) async fn get_connection(
        &self,
        address: &str,
    ) -> Result<Arc<NodeConnection>, ConnectError> {
        let attempt = {
            let mut state = self.state.lock().await;
            if let Some(existing) = state.connections.get(address) {
                tracing::debug!(address = %address, connection = existing.id(), "reusing pooled connection");
                return Ok(existing.clone());
            }
            state
                .connecting
                .entry(address.to_string())
                .or_default()
                .clone()
        };

        // If the caller driving the attempt is dropped, a waiting caller takes over
        attempt
            .get_or_init(|| self.establish(address, &attempt))
            .await
            .clone()
    }

    /// Connects and verifies `address`, then publishes the outcome.
    ///
    /// The in-flight entry is removed under the same lock that pools the
    /// connection, so no caller can miss both.
    async fn establish(
        &self,
        address: &str,
        attempt: &ConnectAttempt,
    ) -> Result<Arc<NodeConnection>, ConnectError> {
        let outcome = self.open(address).await;

        let mut state = self.state.lock().await;
        if state
            .connecting
            .get(address)
            .is_some_and(|current| Arc::ptr_eq(current, attempt))
        {
            state.connecting.remove(address);
        }
        if let Ok(connection) = &outcome {
            state.connections.insert(address.to_string(), connection.clone());
            self.metrics.connection_created();
            tracing::debug!(address = %address, connection = connection.id(), "connection established");
        }
        outcome
    }

    async fn open(&self, address: &str) -> Result<Arc<NodeConnection>, ConnectError> {
        let channel = self
            .connector
            .connect(address)
            .await
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?;
        let connection = Arc::new(NodeConnection::new(address, channel));

        if let Err(e) = self.verify_identity(&connection).await {
            connection.close().await;
            return Err(e);
        }
        Ok(connection)
    }

    /// Asks the node which cluster it belongs to.
    async fn verify_identity(&self, connection: &NodeConnection) -> Result<(), ConnectError> {
        let args = serde_json::to_value(GetClusterDetailsArgs::default())
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?;
        let response = connection
            .call(GetClusterDetailsArgs::METHOD, args)
            .await
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?;

        if let Some(message) = response.error_message() {
            return Err(ConnectError::Unreachable(format!(
                "cluster details failed: {}",
                message
            )));
        }
        let code = response
            .result_info()
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?
            .code;
        if !code.is_success() {
            return Err(ConnectError::Unreachable(format!(
                "cluster details failed: {}",
                code
            )));
        }
        // A reply without a cluster id says nothing about membership
        let details: ClusterDetailsReply = response
            .decode_result()
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?;
        if details.cluster_id.is_empty() {
            return Err(ConnectError::Unreachable(
                "cluster details carry no cluster id".to_string(),
            ));
        }

        if details.cluster_id != self.cluster_id {
            tracing::error!(
                address = %connection.address(),
                expected = %self.cluster_id,
                actual = %details.cluster_id,
                "node belongs to a different cluster"
            );
            return Err(ConnectError::IdentityMismatch {
                expected: self.cluster_id.clone(),
                actual: details.cluster_id,
            });
        }
        Ok(())
    }

    /// Evicts `connection` if it is still the pooled entry for its address.
    ///
    /// Returns whether it was evicted. A connection that has already been
    /// replaced is left alone, and so is its replacement.
    pub(crate) async fn remove_connection(&self, connection: &Arc<NodeConnection>) -> bool {
        let removed = {
            let mut state = self.state.lock().await;
            match state.connections.get(connection.address()) {
                Some(current) if Arc::ptr_eq(current, connection) => {
                    state.connections.remove(connection.address())
                }
                _ => None,
            }
        };

        match removed {
            Some(removed) => {
                self.metrics.connection_evicted();
                tracing::warn!(address = %removed.address(), connection = removed.id(), "evicted broken connection");
                removed.close().await;
                true
            }
            None => false,
        }
    }

    /// Closes every pooled connection and empties the pool.
    pub(crate) async fn close_all(&self) {
        let drained: Vec<Arc<NodeConnection>> = {
            let mut state = self.state.lock().await;
            state.connections.drain().map(|(_, c)| c).collect()
        };
        for connection in drained {
            connection.close().await;
        }
    }

    pub(crate) async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }
}
