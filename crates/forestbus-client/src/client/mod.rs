use std::sync::Arc;

use forestbus_common::{
    ForestBusError, GetClusterDetailsArgs, GetTopicDetailsArgs, ReceiveMessagesArgs, RemoteCall,
    ResultCode, SendMessagesArgs,
};

use crate::config::ClientConfig;
use crate::connection::{Connector, TcpConnector};
use crate::error::{ClientError, Result};
use crate::metrics::{ClientMetrics, ClientStats};
use crate::pool::{ConnectError, ConnectionPool};
use crate::selector::NodeSelector;
use crate::state::{self, SharedState};


/// A batch of messages read from a topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageBatch {
    /// Payloads in index order. May hold more or fewer than requested.
    pub messages: Vec<Vec<u8>>,
    /// Index to ask for next. When the requested start index has been
    /// expired this is the oldest index still retained.
    pub next_index: u64,
}

/// Cluster membership as reported by one node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterDetails {
    pub cluster_id: String,
    pub peers: Vec<String>,
    pub topics: Vec<String>,
}

/// Client for a Forest Bus cluster.
///
/// Calls go to the node that last served the same topic, falling back through
/// the configured node list in order. Connections are opened on first use,
/// checked against the expected cluster id and kept for reuse until a
/// transport failure evicts them.
///
/// Cloning is cheap; clones share one connection pool and one set of leader
/// hints. Calls from many tasks may run at once, and a long-polling read never
/// holds up calls on other topics.
///
/// # Example
///
/// ```no_run
/// use forestbus_client::Client;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new("abc", ["n1:3000", "n2:3000"])?;
/// let ids = client
///     .send_messages("orders", vec![b"hello".to_vec()], true)
///     .await?;
/// let batch = client.get_messages("orders", ids[0], 10, false).await?;
/// assert_eq!(batch.messages[0], b"hello");
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    cluster_id: String,
    selector: NodeSelector,
    config: ClientConfig,
    state: SharedState,
    pool: ConnectionPool,
    metrics: Arc<ClientMetrics>,
}

impl Client {
    /// Creates a client with the default configuration.
    ///
    /// No connection is opened until the first call.
    pub fn new<I, S>(cluster_id: impl Into<String>, nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(cluster_id, nodes, ClientConfig::default())
    }

    pub fn with_config<I, S>(cluster_id: impl Into<String>, nodes: I, config: ClientConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let connector = TcpConnector::new(config.connect_timeout, config.request_timeout);
        Self::with_connector(cluster_id, nodes, config, connector)
    }

    /// Creates a client that opens node channels through `connector`.
    pub fn with_connector<I, S, C>(
        cluster_id: impl Into<String>,
        nodes: I,
        config: ClientConfig,
        connector: C,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        C: Connector,
    {
        let cluster_id = cluster_id.into();
        if cluster_id.trim().is_empty() {
            return Err(ClientError::Config("cluster id must not be empty".to_string()));
        }

        let nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        if nodes.is_empty() {
            return Err(ClientError::Config("at least one node address is required".to_string()));
        }
        if nodes.iter().any(|n| n.trim().is_empty()) {
            return Err(ClientError::Config("node addresses must not be empty".to_string()));
        }

        let selector = NodeSelector::new(nodes);
        let state = state::shared();
        let metrics = Arc::new(ClientMetrics::default());
        let pool = ConnectionPool::new(
            cluster_id.clone(),
            Arc::new(connector),
            state.clone(),
            metrics.clone(),
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                cluster_id,
                selector,
                config,
                state,
                pool,
                metrics,
            }),
        })
    }

    /// Reads up to about `quantity` messages of `topic` starting at
    /// `start_index`.
    ///
    /// With `wait` set the node holds the call until at least one message at
    /// or after `start_index` exists.
    pub async fn get_messages(
        &self,
        topic: &str,
        start_index: u64,
        quantity: u64,
        wait: bool,
    ) -> Result<MessageBatch> {
        let args = ReceiveMessagesArgs {
            cluster_id: self.inner.cluster_id.clone(),
            topic: topic.to_string(),
            id: start_index,
            quantity,
            wait_for_messages: wait,
        };
        let reply = self.dispatch(Some(topic), &args).await?;

        Ok(MessageBatch {
            messages: reply.received_messages,
            next_index: reply.next_id,
        })
    }

    /// Highest committed index of `topic`. May be 0 right after a full
    /// cluster restart.
    pub async fn get_topic_max_index(&self, topic: &str) -> Result<u64> {
        let args = GetTopicDetailsArgs {
            topic: topic.to_string(),
        };
        let reply = self.dispatch(Some(topic), &args).await?;
        Ok(reply.commit_index)
    }

    /// Appends `messages` to `topic` and returns their assigned indices.
    ///
    /// With `wait_for_commit` set the call returns only once a majority of
    /// the cluster holds the messages.
    pub async fn send_messages(
        &self,
        topic: &str,
        messages: Vec<Vec<u8>>,
        wait_for_commit: bool,
    ) -> Result<Vec<u64>> {
        let args = SendMessagesArgs {
            topic: topic.to_string(),
            sent_messages: messages,
            wait_for_commit,
        };
        let reply = self.dispatch(Some(topic), &args).await?;
        Ok(reply.ids)
    }

    /// Cluster id, peers and topics as seen by any available node.
    pub async fn cluster_details(&self) -> Result<ClusterDetails> {
        let reply = self.dispatch(None, &GetClusterDetailsArgs::default()).await?;
        Ok(ClusterDetails {
            cluster_id: reply.cluster_id,
            peers: reply.peers,
            topics: reply.topics,
        })
    }

    /// Closes all pooled connections. Leader hints are kept and the client
    /// stays usable; the next call reconnects.
    pub async fn close(&self) {
        self.inner.pool.close_all().await;
    }

    pub fn stats(&self) -> ClientStats {
        self.inner.metrics.snapshot()
    }

    /// Configured node addresses, without duplicates.
    pub fn nodes(&self) -> &[String] {
        self.inner.selector.nodes()
    }

    pub fn cluster_id(&self) -> &str {
        &self.inner.cluster_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The node that last served `topic`. A hint only.
    pub async fn leader_hint(&self, topic: &str) -> Option<String> {
        let state = self.inner.state.lock().await;
        state.affinity.leader_for(topic).map(str::to_string)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.pool.connection_count().await
    }

    /// Runs one remote call against the candidates in order until one
    /// answers.
    ///
    /// Unreachable nodes and transport failures move on to the next
    /// candidate; a transport failure also evicts the connection. A cluster
    /// id mismatch ends the call at once. Application errors end the call
    /// too, except leadership codes when `retry_not_leader` is set.
    async fn dispatch<A: RemoteCall>(&self, topic: Option<&str>, args: &A) -> Result<A::Reply> {
        let method = A::METHOD;
        let params = serde_json::to_value(args)?;

        let mut candidates = {
            let state = self.inner.state.lock().await;
            self.inner.selector.candidate_order(&state.affinity, topic)
        };
        tracing::debug!(method = %method, topic = ?topic, candidates = ?candidates.addresses(), "dispatching call");

        let mut last_failure: Option<(String, String)> = None;
        let mut leadership_error: Option<ClientError> = None;

        while let Some(address) = candidates.next() {
            if candidates.attempted() > 1 {
                self.inner.metrics.failover();
            }

            let connection = match self.inner.pool.get_connection(&address).await {
                Ok(connection) => connection,
                Err(ConnectError::IdentityMismatch { expected, actual }) => {
                    return Err(ClientError::ClusterIdentityMismatch {
                        address,
                        expected,
                        actual,
                    });
                }
                Err(ConnectError::Unreachable(reason)) => {
                    tracing::warn!(address = %address, method = %method, error = %reason, "node unavailable");
                    last_failure = Some((address, reason));
                    continue;
                }
            };

            let response = match connection.call(method, params.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(address = %address, method = %method, error = %e, "call failed");
                    self.inner.pool.remove_connection(&connection).await;
                    last_failure = Some((address, e.to_string()));
                    continue;
                }
            };

            if let Some(message) = response.error_message() {
                return Err(ClientError::Application {
                    topic: topic.map(str::to_string),
                    address,
                    code: ResultCode::Failure,
                    message: message.to_string(),
                });
            }

            let invalid = |e: ForestBusError| ClientError::InvalidResponse {
                address: address.clone(),
                message: e.to_string(),
            };

            let code = response.result_info().map_err(invalid)?.code;
            if !code.is_success() {
                let error = ClientError::Application {
                    topic: topic.map(str::to_string),
                    address: address.clone(),
                    code,
                    message: code.to_string(),
                };
                if code.is_leadership() && self.inner.config.retry_not_leader {
                    tracing::debug!(address = %address, topic = ?topic, code = %code, "node cannot serve topic, trying next");
                    leadership_error = Some(error);
                    continue;
                }
                return Err(error);
            }

            // Success must carry the full payload
            let reply: A::Reply = response.decode_result().map_err(invalid)?;

            {
                let mut state = self.inner.state.lock().await;
                candidates.record_success(&mut state.affinity, &address);
            }
            self.inner.metrics.call_completed();
            return Ok(reply);
        }

        if let Some(error) = leadership_error {
            return Err(error);
        }

        let (last_address, last_error) = last_failure.unwrap_or_default();
        Err(ClientError::NoNodesAvailable {
            topic: topic.map(str::to_string),
            last_address,
            last_error,
        })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("cluster_id", &self.inner.cluster_id)
            .field("nodes", &self.inner.selector.nodes())
            .finish()
    }
}
