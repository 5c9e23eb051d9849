//! In-memory nodes for unit tests.
//!
//! A [`MockConnector`] hands out channels to scripted nodes. Each node can be
//! made unreachable, made to fail calls at the transport level, made to
//! report another cluster id, or given a custom reply function. Connects and
//! closes are counted per address. Connects and calls yield to the runtime
//! before doing anything, so concurrent callers really interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use forestbus_common::{ForestBusError, Method, Response, RpcArgs};
use serde_json::{json, Value};

use crate::connection::{Connector, RpcChannel};

pub(crate) type ReplyFn = Arc<dyn Fn(Method, &RpcArgs) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct MockNode {
    pub(crate) cluster_id: String,
    pub(crate) reachable: bool,
    /// Accepts connections but every call fails at the transport level
    pub(crate) broken: bool,
    pub(crate) reply: ReplyFn,
    /// Raw identity reply, sent as is instead of one carrying `cluster_id`
    pub(crate) details: Option<Value>,
}

impl MockNode {
    pub(crate) fn new(cluster_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            reachable: true,
            broken: false,
            reply: Arc::new(default_reply),
            details: None,
        }
    }

    pub(crate) fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub(crate) fn with_reply<F>(mut self, reply: F) -> Self
    where
        F: Fn(Method, &RpcArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.reply = Arc::new(reply);
        self
    }
}

fn default_reply(method: Method, _args: &RpcArgs) -> Result<Value, String> {
    Ok(match method {
        Method::SendMessages => json!({"Result": {"Code": 0}, "IDs": [7]}),
        Method::GetTopicDetails => json!({"Result": {"Code": 0}, "CommitIndex": 3}),
        Method::ReceiveMessages => json!({"ReceivedMessages": [], "NextID": 0}),
        Method::GetClusterDetails => json!({}),
    })
}

#[derive(Default)]
struct MockState {
    nodes: HashMap<String, MockNode>,
    connects: Vec<String>,
    calls: Vec<(String, Method)>,
    closes: HashMap<String, usize>,
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
    connect_delay: Option<Duration>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every connect sleeps this long before reaching the node.
    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub(crate) fn add_node(&self, address: &str, node: MockNode) -> &Self {
        self.lock().nodes.insert(address.to_string(), node);
        self
    }

    pub(crate) fn update<F: FnOnce(&mut MockNode)>(&self, address: &str, f: F) {
        if let Some(node) = self.lock().nodes.get_mut(address) {
            f(node);
        }
    }

    pub(crate) fn set_reachable(&self, address: &str, reachable: bool) {
        self.update(address, |n| n.reachable = reachable);
    }

    pub(crate) fn set_broken(&self, address: &str, broken: bool) {
        self.update(address, |n| n.broken = broken);
    }

    /// Every connect attempt in order, including failed ones.
    pub(crate) fn connects(&self) -> Vec<String> {
        self.lock().connects.clone()
    }

    pub(crate) fn connect_count(&self, address: &str) -> usize {
        self.lock().connects.iter().filter(|a| *a == address).count()
    }

    /// Non-identity calls in order, as (address, method).
    pub(crate) fn calls(&self) -> Vec<(String, Method)> {
        self.lock()
            .calls
            .iter()
            .filter(|(_, m)| *m != Method::GetClusterDetails)
            .cloned()
            .collect()
    }

    pub(crate) fn close_count(&self, address: &str) -> usize {
        self.lock().closes.get(address).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn RpcChannel>, ForestBusError> {
        match self.connect_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        let mut state = self.lock();
        state.connects.push(address.to_string());
        match state.nodes.get(address) {
            Some(node) if node.reachable => Ok(Arc::new(MockChannel {
                address: address.to_string(),
                state: self.state.clone(),
                closed: AtomicBool::new(false),
            })),
            _ => Err(ForestBusError::Connection(format!(
                "Failed to connect to {}: connection refused",
                address
            ))),
        }
    }
}

struct MockChannel {
    address: String,
    state: Arc<Mutex<MockState>>,
    closed: AtomicBool,
}

#[async_trait]
impl RpcChannel for MockChannel {
    async fn call(&self, method: Method, args: RpcArgs) -> Result<Response, ForestBusError> {
        tokio::task::yield_now().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(ForestBusError::Closed);
        }
        let node = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((self.address.clone(), method));
            state.nodes.get(&self.address).cloned()
        };
        let node = match node {
            Some(node) if node.reachable && !node.broken => node,
            _ => return Err(ForestBusError::Connection("connection reset".to_string())),
        };

        if method == Method::GetClusterDetails {
            if let Some(details) = node.details {
                return Ok(Response::success(0, details));
            }
            let mut details = (node.reply)(method, &args).unwrap_or_else(|_| json!({}));
            if let Value::Object(fields) = &mut details {
                fields
                    .entry("ClusterID")
                    .or_insert_with(|| Value::String(node.cluster_id.clone()));
            }
            return Ok(Response::success(0, details));
        }

        match (node.reply)(method, &args) {
            Ok(result) => Ok(Response::success(0, result)),
            Err(message) => Ok(Response::error(0, message)),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            *self
                .state
                .lock()
                .unwrap()
                .closes
                .entry(self.address.clone())
                .or_insert(0) += 1;
        }
    }
}
