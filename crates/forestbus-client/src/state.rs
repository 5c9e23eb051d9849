use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::pool::{ConnectAttempt, NodeConnection};
use crate::selector::LeaderAffinity;

/// All mutable state shared by the clones of one client.
///
/// The connection map, the connects still in flight, the per-topic affinity
/// entries and the last-read cursor sit behind a single lock. It is held for
/// bookkeeping only and is always released before a remote call is issued.
#[derive(Default)]
pub(crate) struct ClusterState {
    pub(crate) connections: HashMap<String, Arc<NodeConnection>>,
    /// At most one per address, removed once it settles
    pub(crate) connecting: HashMap<String, ConnectAttempt>,
    pub(crate) affinity: LeaderAffinity,
}

pub(crate) type SharedState = Arc<Mutex<ClusterState>>;

pub(crate) fn shared() -> SharedState {
    Arc::new(Mutex::new(ClusterState::default()))
}
