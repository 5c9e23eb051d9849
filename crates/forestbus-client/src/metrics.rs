use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of client counters. All counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Connections opened and verified
    pub connections_created: u64,
    /// Connections dropped from the pool after a transport failure
    pub connections_evicted: u64,
    /// Times a call moved on from one candidate node to the next
    pub failovers: u64,
    /// Calls that returned a result
    pub calls_completed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ClientMetrics {
    connections_created: AtomicU64,
    connections_evicted: AtomicU64,
    failovers: AtomicU64,
    calls_completed: AtomicU64,
}

impl ClientMetrics {
    pub(crate) fn connection_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_evicted(&self) {
        self.connections_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failover(&self) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn call_completed(&self) {
        self.calls_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ClientStats {
        ClientStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            calls_completed: self.calls_completed.load(Ordering::Relaxed),
        }
    }
}
