//! Candidate ordering with per-topic leader affinity.
//!
//! Every call walks the configured node list once. The node that last served
//! the call's topic (or, for calls without a topic, the node that last served
//! such a call) is tried first; the remaining nodes follow in configured
//! order. Affinity is only a hint: it is recorded after a success and never
//! trusted before one.

use std::collections::HashMap;
use std::sync::Arc;

/// Last known serving node per topic, plus the last node used for calls that
/// are not scoped to a topic.
#[derive(Debug, Clone, Default)]
pub struct LeaderAffinity {
    topics: HashMap<String, String>,
    last_read: Option<String>,
}

impl LeaderAffinity {
    pub fn new() -> Self {
        Self::default()
    }

    /// The address to try first for `topic`, or for unscoped calls when
    /// `topic` is `None`.
    pub fn hint(&self, topic: Option<&str>) -> Option<&str> {
        match topic {
            Some(topic) => self.topics.get(topic).map(String::as_str),
            None => self.last_read.as_deref(),
        }
    }

    /// Records `address` as the node that just served a call.
    pub fn record(&mut self, topic: Option<&str>, address: &str) {
        match topic {
            Some(topic) => {
                if self.topics.get(topic).map(String::as_str) != Some(address) {
                    self.topics.insert(topic.to_string(), address.to_string());
                }
            }
            None => self.last_read = Some(address.to_string()),
        }
    }

    pub fn leader_for(&self, topic: &str) -> Option<&str> {
        self.hint(Some(topic))
    }

    pub fn last_read(&self) -> Option<&str> {
        self.hint(None)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// Produces the per-call candidate order from the fixed membership list.
#[derive(Debug, Clone)]
pub struct NodeSelector {
    nodes: Arc<[String]>,
}

impl NodeSelector {
    /// Creates a selector over `nodes`. Duplicates are dropped, keeping the
    /// first occurrence.
    pub fn new(nodes: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !unique.contains(&node) {
                unique.push(node);
            }
        }
        Self {
            nodes: unique.into(),
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Orders the membership for one call.
    ///
    /// The hinted address, if it is a configured node, moves to the front;
    /// everything else keeps its configured relative order.
    pub fn candidate_order(&self, affinity: &LeaderAffinity, topic: Option<&str>) -> CandidateOrder {
        let mut addresses: Vec<String> = self.nodes.to_vec();
        if let Some(hint) = affinity.hint(topic) {
            if let Some(pos) = addresses.iter().position(|a| a == hint) {
                let preferred = addresses.remove(pos);
                addresses.insert(0, preferred);
            }
        }

        CandidateOrder {
            topic: topic.map(str::to_string),
            addresses,
            cursor: 0,
        }
    }
}

/// The ordered candidates of one call and a cursor over them.
///
/// Each address is handed out at most once.
#[derive(Debug, Clone)]
pub struct CandidateOrder {
    topic: Option<String>,
    addresses: Vec<String>,
    cursor: usize,
}

impl CandidateOrder {
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Number of candidates handed out so far.
    pub fn attempted(&self) -> usize {
        self.cursor
    }

    /// Records the address that served the call as the new affinity entry.
    pub fn record_success(&self, affinity: &mut LeaderAffinity, address: &str) {
        affinity.record(self.topic.as_deref(), address);
    }
}

impl Iterator for CandidateOrder {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let next = self.addresses.get(self.cursor).cloned();
        if next.is_some() {
            self.cursor += 1;
        }
        next
    }
}
