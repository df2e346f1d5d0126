//! Backend node abstraction.
//!
//! # Responsibilities
//! - Represent a single core SIP server
//! - Track hits and last-hit time (for Least-Hit / Most-Idle selection)
//! - Track liveness as reported by the health prober

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::observability::metrics;

/// A single backend server.
#[derive(Debug)]
pub struct SipNode {
    /// Where dialogs assigned to this node are sent.
    pub addr: SocketAddr,
    pub description: String,
    /// Share for weighted distribution.
    pub weight: u32,
    /// Preference for least-cost distribution (lower wins).
    pub cost: u32,

    alive: AtomicBool,
    hits: AtomicU64,
    /// Unix time of the last hit in milliseconds; 0 when never hit.
    last_hit_ms: AtomicU64,
}

/// Read-only view of a node for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub address: String,
    pub description: String,
    pub weight: u32,
    pub cost: u32,
    pub alive: bool,
    pub hits: u64,
    pub last_hit_ms: u64,
}

impl SipNode {
    /// Create a node. Nodes start alive; the first probe round corrects that.
    pub fn new(addr: SocketAddr, description: impl Into<String>, weight: u32, cost: u32) -> Self {
        Self {
            addr,
            description: description.into(),
            weight,
            cost,
            alive: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            last_hit_ms: AtomicU64::new(0),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Update liveness. Returns true when the value actually changed.
    ///
    /// Only the probe paths call this; dialog traffic never flips liveness.
    pub(crate) fn set_alive(&self, alive: bool) -> bool {
        let previous = self.alive.swap(alive, Ordering::AcqRel);
        if previous != alive {
            if alive {
                tracing::info!(node = %self.addr, description = %self.description, "Node is alive");
            } else {
                tracing::warn!(node = %self.addr, description = %self.description, "Node is dead");
            }
            metrics::record_node_alive(&self.addr, alive);
            return true;
        }
        false
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn last_hit_ms(&self) -> u64 {
        self.last_hit_ms.load(Ordering::Relaxed)
    }

    /// Count a new dialog assigned to this node.
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        // Wall clock may step backwards
        self.last_hit_ms.fetch_max(now, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            address: self.addr.to_string(),
            description: self.description.clone(),
            weight: self.weight,
            cost: self.cost,
            alive: self.is_alive(),
            hits: self.hits(),
            last_hit_ms: self.last_hit_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_transitions() {
        let node = SipNode::new("127.0.0.1:5060".parse().unwrap(), "core-1", 1, 0);
        assert!(node.is_alive());
        assert!(!node.set_alive(true));
        assert!(node.set_alive(false));
        assert!(!node.set_alive(false));
        assert!(!node.is_alive());
        assert!(node.set_alive(true));
    }

    #[test]
    fn test_hits_are_monotonic() {
        let node = SipNode::new("127.0.0.1:5060".parse().unwrap(), "core-1", 1, 0);
        node.record_hit();
        let first = node.last_hit_ms();
        node.record_hit();
        assert_eq!(node.hits(), 2);
        assert!(first > 0);
        assert!(node.last_hit_ms() >= first);
    }
}
