//! Backend node registry.
//!
//! # Responsibilities
//! - Own the fixed list of core SIP servers
//! - Apply the configured distribution policy to select a node
//! - Answer "is this source one of our backends?" for direction detection

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::config::NodeConfig;
use crate::load_balancer::{
    Distribution, DistributionKind,
    node::{NodeSnapshot, SipNode},
};

/// Manages the backend nodes and the selection policy.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: Vec<Arc<SipNode>>,
    kind: DistributionKind,
    strategy: Mutex<Box<dyn Distribution>>,
}

impl NodeRegistry {
    /// Create a registry from configuration.
    pub fn new(configs: &[NodeConfig], kind: DistributionKind) -> Self {
        let mut nodes = Vec::with_capacity(configs.len());
        for config in configs {
            if let Some(addr) = config.resolve() {
                nodes.push(Arc::new(SipNode::new(
                    addr,
                    config.description.clone(),
                    config.weight,
                    config.cost,
                )));
            } else {
                tracing::warn!(address = %config.address, port = config.port, "Invalid node address");
            }
        }
        Self::from_nodes(nodes, kind)
    }

    pub fn from_nodes(nodes: Vec<Arc<SipNode>>, kind: DistributionKind) -> Self {
        let strategy = kind.build(&nodes);
        Self {
            nodes,
            kind,
            strategy: Mutex::new(strategy),
        }
    }

    /// Select a node for a new inbound dialog and count the hit.
    ///
    /// Returns `None` when every node is dead.
    pub fn select(&self) -> Option<Arc<SipNode>> {
        let mut strategy = self
            .strategy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let node = strategy.next_node(&self.nodes);
        match &node {
            Some(node) => node.record_hit(),
            None => {
                tracing::debug!(node_count = self.nodes.len(), "No live nodes available");
                for n in &self.nodes {
                    tracing::debug!(node = %n.addr, alive = n.is_alive(), "Node status");
                }
            }
        }
        node
    }

    /// Find the configured node with this exact address.
    pub fn find(&self, addr: SocketAddr) -> Option<Arc<SipNode>> {
        self.nodes.iter().find(|n| n.addr == addr).cloned()
    }

    /// All nodes in configuration order (for health probing).
    pub fn nodes(&self) -> &[Arc<SipNode>] {
        &self.nodes
    }

    pub fn distribution(&self) -> DistributionKind {
        self.kind
    }

    pub fn alive_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_alive()).count()
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes.iter().map(|n| n.snapshot()).collect()
    }
}
