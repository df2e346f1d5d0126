//! Round-robin distribution.

use std::sync::Arc;
use crate::load_balancer::{Distribution, node::SipNode};

/// Round-robin selector.
/// Keeps a cursor just past the last node it returned.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Distribution for RoundRobin {
    fn next_node(&mut self, nodes: &[Arc<SipNode>]) -> Option<Arc<SipNode>> {
        let len = nodes.len();
        for i in 0..len {
            let index = (self.cursor + i) % len;
            if nodes[index].is_alive() {
                // Resume after the pick, not after the start, so a dead node
                // never makes the same live node come up twice in a row.
                self.cursor = (index + 1) % len;
                return Some(nodes[index].clone());
            }
        }
        None
    }
}
