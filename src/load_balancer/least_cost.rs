//! Least-cost distribution.

use std::sync::Arc;
use crate::load_balancer::{Distribution, node::SipNode};

/// Picks the cheapest live node; ties go to list order.
#[derive(Debug, Default)]
pub struct LeastCost;

impl Distribution for LeastCost {
    fn next_node(&mut self, nodes: &[Arc<SipNode>]) -> Option<Arc<SipNode>> {
        nodes
            .iter()
            .filter(|n| n.is_alive())
            .min_by_key(|n| n.cost)
            .cloned()
    }
}
