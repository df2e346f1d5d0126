//! Most-idle distribution.

use std::sync::Arc;
use crate::load_balancer::{Distribution, node::SipNode};

/// Picks the live node hit least recently. Never-hit nodes come first.
#[derive(Debug, Default)]
pub struct MostIdle;

impl Distribution for MostIdle {
    fn next_node(&mut self, nodes: &[Arc<SipNode>]) -> Option<Arc<SipNode>> {
        nodes
            .iter()
            .filter(|n| n.is_alive())
            .min_by_key(|n| n.last_hit_ms())
            .cloned()
    }
}
