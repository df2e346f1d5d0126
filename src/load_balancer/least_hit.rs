//! Least-hit distribution.

use std::sync::Arc;
use crate::load_balancer::{Distribution, node::SipNode};

/// Least-hit selector.
/// Selects the live node with the fewest dialogs assigned so far.
#[derive(Debug, Default)]
pub struct LeastHit;

impl Distribution for LeastHit {
    fn next_node(&mut self, nodes: &[Arc<SipNode>]) -> Option<Arc<SipNode>> {
        // In case of tie, the first one is selected (stability)
        nodes
            .iter()
            .filter(|n| n.is_alive())
            .min_by_key(|n| n.hits())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_hit() {
        let mut lb = LeastHit;
        let b1 = Arc::new(SipNode::new("127.0.0.1:5060".parse().unwrap(), "b1", 1, 0));
        let b2 = Arc::new(SipNode::new("127.0.0.1:5061".parse().unwrap(), "b2", 1, 0));
        let nodes = vec![b1.clone(), b2.clone()];

        // Tie goes to list order
        assert_eq!(lb.next_node(&nodes).unwrap().addr, b1.addr);

        b1.record_hit();
        assert_eq!(lb.next_node(&nodes).unwrap().addr, b2.addr);

        b2.record_hit();
        b2.record_hit();
        assert_eq!(lb.next_node(&nodes).unwrap().addr, b1.addr);

        b1.set_alive(false);
        assert_eq!(lb.next_node(&nodes).unwrap().addr, b2.addr);
    }
}
