//! Weighted distribution.
//!
//! The node order for one full cycle is computed once at startup with the
//! smooth weighted round-robin walk, so heavy nodes are interleaved with
//! light ones instead of being served in a burst.

use std::sync::Arc;
use crate::load_balancer::{Distribution, node::SipNode};

/// Walks a precomputed sequence of node indices, skipping dead nodes.
#[derive(Debug)]
pub struct Weighted {
    sequence: Vec<usize>,
    cursor: usize,
}

impl Weighted {
    pub fn new(nodes: &[Arc<SipNode>]) -> Self {
        let weights: Vec<u32> = nodes.iter().map(|n| n.weight).collect();
        Self {
            sequence: smooth_sequence(&weights),
            cursor: 0,
        }
    }

    pub fn sequence(&self) -> &[usize] {
        &self.sequence
    }
}

/// One full cycle of smooth weighted round-robin over `weights`.
///
/// The cycle length is the weight total and each index appears exactly
/// `weights[i]` times. Ties go to the lower index.
pub fn smooth_sequence(weights: &[u32]) -> Vec<usize> {
    let total: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let mut current: Vec<i64> = weights.iter().map(|&w| i64::from(w)).collect();
    let mut sequence = Vec::with_capacity(total as usize);

    for _ in 0..total {
        let mut best: Option<usize> = None;
        for (i, &weight) in weights.iter().enumerate() {
            if weight == 0 {
                continue;
            }
            match best {
                Some(b) if current[b] >= current[i] => {}
                _ => best = Some(i),
            }
        }
        let Some(best) = best else { break };

        current[best] -= total;
        for (acc, &weight) in current.iter_mut().zip(weights) {
            *acc += i64::from(weight);
        }
        sequence.push(best);
    }

    sequence
}

impl Distribution for Weighted {
    fn next_node(&mut self, nodes: &[Arc<SipNode>]) -> Option<Arc<SipNode>> {
        let len = self.sequence.len();
        for _ in 0..len {
            let index = self.sequence[self.cursor];
            self.cursor = (self.cursor + 1) % len;
            if let Some(node) = nodes.get(index) {
                if node.is_alive() {
                    return Some(node.clone());
                }
            }
        }
        None
    }
}
