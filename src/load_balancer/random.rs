//! Random distribution.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use crate::load_balancer::{Distribution, node::SipNode};

/// Uniform pick among live nodes.
#[derive(Debug)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Deterministic sequence, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new()
    }
}

impl Distribution for Random {
    fn next_node(&mut self, nodes: &[Arc<SipNode>]) -> Option<Arc<SipNode>> {
        let alive: Vec<&Arc<SipNode>> = nodes.iter().filter(|n| n.is_alive()).collect();
        alive.choose(&mut self.rng).map(|n| Arc::clone(n))
    }
}
