//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! New inbound dialog (call cache)
//!     → registry.rs (lock, delegate to the configured policy)
//!     → Apply distribution policy:
//!         - round_robin.rs (rotate through live nodes)
//!         - least_hit.rs (fewest dialogs assigned)
//!         - least_cost.rs (lowest configured cost)
//!         - most_idle.rs (least recently hit)
//!         - weighted.rs (smooth weighted round-robin sequence)
//!         - random.rs (uniform pick)
//!     → node.rs (record hit) → Some(node) or None on full outage
//! ```
//!
//! # Design Decisions
//! - Policy chosen once at startup, fixed for the process lifetime
//! - Dead nodes are skipped by every policy; each scan is bounded by node count
//! - Select and hit recording happen under one registry lock

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod least_cost;
pub mod least_hit;
pub mod most_idle;
pub mod node;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod weighted;

use self::node::SipNode;

/// A node selection policy.
///
/// Implementations must only return live nodes and must terminate within one
/// pass over `nodes`.
pub trait Distribution: Send + std::fmt::Debug {
    fn next_node(&mut self, nodes: &[Arc<SipNode>]) -> Option<Arc<SipNode>>;
}

/// Configured distribution policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    #[default]
    RoundRobin,
    LeastHit,
    LeastCost,
    MostIdle,
    Weighted,
    Random,
}

impl DistributionKind {
    /// Build the policy for a fixed node list.
    pub fn build(self, nodes: &[Arc<SipNode>]) -> Box<dyn Distribution> {
        match self {
            DistributionKind::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            DistributionKind::LeastHit => Box::new(least_hit::LeastHit),
            DistributionKind::LeastCost => Box::new(least_cost::LeastCost),
            DistributionKind::MostIdle => Box::new(most_idle::MostIdle),
            DistributionKind::Weighted => Box::new(weighted::Weighted::new(nodes)),
            DistributionKind::Random => Box::new(random::Random::new()),
        }
    }
}
