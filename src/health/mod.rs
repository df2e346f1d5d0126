//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (probe.rs)
//!     → OPTIONS to each node, registered as a probe entry in the call cache
//!     → reply within the probe window: node alive, entry removed
//!     → no reply: probe timeout marks the node dead, entry removed
//! ```
//!
//! # Design Decisions
//! - Probes reuse the call cache timers instead of a separate state machine
//! - Liveness only changes on probe outcomes, never on dialog traffic

pub mod probe;
