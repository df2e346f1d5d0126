//! Dialog tracking.
//!
//! # Data Flow
//! ```text
//! Parsed message (worker)
//!     → cache.rs resolve()
//!         known Call-ID:   entry.rs (log, status, Via rewrite) → next hop
//!         new Call-ID:     limiter + registry → new entry → node
//!         probe reply:     node alive, entry removed
//!     → timer.rs (timeout → Timedout, clear → removed)
//! ```
//!
//! # Design Decisions
//! - One entry per Call-ID, created by an atomic check-and-insert
//! - Routing is symmetric: peer traffic goes to the node, the rest to the peer
//! - Timer callbacks take the same entry lock as message handling

pub mod cache;
pub mod entry;
pub mod timer;

pub use cache::{CacheSettings, CallCache, Route};
pub use entry::{CallEntry, CallStatus, Direction, EntrySnapshot};
