//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! New inbound dialog (call cache):
//!     → rate_limit.rs (per-second admission ceiling)
//!     → admitted: select a node
//!     → refused: answer 429 to the sender
//! ```
//!
//! # Design Decisions
//! - Only new inbound dialogs are gated; mid-dialog and outbound traffic pass
//! - Fail closed: a ceiling of 0 refuses everything

pub mod rate_limit;
