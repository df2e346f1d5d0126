//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Registry/limiter/cache → Workers, prober → Receive loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop receiving → Workers drain their queues → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then the socket
//! - Call state is in memory only and is lost on exit

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Balancer, StartupError};
