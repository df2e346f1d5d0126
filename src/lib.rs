//! Dialog-aware SIP UDP load balancer library.

// Core subsystems
pub mod config;
pub mod error;
pub mod net;
pub mod sip;

// Traffic management
pub mod dialog;
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::BalancerConfig;
pub use dialog::CallCache;
pub use error::SlbError;
pub use lifecycle::{Balancer, Shutdown};
