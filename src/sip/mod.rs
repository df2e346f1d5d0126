//! SIP wire format.
//!
//! # Data Flow
//! ```text
//! datagram bytes
//!     → parser.rs (start line, headers, body; loop over pipelined messages)
//!     → message.rs (SipMessage with hoisted Call-ID, tags, top branch)
//!     → dialog cache rewrites Via (headers.rs push/pop)
//!     → message.rs to_bytes() → socket
//! ```
//!
//! # Design Decisions
//! - Only one transport (UDP); no reassembly across datagrams
//! - Header names are case-insensitive; canonical casing only on output
//! - No authentication, no full header canonicalization

pub mod builder;
pub mod headers;
pub mod ident;
pub mod message;
pub mod method;
pub mod parser;

pub use headers::Headers;
pub use message::{SipMessage, StartLine};
pub use method::Method;
pub use parser::{parse, ParseError};
