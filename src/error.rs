//! Error taxonomy for the signaling data plane.
//!
//! None of these reach the peer directly. Requests that can still be
//! answered get a synthesized SIP response instead; everything else is
//! dropped, logged and counted under its `kind()` label.

use crate::sip::ParseError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SlbError {
    /// Unparseable start line or header block.
    #[error("malformed message: {0}")]
    Malformed(#[from] ParseError),

    /// Well-formed but inconsistent (CSeq/method mismatch, hop limit, missing Call-ID).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// No usable destination (unresolvable target, dead node mid-dialog).
    #[error("unroutable: {0}")]
    Unroutable(String),

    /// Rate limit or full backend outage.
    #[error("admission rejected: {0}")]
    AdmissionRejected(String),

    /// A message that cannot start a dialog arrived without one.
    #[error("cannot initiate a dialog: {0}")]
    OutOfDialog(String),

    /// Panic caught at the worker boundary.
    #[error("runtime fault: {0}")]
    RuntimeFault(String),
}

impl SlbError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SlbError::Malformed(_) => "malformed",
            SlbError::ProtocolViolation(_) => "protocol_violation",
            SlbError::Unroutable(_) => "unroutable",
            SlbError::AdmissionRejected(_) => "admission_rejected",
            SlbError::OutOfDialog(_) => "out_of_dialog",
            SlbError::RuntimeFault(_) => "runtime_fault",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_convert() {
        let err: SlbError = ParseError::InvalidMessage.into();
        assert_eq!(err.kind(), "malformed");
        assert!(err.to_string().starts_with("malformed message"));
    }
}
