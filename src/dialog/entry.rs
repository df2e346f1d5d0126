//! Per-dialog call state.

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::dialog::timer::Timer;
use crate::load_balancer::node::SipNode;
use crate::sip::SipMessage;

/// Where a dialog is in its lifecycle.
///
/// Transitions only move forward: `Progressing`, then `Cancelled`, then one
/// of the final states. Once final, the status no longer changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallStatus {
    Progressing,
    Cancelled,
    Answered,
    Rejected,
    Timedout,
}

impl CallStatus {
    fn rank(self) -> u8 {
        match self {
            CallStatus::Progressing => 0,
            CallStatus::Cancelled => 1,
            CallStatus::Answered | CallStatus::Rejected | CallStatus::Timedout => 2,
        }
    }

    pub fn is_final(self) -> bool {
        self.rank() == 2
    }
}

/// Which side opened the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Access peer towards a core node.
    Inbound,
    /// Core node towards an access peer.
    Outbound,
}

/// One distinct message seen on the dialog.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedMessage {
    pub summary: String,
    #[serde(skip)]
    pub fingerprint: u64,
    /// Times this exact message was received.
    pub seen: u32,
}

/// Mutable part of an entry, guarded by the entry lock.
#[derive(Debug)]
pub struct CallState {
    pub status: CallStatus,
    pub messages: Vec<LoggedMessage>,
    pub timeout_timer: Option<Timer>,
    pub clear_timer: Option<Timer>,
}

impl CallState {
    fn new() -> Self {
        Self {
            status: CallStatus::Progressing,
            messages: Vec::new(),
            timeout_timer: None,
            clear_timer: None,
        }
    }

    /// Move to `next` if that is not a step backwards. Returns whether the
    /// status changed.
    pub fn advance(&mut self, next: CallStatus) -> bool {
        if self.status == next || self.status.is_final() || next.rank() < self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }

    /// Append `msg` to the log. Returns `true` when an identical message was
    /// already recorded, in which case only its counter is bumped.
    pub fn record(&mut self, msg: &SipMessage) -> bool {
        self.record_received(msg.summary(), fingerprint(msg))
    }

    /// Like [`record`](Self::record), for a message whose fingerprint was
    /// taken before it was rewritten.
    pub fn record_received(&mut self, summary: String, fingerprint: u64) -> bool {
        if let Some(logged) = self.messages.iter_mut().find(|m| m.fingerprint == fingerprint) {
            logged.seen += 1;
            return true;
        }
        self.messages.push(LoggedMessage {
            summary,
            fingerprint,
            seen: 1,
        });
        false
    }
}

/// Hash of the serialized message, used to spot retransmissions.
pub fn fingerprint(msg: &SipMessage) -> u64 {
    let mut hasher = DefaultHasher::new();
    msg.to_bytes().hash(&mut hasher);
    hasher.finish()
}

/// Cache entry for one dialog (or one health probe).
#[derive(Debug)]
pub struct CallEntry {
    pub call_id: String,
    /// Core node serving the dialog. For outbound dialogs, the node that sent it.
    pub node: Arc<SipNode>,
    /// Non-core side of the dialog.
    pub peer: SocketAddr,
    pub direction: Direction,
    pub from_tag: String,
    /// Branch this balancer pushes on top of Via for requests it relays.
    pub branch: String,
    pub is_probe: bool,
    pub created_ms: u64,
    state: Mutex<CallState>,
}

impl CallEntry {
    pub fn new(
        call_id: impl Into<String>,
        node: Arc<SipNode>,
        peer: SocketAddr,
        direction: Direction,
        from_tag: impl Into<String>,
        branch: impl Into<String>,
        is_probe: bool,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            node,
            peer,
            direction,
            from_tag: from_tag.into(),
            branch: branch.into(),
            is_probe,
            created_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            state: Mutex::new(CallState::new()),
        }
    }

    /// Lock the mutable state. A panic on another worker leaves the state usable.
    pub fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> CallStatus {
        self.lock().status
    }

    /// Where a message from `source` goes next.
    ///
    /// Traffic from the peer goes to the node and everything else goes back
    /// to the peer, so both legs share one entry.
    pub fn destination_for(&self, source: SocketAddr) -> SocketAddr {
        if source == self.peer {
            self.node.addr
        } else {
            self.peer
        }
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        let state = self.lock();
        EntrySnapshot {
            call_id: self.call_id.clone(),
            node: self.node.addr.to_string(),
            peer: self.peer.to_string(),
            direction: self.direction,
            from_tag: self.from_tag.clone(),
            branch: self.branch.clone(),
            status: state.status,
            is_probe: self.is_probe,
            created_ms: self.created_ms,
            messages: state.messages.clone(),
        }
    }
}

/// Read-only view of an entry for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub call_id: String,
    pub node: String,
    pub peer: String,
    pub direction: Direction,
    pub from_tag: String,
    pub branch: String,
    pub status: CallStatus,
    pub is_probe: bool,
    pub created_ms: u64,
    pub messages: Vec<LoggedMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sip::Method;

    #[test]
    fn test_status_is_monotone() {
        let mut state = CallState::new();
        assert!(!state.advance(CallStatus::Progressing));
        assert!(state.advance(CallStatus::Cancelled));
        assert!(!state.advance(CallStatus::Progressing));
        assert!(state.advance(CallStatus::Rejected));
        assert!(!state.advance(CallStatus::Timedout));
        assert!(!state.advance(CallStatus::Answered));
        assert_eq!(state.status, CallStatus::Rejected);
    }

    #[test]
    fn test_duplicates_are_counted_not_appended() {
        let mut state = CallState::new();
        let mut invite = SipMessage::request(Method::Invite, "sip:bob@10.0.0.1");
        invite.headers.add("Call-ID", "dup-1");

        assert!(!state.record(&invite));
        assert!(state.record(&invite));

        let ringing = SipMessage::response(180, "Ringing");
        assert!(!state.record(&ringing));

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].seen, 2);
        assert_eq!(state.messages[1].summary, "180");
    }

    #[test]
    fn test_symmetric_destination() {
        let node = Arc::new(SipNode::new("10.0.0.10:5060".parse().unwrap(), "core", 1, 0));
        let peer: SocketAddr = "192.0.2.1:5060".parse().unwrap();
        let entry = CallEntry::new("c1", node, peer, Direction::Inbound, "t", "b", false);

        assert_eq!(entry.destination_for(peer), "10.0.0.10:5060".parse().unwrap());
        assert_eq!(entry.destination_for("10.0.0.10:5060".parse().unwrap()), peer);
    }
}
