//! SIP request methods.

use std::fmt;

/// Request methods understood by the balancer.
///
/// `ReInvite` never appears on the wire: it is an INVITE carrying a non-empty
/// To-tag, reclassified while parsing so the call cache can tell it apart from
/// a dialog-initiating INVITE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    ReInvite,
    Ack,
    Cancel,
    Bye,
    Options,
    Notify,
    Update,
    Prack,
    Info,
    Register,
    Subscribe,
    Message,
    Publish,
    Refer,
    Negotiate,
}

impl Method {
    /// Look up a method by its wire name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name.to_ascii_uppercase().as_str() {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "CANCEL" => Method::Cancel,
            "BYE" => Method::Bye,
            "OPTIONS" => Method::Options,
            "NOTIFY" => Method::Notify,
            "UPDATE" => Method::Update,
            "PRACK" => Method::Prack,
            "INFO" => Method::Info,
            "REGISTER" => Method::Register,
            "SUBSCRIBE" => Method::Subscribe,
            "MESSAGE" => Method::Message,
            "PUBLISH" => Method::Publish,
            "REFER" => Method::Refer,
            "NEGOTIATE" => Method::Negotiate,
            _ => return None,
        };
        Some(method)
    }

    /// Name written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Invite | Method::ReInvite => "INVITE",
            Method::Ack => "ACK",
            Method::Cancel => "CANCEL",
            Method::Bye => "BYE",
            Method::Options => "OPTIONS",
            Method::Notify => "NOTIFY",
            Method::Update => "UPDATE",
            Method::Prack => "PRACK",
            Method::Info => "INFO",
            Method::Register => "REGISTER",
            Method::Subscribe => "SUBSCRIBE",
            Method::Message => "MESSAGE",
            Method::Publish => "PUBLISH",
            Method::Refer => "REFER",
            Method::Negotiate => "NEGOTIATE",
        }
    }

    /// Methods allowed to create a new call-cache entry.
    pub fn is_dialog_initiating(&self) -> bool {
        matches!(
            self,
            Method::Invite | Method::Options | Method::Message | Method::Register | Method::Subscribe
        )
    }

    /// The mid-dialog variant of this method, if it has one.
    pub(crate) fn in_dialog(self) -> Self {
        match self {
            Method::Invite => Method::ReInvite,
            other => other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::ReInvite => f.write_str("ReINVITE"),
            other => f.write_str(other.as_str()),
        }
    }
}
