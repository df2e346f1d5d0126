//! Messages the balancer originates itself: health probes and rejections.

use std::net::SocketAddr;

use crate::sip::ident;
use crate::sip::message::{header_param, CSeq, SipMessage, DEFAULT_MAX_FORWARDS};
use crate::sip::method::Method;

/// Value of User-Agent / Server on generated messages.
pub const USER_AGENT: &str = concat!("sip-balancer/", env!("CARGO_PKG_VERSION"));

/// CSeq number carried by health probes.
const PROBE_CSEQ: u32 = 911;

/// The Via value this balancer pushes when relaying.
pub fn via_value(local: &str, branch: &str) -> String {
    format!("SIP/2.0/UDP {};branch={}", local, branch)
}

/// Identifiers of a generated out-of-dialog request.
#[derive(Debug, Clone)]
pub struct ProbeIds {
    pub call_id: String,
    pub branch: String,
    pub from_tag: String,
}

impl ProbeIds {
    pub fn generate() -> Self {
        Self {
            call_id: ident::new_call_id(),
            branch: ident::new_branch(),
            from_tag: ident::new_tag(),
        }
    }
}

/// OPTIONS ping addressed to a backend.
pub fn probe_request(local: &str, node: SocketAddr, ids: &ProbeIds) -> SipMessage {
    let mut msg = SipMessage::request(Method::Options, format!("sip:{}", node));
    let h = &mut msg.headers;
    h.add("Via", via_value(local, &ids.branch));
    h.add("From", format!("<sip:ping@{}>;tag={}", local, ids.from_tag));
    h.add("To", format!("<sip:ping@{}>", node));
    h.add("Call-ID", ids.call_id.as_str());
    h.add("CSeq", format!("{} {}", PROBE_CSEQ, Method::Options.as_str()));
    h.add("Contact", format!("<sip:{}>", local));
    h.add("Max-Forwards", DEFAULT_MAX_FORWARDS.to_string());
    h.add("User-Agent", USER_AGENT);
    h.add("Content-Length", "0");

    msg.call_id = ids.call_id.clone();
    msg.from_tag = ids.from_tag.clone();
    msg.via_branch = ids.branch.clone();
    msg.cseq = Some(CSeq {
        number: PROBE_CSEQ,
        method: Method::Options.as_str().to_string(),
    });
    msg.max_forwards = Some(DEFAULT_MAX_FORWARDS);
    msg
}

/// Negative final response to `request`, answered by the balancer itself.
pub fn reject(request: &SipMessage, code: u16, reason: &str, retry_after: Option<u32>) -> SipMessage {
    let mut msg = SipMessage::response(code, reason);

    for via in request.headers.get_all("via") {
        msg.headers.add("Via", via.as_str());
    }
    if let Some(from) = request.headers.get("from") {
        msg.headers.add("From", from);
    }
    if let Some(to) = request.headers.get("to") {
        let has_tag = header_param(to, "tag").is_some_and(|t| !t.is_empty());
        if has_tag {
            msg.headers.add("To", to);
        } else {
            let tag = ident::new_tag();
            msg.headers.add("To", format!("{};tag={}", to, tag));
            msg.to_tag = tag;
        }
    }
    if let Some(call_id) = request.headers.get("call-id") {
        msg.headers.add("Call-ID", call_id);
    }
    if let Some(cseq) = request.headers.get("cseq") {
        msg.headers.add("CSeq", cseq);
    }
    if let Some(secs) = retry_after {
        msg.headers.add("Retry-After", secs.to_string());
    }
    msg.headers.add("Server", USER_AGENT);
    msg.headers.add("Content-Length", "0");

    msg.call_id = request.call_id.clone();
    msg.from_tag = request.from_tag.clone();
    if msg.to_tag.is_empty() {
        msg.to_tag = request.to_tag.clone();
    }
    msg.via_branch = request.via_branch.clone();
    msg.cseq = request.cseq.clone();
    msg
}
