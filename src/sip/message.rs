//! Parsed SIP message model.

use crate::sip::headers::{canonical_name, Headers};
use crate::sip::method::Method;

pub const SIP_VERSION: &str = "SIP/2.0";

/// Max-Forwards assumed when a request carries none.
pub const DEFAULT_MAX_FORWARDS: u32 = 70;

/// Request start line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: String,
    /// Host part of the request URI, when it could be extracted.
    pub target_host: Option<String>,
    /// Explicit port of the request URI.
    pub target_port: Option<u16>,
}

/// Response start line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request(RequestLine),
    Response(StatusLine),
}

/// Hoisted CSeq header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub number: u32,
    pub method: String,
}

/// A request or response, with the fields the hot path needs hoisted out of
/// the header set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub start_line: StartLine,
    pub headers: Headers,
    pub body: Vec<u8>,

    pub call_id: String,
    pub from_tag: String,
    pub to_tag: String,
    /// Branch of the topmost Via at parse time.
    pub via_branch: String,
    pub cseq: Option<CSeq>,
    pub max_forwards: Option<u32>,
}

impl SipMessage {
    /// An empty request; headers are filled in by the caller.
    pub fn request(method: Method, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let (target_host, target_port) = match parse_target(&uri) {
            Some((host, port)) => (Some(host), port),
            None => (None, None),
        };
        Self::with_start_line(StartLine::Request(RequestLine {
            method,
            uri,
            target_host,
            target_port,
        }))
    }

    /// An empty response. Codes outside 100..=699 become 400.
    pub fn response(code: u16, reason: impl Into<String>) -> Self {
        let code = if (100..=699).contains(&code) { code } else { 400 };
        Self::with_start_line(StartLine::Response(StatusLine {
            code,
            reason: reason.into(),
        }))
    }

    pub(crate) fn with_start_line(start_line: StartLine) -> Self {
        Self {
            start_line,
            headers: Headers::new(),
            body: Vec::new(),
            call_id: String::new(),
            from_tag: String::new(),
            to_tag: String::new(),
            via_branch: String::new(),
            cseq: None,
            max_forwards: None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self.start_line, StartLine::Response(_))
    }

    pub fn method(&self) -> Option<Method> {
        match &self.start_line {
            StartLine::Request(line) => Some(line.method),
            StartLine::Response(_) => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response(line) => Some(line.code),
            StartLine::Request(_) => None,
        }
    }

    /// Host and port addressed by a request URI (port defaults to 5060).
    pub fn target(&self) -> Option<(&str, u16)> {
        match &self.start_line {
            StartLine::Request(line) => line
                .target_host
                .as_deref()
                .map(|host| (host, line.target_port.unwrap_or(5060))),
            StartLine::Response(_) => None,
        }
    }

    /// Whether the message is outside any established dialog.
    pub fn is_out_of_dialog(&self) -> bool {
        self.to_tag.is_empty()
    }

    /// Consume one forwarding hop.
    ///
    /// Returns `false`, leaving the message untouched, when the counter is
    /// already exhausted.
    pub fn take_hop(&mut self) -> bool {
        let current = self.max_forwards.unwrap_or(DEFAULT_MAX_FORWARDS);
        if current == 0 {
            return false;
        }
        let next = current - 1;
        self.max_forwards = Some(next);
        self.headers.set("max-forwards", next.to_string());
        true
    }

    /// Short label used in logs and in the dialog message log.
    pub fn summary(&self) -> String {
        match &self.start_line {
            StartLine::Request(line) => line.method.to_string(),
            StartLine::Response(line) => line.code.to_string(),
        }
    }

    /// Serialize to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(512 + self.body.len());

        match &self.start_line {
            StartLine::Request(line) => {
                out.extend_from_slice(
                    format!("{} {} {}\r\n", line.method.as_str(), line.uri, SIP_VERSION).as_bytes(),
                );
            }
            StartLine::Response(line) => {
                out.extend_from_slice(
                    format!("{} {} {}\r\n", SIP_VERSION, line.code, line.reason).as_bytes(),
                );
            }
        }

        let mut current = "";
        let mut display = String::new();
        for (name, value) in self.headers.iter() {
            if name != current {
                current = name;
                display = canonical_name(name);
            }
            out.extend_from_slice(display.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Extract `(host, port)` from a SIP URI such as `sip:alice@10.0.0.1:5070;transport=udp`.
pub(crate) fn parse_target(uri: &str) -> Option<(String, Option<u16>)> {
    let lower = uri.to_ascii_lowercase();
    let rest = if lower.starts_with("sips:") {
        &uri[5..]
    } else if lower.starts_with("sip:") {
        &uri[4..]
    } else {
        return None;
    };

    let end = rest.find([';', '?']).unwrap_or(rest.len());
    let rest = &rest[..end];
    let hostport = match rest.rfind('@') {
        Some(at) => &rest[at + 1..],
        None => rest,
    };
    if hostport.is_empty() {
        return None;
    }

    if let Some(stripped) = hostport.strip_prefix('[') {
        let close = stripped.find(']')?;
        let host = &stripped[..close];
        let port = stripped[close + 1..]
            .strip_prefix(':')
            .and_then(|p| p.parse().ok());
        return Some((host.to_string(), port));
    }

    match hostport.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), port.parse().ok())),
        None => Some((hostport.to_string(), None)),
    }
}

/// Value of a `;name=value` parameter inside a header value.
pub(crate) fn header_param<'a>(value: &'a str, param: &str) -> Option<&'a str> {
    let needle = format!(";{}=", param.to_ascii_lowercase());
    let lower = value.to_ascii_lowercase();
    let start = lower.find(&needle)? + needle.len();
    let tail = &value[start..];
    let end = tail
        .find(|c: char| c == ';' || c == ',' || c == '>' || c.is_whitespace())
        .unwrap_or(tail.len());
    Some(tail[..end].trim_matches('"'))
}
