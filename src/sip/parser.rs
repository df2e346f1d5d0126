//! Datagram parser.
//!
//! # Responsibilities
//! - Split one datagram into messages (datagrams may carry several back to back)
//! - Classify the start line as request or response
//! - Collect headers leniently and hoist the fields the call cache needs
//! - Slice the body by the declared Content-Length
//!
//! # Design Decisions
//! - No regex: start line and `name: value` lines are split by hand, O(n)
//! - Unrecognised header lines are skipped, never fatal
//! - A body running past the end of the buffer is an error, not a panic

use thiserror::Error;

use crate::sip::headers::{expand_compact, Headers};
use crate::sip::message::{header_param, parse_target, CSeq, RequestLine, SipMessage, StartLine, StatusLine};
use crate::sip::method::Method;

/// Why a datagram could not be turned into a message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid method {0:?} in request line")]
    InvalidMethod(String),

    #[error("invalid status code {0} in response line")]
    InvalidStatusCode(u16),

    #[error("start line matches neither request nor response")]
    InvalidMessage,

    #[error("header block is not valid UTF-8")]
    InvalidEncoding,

    #[error("declared Content-Length {declared} exceeds the {available} bytes left in the datagram")]
    Truncated { declared: usize, available: usize },
}

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parse the first message in `buf`.
///
/// Returns `Ok(None)` when no complete header block is present, otherwise the
/// message and the unconsumed bytes that follow it.
pub fn parse(buf: &[u8]) -> Result<Option<(SipMessage, &[u8])>, ParseError> {
    // Leading CRLFs are keep-alives.
    let skip = buf.iter().take_while(|b| **b == b'\r' || **b == b'\n').count();
    let buf = &buf[skip..];
    if buf.is_empty() {
        return Ok(None);
    }

    let Some(head_end) = find(buf, HEADER_TERMINATOR) else {
        return Ok(None);
    };
    let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| ParseError::InvalidEncoding)?;

    let mut lines = head.split("\r\n");
    let mut start_line = parse_start_line(lines.next().unwrap_or_default())?;
    let mut msg_headers = Headers::new();
    let mut hoisted = Hoisted::default();

    for line in lines {
        let Some((name, value)) = split_header_line(line) else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        let name = expand_compact(&lower).unwrap_or(lower.as_str());
        hoisted.observe(name, value, &mut start_line);
        msg_headers.add(name, value);
    }

    let body_start = head_end + HEADER_TERMINATOR.len();
    let available = buf.len() - body_start;
    let body_len = match hoisted.content_length {
        Some(declared) => {
            if declared != available {
                tracing::warn!(
                    declared,
                    available,
                    "Content-Length differs from bytes remaining in datagram"
                );
            }
            declared
        }
        // Datagram transport: without a length the body runs to the end.
        None => available,
    };
    if body_len > available {
        return Err(ParseError::Truncated {
            declared: body_len,
            available,
        });
    }

    let body = buf[body_start..body_start + body_len].to_vec();
    let rest = &buf[body_start + body_len..];

    let message = SipMessage {
        start_line,
        headers: msg_headers,
        body,
        call_id: hoisted.call_id.unwrap_or_default(),
        from_tag: hoisted.from_tag,
        to_tag: hoisted.to_tag,
        via_branch: hoisted.via_branch.unwrap_or_default(),
        cseq: hoisted.cseq,
        max_forwards: hoisted.max_forwards,
    };
    Ok(Some((message, rest)))
}

/// Cheap Call-ID lookup without a full parse, used to pick a worker.
pub fn peek_call_id(buf: &[u8]) -> Option<&[u8]> {
    for line in buf.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            break;
        }
        let Some(colon) = line.iter().position(|b| *b == b':') else {
            continue;
        };
        let name = line[..colon].trim_ascii();
        if name.eq_ignore_ascii_case(b"call-id") || name.eq_ignore_ascii_case(b"i") {
            return Some(line[colon + 1..].trim_ascii());
        }
    }
    None
}

/// Fields lifted out of the header block while scanning it.
#[derive(Default)]
struct Hoisted {
    call_id: Option<String>,
    from_tag: String,
    to_tag: String,
    via_branch: Option<String>,
    content_length: Option<usize>,
    cseq: Option<CSeq>,
    max_forwards: Option<u32>,
}

impl Hoisted {
    fn observe(&mut self, name: &str, value: &str, start_line: &mut StartLine) {
        match name {
            "call-id" => {
                if self.call_id.is_none() {
                    self.call_id = Some(value.to_string());
                }
            }
            "from" => {
                if let Some(tag) = header_param(value, "tag") {
                    self.from_tag = tag.to_string();
                }
            }
            "to" => {
                if let Some(tag) = header_param(value, "tag").filter(|t| !t.is_empty()) {
                    self.to_tag = tag.to_string();
                    if let StartLine::Request(line) = start_line {
                        line.method = line.method.in_dialog();
                    }
                }
            }
            "content-length" => {
                if self.content_length.is_none() {
                    match value.parse() {
                        Ok(len) => self.content_length = Some(len),
                        Err(_) => tracing::debug!(value, "Ignoring unparsable Content-Length"),
                    }
                }
            }
            "via" => {
                if self.via_branch.is_none() {
                    if let Some(branch) = header_param(value, "branch") {
                        self.via_branch = Some(branch.to_string());
                    }
                }
            }
            "cseq" => {
                let mut parts = value.split_whitespace();
                if let (Some(number), Some(method)) = (parts.next(), parts.next()) {
                    if let Ok(number) = number.parse() {
                        self.cseq = Some(CSeq {
                            number,
                            method: method.to_ascii_uppercase(),
                        });
                    }
                }
            }
            "max-forwards" => match value.parse::<u32>() {
                Ok(hops) if hops <= 255 => self.max_forwards = Some(hops),
                _ => tracing::debug!(value, "Ignoring invalid Max-Forwards"),
            },
            _ => {}
        }
    }
}

fn parse_start_line(line: &str) -> Result<StartLine, ParseError> {
    if line.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("SIP/")) {
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts.next().unwrap_or_default();
        if !version.eq_ignore_ascii_case(crate::sip::message::SIP_VERSION)
            || code.len() != 3
            || !code.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseError::InvalidMessage);
        }
        let code: u16 = code.parse().map_err(|_| ParseError::InvalidMessage)?;
        if !(100..=699).contains(&code) {
            return Err(ParseError::InvalidStatusCode(code));
        }
        return Ok(StartLine::Response(StatusLine {
            code,
            reason: parts.next().unwrap_or_default().trim().to_string(),
        }));
    }

    let mut parts = line.split(' ');
    let (Some(method), Some(uri), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidMessage);
    };
    if method.is_empty()
        || uri.is_empty()
        || !method.bytes().all(|b| b.is_ascii_alphabetic())
        || !version.eq_ignore_ascii_case(crate::sip::message::SIP_VERSION)
    {
        return Err(ParseError::InvalidMessage);
    }

    let method = Method::from_name(method).ok_or_else(|| ParseError::InvalidMethod(method.to_string()))?;
    let (target_host, target_port) = match parse_target(uri) {
        Some((host, port)) => (Some(host), port),
        None => (None, None),
    };
    Ok(StartLine::Request(RequestLine {
        method,
        uri: uri.to_string(),
        target_host,
        target_port,
    }))
}

/// Generic `name: value` split. `None` for anything that does not look like a header.
fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim_end();
    let is_token = |b: u8| b.is_ascii_alphanumeric() || b"-.!%*_+`'~".contains(&b);
    if name.is_empty() || !name.bytes().all(is_token) {
        return None;
    }
    Some((name, value.trim()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE: &str = "INVITE sip:bob@10.0.0.9:5070 SIP/2.0\r\n\
        Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bKabc\r\n\
        Via: SIP/2.0/UDP 10.0.0.0:5060;branch=z9hG4bKold\r\n\
        From: \"Alice\" <sip:alice@10.0.0.1>;tag=a1\r\n\
        To: <sip:bob@10.0.0.9>\r\n\
        Call-ID: call-1@10.0.0.1\r\n\
        CSeq: 1 INVITE\r\n\
        Max-Forwards: 70\r\n\
        Content-Type: application/sdp\r\n\
        Content-Length: 4\r\n\
        \r\n\
        v=0\n";

    #[test]
    fn test_parse_request() {
        let (msg, rest) = parse(INVITE.as_bytes()).unwrap().unwrap();
        assert!(rest.is_empty());
        assert_eq!(msg.method(), Some(Method::Invite));
        assert_eq!(msg.call_id, "call-1@10.0.0.1");
        assert_eq!(msg.from_tag, "a1");
        assert!(msg.to_tag.is_empty());
        assert_eq!(msg.via_branch, "z9hG4bKabc");
        assert_eq!(msg.max_forwards, Some(70));
        assert_eq!(msg.cseq, Some(CSeq { number: 1, method: "INVITE".into() }));
        assert_eq!(msg.target(), Some(("10.0.0.9", 5070)));
        assert_eq!(msg.body, b"v=0\n");
        assert_eq!(msg.headers.get_all("via").len(), 2);
    }

    #[test]
    fn test_to_tag_reclassifies_invite() {
        let text = INVITE.replace("To: <sip:bob@10.0.0.9>", "To: <sip:bob@10.0.0.9>;tag=b2");
        let (msg, _) = parse(text.as_bytes()).unwrap().unwrap();
        assert_eq!(msg.method(), Some(Method::ReInvite));
        assert_eq!(msg.to_tag, "b2");

        let empty_tag = INVITE.replace("To: <sip:bob@10.0.0.9>", "To: <sip:bob@10.0.0.9>;tag=");
        let (msg, _) = parse(empty_tag.as_bytes()).unwrap().unwrap();
        assert_eq!(msg.method(), Some(Method::Invite));
    }

    #[test]
    fn test_parse_response() {
        let text = "SIP/2.0 180 Ringing\r\nVia: SIP/2.0/UDP lb;branch=z9hG4bK1\r\nCall-ID: c\r\nContent-Length: 0\r\n\r\n";
        let (msg, rest) = parse(text.as_bytes()).unwrap().unwrap();
        assert!(rest.is_empty());
        assert_eq!(msg.status_code(), Some(180));
        assert_eq!(msg.start_line, StartLine::Response(StatusLine { code: 180, reason: "Ringing".into() }));
    }

    #[test]
    fn test_start_line_failures() {
        assert_eq!(
            parse(b"SIP/2.0 700 Weird\r\n\r\n"),
            Err(ParseError::InvalidStatusCode(700))
        );
        assert_eq!(
            parse(b"SIP/2.0 099 Low\r\n\r\n"),
            Err(ParseError::InvalidStatusCode(99))
        );
        assert_eq!(
            parse(b"FETCH sip:x SIP/2.0\r\n\r\n"),
            Err(ParseError::InvalidMethod("FETCH".into()))
        );
        assert_eq!(parse(b"hello there\r\n\r\n"), Err(ParseError::InvalidMessage));
        assert_eq!(parse(b"SIP/2.0 abc Bad\r\n\r\n"), Err(ParseError::InvalidMessage));
    }

    #[test]
    fn test_incomplete_header_block() {
        assert_eq!(parse(b"INVITE sip:x SIP/2.0\r\nVia: a\r\n"), Ok(None));
        assert_eq!(parse(b"\r\n\r\n"), Ok(None));
        assert_eq!(parse(b""), Ok(None));
    }

    #[test]
    fn test_pipelined_messages() {
        let first = "OPTIONS sip:10.0.0.9 SIP/2.0\r\nCall-ID: one\r\nContent-Length: 0\r\n\r\n";
        let second = "OPTIONS sip:10.0.0.9 SIP/2.0\r\nCall-ID: two\r\nContent-Length: 0\r\n\r\n";
        let datagram = format!("{first}{second}");

        let (msg, rest) = parse(datagram.as_bytes()).unwrap().unwrap();
        assert_eq!(msg.call_id, "one");
        assert_eq!(rest, second.as_bytes());

        let (msg, rest) = parse(rest).unwrap().unwrap();
        assert_eq!(msg.call_id, "two");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_declared_length_governs_slicing() {
        let text = "MESSAGE sip:10.0.0.9 SIP/2.0\r\nCall-ID: m\r\nContent-Length: 2\r\n\r\nhiEXTRA";
        let (msg, rest) = parse(text.as_bytes()).unwrap().unwrap();
        assert_eq!(msg.body, b"hi");
        assert_eq!(rest, b"EXTRA");

        let short = "MESSAGE sip:10.0.0.9 SIP/2.0\r\nCall-ID: m\r\nContent-Length: 20\r\n\r\nhi";
        assert_eq!(
            parse(short.as_bytes()),
            Err(ParseError::Truncated { declared: 20, available: 2 })
        );
    }

    #[test]
    fn test_lenient_headers_and_compact_forms() {
        let text = "BYE sip:10.0.0.9 SIP/2.0\r\n\
            v: SIP/2.0/UDP 10.0.0.1;branch=z9hG4bKc\r\n\
            this line is garbage\r\n\
            i: compact-id\r\n\
            f: <sip:a@b>;tag=ft\r\n\
            t: <sip:c@d>;tag=tt\r\n\
            l: 0\r\n\r\n";
        let (msg, _) = parse(text.as_bytes()).unwrap().unwrap();
        assert_eq!(msg.call_id, "compact-id");
        assert_eq!(msg.from_tag, "ft");
        assert_eq!(msg.to_tag, "tt");
        assert_eq!(msg.via_branch, "z9hG4bKc");
        assert!(msg.headers.contains("Call-ID"));
        assert_eq!(msg.headers.names().count(), 5);
    }

    #[test]
    fn test_reparse_of_serialized_message() {
        let (msg, _) = parse(INVITE.as_bytes()).unwrap().unwrap();
        let bytes = msg.to_bytes();
        let (again, rest) = parse(&bytes).unwrap().unwrap();
        assert!(rest.is_empty());
        assert_eq!(again.start_line, msg.start_line);
        assert_eq!(again.headers.iter().collect::<Vec<_>>(), msg.headers.iter().collect::<Vec<_>>());
        assert_eq!(again.body, msg.body);
    }

    #[test]
    fn test_peek_call_id() {
        assert_eq!(peek_call_id(INVITE.as_bytes()), Some(&b"call-1@10.0.0.1"[..]));
        assert_eq!(peek_call_id(b"BYE x SIP/2.0\r\ni: short\r\n\r\n"), Some(&b"short"[..]));
        assert_eq!(peek_call_id(b"BYE x SIP/2.0\r\n\r\nCall-ID: body\r\n"), None);
    }
}
