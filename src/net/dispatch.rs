//! Per-datagram processing.
//!
//! Turns one received datagram into the datagrams to send: every message in
//! it is parsed, routed through the call cache and re-serialized.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use crate::dialog::{CallCache, Route};
use crate::error::SlbError;
use crate::observability::metrics;
use crate::sip::parser::{parse, peek_call_id};

/// A datagram ready to go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub destination: SocketAddr,
    pub payload: Vec<u8>,
}

/// Parse and route every message in `datagram`.
///
/// A malformed message stops processing of the datagram; messages before it
/// are still delivered.
pub fn process_datagram(cache: &CallCache, datagram: &[u8], source: SocketAddr) -> Vec<Outbound> {
    let mut outbound = Vec::new();
    let mut rest = datagram;

    while !rest.is_empty() {
        match parse(rest) {
            Ok(Some((mut msg, remainder))) => {
                match cache.resolve(&mut msg, source) {
                    Ok(Route::Forward { destination, .. }) => outbound.push(Outbound {
                        destination,
                        payload: msg.to_bytes(),
                    }),
                    Ok(Route::Reject { response, destination, .. }) => outbound.push(Outbound {
                        destination,
                        payload: response.to_bytes(),
                    }),
                    Ok(Route::Absorbed) => {}
                    Err(err) => drop_message(&err, &msg.summary(), &msg.call_id, source),
                }
                rest = remainder;
            }
            Ok(None) => {
                if rest.iter().any(|b| !b.is_ascii_whitespace()) {
                    tracing::debug!(peer = %source, bytes = rest.len(), "Incomplete message - Dropping");
                    metrics::record_dropped("incomplete");
                }
                break;
            }
            Err(err) => {
                tracing::warn!(
                    peer = %source,
                    error = %err,
                    raw = %String::from_utf8_lossy(rest),
                    "Malformed message - Dropping"
                );
                metrics::record_dropped(SlbError::from(err).kind());
                break;
            }
        }
    }

    outbound
}

fn drop_message(err: &SlbError, summary: &str, call_id: &str, source: SocketAddr) {
    match err {
        SlbError::OutOfDialog(_) => {
            tracing::debug!(call_id = %call_id, peer = %source, message = %summary, "Message cannot initiate a dialog - Dropping")
        }
        _ => tracing::warn!(call_id = %call_id, peer = %source, message = %summary, error = %err, "Dropping message"),
    }
    metrics::record_dropped(err.kind());
}

/// Worker index for a datagram.
///
/// All datagrams of one Call-ID land on the same worker, which keeps their
/// processing order equal to arrival order. Datagrams without a readable
/// Call-ID are spread by source address.
pub fn shard_for(datagram: &[u8], source: SocketAddr, workers: usize) -> usize {
    if workers <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    match peek_call_id(datagram) {
        Some(call_id) => call_id.hash(&mut hasher),
        None => source.hash(&mut hasher),
    }
    (hasher.finish() % workers as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::CacheSettings;
    use crate::load_balancer::node::SipNode;
    use crate::load_balancer::registry::NodeRegistry;
    use crate::load_balancer::DistributionKind;
    use crate::security::rate_limit::AdmissionLimiter;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    const CORE: &str = "127.0.0.1:5080";
    const ACCESS: &str = "192.0.2.10:5060";

    fn cache() -> CallCache {
        let node = Arc::new(SipNode::new(CORE.parse().unwrap(), "core", 1, 0));
        CallCache::new(
            Arc::new(NodeRegistry::from_nodes(vec![node], DistributionKind::RoundRobin)),
            Arc::new(AdmissionLimiter::new(-1)),
            CacheSettings {
                timeout: Duration::from_secs(32),
                clear: Duration::from_secs(10),
                probe_timeout: Duration::from_secs(5),
                local_address: "127.0.0.1:5060".to_string(),
            },
            Handle::current(),
        )
    }

    fn invite(call_id: &str) -> String {
        format!(
            "INVITE sip:bob@example.com SIP/2.0\r\n\
             Via: SIP/2.0/UDP 192.0.2.10;branch=z9hG4bK{call_id}\r\n\
             From: <sip:alice@example.com>;tag=a\r\n\
             To: <sip:bob@example.com>\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: 1 INVITE\r\n\
             Content-Length: 0\r\n\r\n"
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipelined_messages_all_routed() {
        let cache = cache();
        let datagram = format!("{}{}", invite("p1"), invite("p2"));
        let out = process_datagram(&cache, datagram.as_bytes(), ACCESS.parse().unwrap());

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| o.destination == CORE.parse().unwrap()));
        assert_eq!(cache.len(), 2);

        let (forwarded, _) = parse(&out[0].payload).unwrap().unwrap();
        assert_eq!(forwarded.headers.get_all("via").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_creates_nothing() {
        let cache = cache();
        let out = process_datagram(
            &cache,
            b"HELLO WORLD\r\nCall-ID: x\r\n\r\n",
            ACCESS.parse().unwrap(),
        );
        assert!(out.is_empty());
        assert!(cache.is_empty());

        // The message before the bad one still goes out
        let datagram = format!("{}GARBAGE\r\n\r\n", invite("p3"));
        let out = process_datagram(&cache, datagram.as_bytes(), ACCESS.parse().unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_go_back_to_sender() {
        let cache = cache();
        cache.registry().nodes()[0].set_alive(false);
        let out = process_datagram(&cache, invite("p4").as_bytes(), ACCESS.parse().unwrap());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].destination, ACCESS.parse().unwrap());
        let (response, _) = parse(&out[0].payload).unwrap().unwrap();
        assert_eq!(response.status_code(), Some(503));
    }

    #[test]
    fn test_shard_is_stable_per_call_id() {
        let a: SocketAddr = "192.0.2.1:5060".parse().unwrap();
        let b: SocketAddr = "192.0.2.2:5060".parse().unwrap();
        let msg = invite("same-call");
        assert_eq!(shard_for(msg.as_bytes(), a, 8), shard_for(msg.as_bytes(), b, 8));
        assert!(shard_for(msg.as_bytes(), a, 8) < 8);
        assert_eq!(shard_for(b"junk", a, 1), 0);
    }
}
