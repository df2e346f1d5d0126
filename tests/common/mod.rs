//! Shared utilities for integration tests: UDP peers and balancer setup.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

use sip_balancer::config::{BalancerConfig, NodeConfig};
use sip_balancer::lifecycle::{Balancer, Shutdown};
use sip_balancer::sip::{parse, SipMessage};

/// How long a peer waits for a datagram before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A UDP endpoint playing either an access peer or a core node.
pub struct Peer {
    pub socket: UdpSocket,
    pub addr: SocketAddr,
}

impl Peer {
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        Self { socket, addr }
    }

    pub async fn send(&self, text: &str, to: SocketAddr) {
        self.socket.send_to(text.as_bytes(), to).await.unwrap();
    }

    /// Next parsed message, or `None` when nothing arrives in time.
    pub async fn recv_within(&self, wait: Duration) -> Option<(SipMessage, SocketAddr)> {
        let mut buf = vec![0u8; 65_535];
        let (len, from) = tokio::time::timeout(wait, self.socket.recv_from(&mut buf))
            .await
            .ok()?
            .unwrap();
        let (msg, _) = parse(&buf[..len]).unwrap().unwrap();
        Some((msg, from))
    }

    pub async fn recv(&self) -> (SipMessage, SocketAddr) {
        self.recv_within(RECV_TIMEOUT)
            .await
            .expect("no datagram received")
    }

    /// Answer `request` with `code`, mirroring its Via stack back to `to`.
    pub async fn answer(&self, request: &SipMessage, code: u16, reason: &str, to: SocketAddr) {
        self.send(&response_to(request, code, reason), to).await;
    }

    /// Answer every OPTIONS with 200 until the task is dropped.
    pub fn spawn_options_responder(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_535];
            while let Ok((len, from)) = self.socket.recv_from(&mut buf).await {
                let Ok(Some((msg, _))) = parse(&buf[..len]) else {
                    continue;
                };
                if msg.is_request() {
                    self.send(&response_to(&msg, 200, "OK"), from).await;
                }
            }
        })
    }
}

pub fn invite(call_id: &str, from: SocketAddr, target: &str) -> String {
    format!(
        "INVITE sip:bob@{target} SIP/2.0\r\n\
         Via: SIP/2.0/UDP {from};branch=z9hG4bK-{call_id}\r\n\
         Max-Forwards: 70\r\n\
         From: <sip:alice@{from}>;tag=alice\r\n\
         To: <sip:bob@{target}>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 INVITE\r\n\
         Contact: <sip:alice@{from}>\r\n\
         Content-Length: 0\r\n\r\n"
    )
}

pub fn response_to(request: &SipMessage, code: u16, reason: &str) -> String {
    let mut text = format!("SIP/2.0 {code} {reason}\r\n");
    for via in request.headers.get_all("via") {
        text.push_str(&format!("Via: {via}\r\n"));
    }
    let from = request.headers.get("from").unwrap_or_default();
    let to = request.headers.get("to").unwrap_or_default();
    let cseq = request.headers.get("cseq").unwrap_or_default();
    text.push_str(&format!("From: {from}\r\n"));
    text.push_str(&format!("To: {to};tag=node\r\n"));
    text.push_str(&format!("Call-ID: {}\r\n", request.call_id));
    text.push_str(&format!("CSeq: {cseq}\r\n"));
    text.push_str("Content-Length: 0\r\n\r\n");
    text
}

/// Loopback config with probing off and short timers.
pub fn config_for(nodes: &[SocketAddr]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.health_check.enabled = false;
    config.observability.metrics_enabled = false;
    config.pipeline.workers = 2;
    config.pipeline.queue_size = 64;
    config.timers.timeout_ms = 2_000;
    config.timers.clear_ms = 500;
    config.timers.probe_timeout_ms = 200;
    config.nodes = nodes
        .iter()
        .map(|addr| NodeConfig {
            address: addr.ip().to_string(),
            port: addr.port(),
            description: format!("core-{}", addr.port()),
            weight: 1,
            cost: 0,
        })
        .collect();
    config
}

pub async fn start(config: BalancerConfig) -> (Balancer, Shutdown) {
    let shutdown = Shutdown::new();
    let balancer = Balancer::start(config, &shutdown).await.unwrap();
    (balancer, shutdown)
}

pub async fn stop(balancer: Balancer, shutdown: Shutdown) {
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), balancer.join())
        .await
        .expect("balancer did not shut down");
}
