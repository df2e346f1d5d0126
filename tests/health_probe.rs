//! Health probing against real UDP nodes.

use std::time::{Duration, Instant};

mod common;
use common::Peer;

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

#[tokio::test]
async fn test_silent_node_is_marked_dead() {
    let node = Peer::bind().await;
    let client = Peer::bind().await;
    let mut config = common::config_for(&[node.addr]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 60;
    let (balancer, shutdown) = common::start(config).await;
    let lb = balancer.local_addr();

    let (probe, _) = node.recv().await;
    assert_eq!(probe.method(), Some(sip_balancer::sip::Method::Options));

    let registry = balancer.registry().clone();
    assert!(wait_until(Duration::from_secs(2), || !registry.nodes()[0].is_alive()).await);
    assert!(balancer.cache().is_empty());

    // No live node left for new calls.
    client.send(&common::invite("dead-1", client.addr, "example.com"), lb).await;
    let (reply, _) = client.recv().await;
    assert_eq!(reply.status_code(), Some(503));

    common::stop(balancer, shutdown).await;
}

#[tokio::test]
async fn test_answering_node_stays_alive() {
    let node = Peer::bind().await;
    let node_addr = node.addr;
    let responder = node.spawn_options_responder();

    let mut config = common::config_for(&[node_addr]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 60;
    let (balancer, shutdown) = common::start(config).await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    // The answered probe is removed well before its timeout.
    let cache = balancer.cache().clone();
    assert!(wait_until(Duration::from_secs(1), || cache.is_empty()).await);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(balancer.registry().nodes()[0].is_alive());

    responder.abort();
    common::stop(balancer, shutdown).await;
}
