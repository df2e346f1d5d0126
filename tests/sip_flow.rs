//! End-to-end dialog flows over loopback UDP.

use std::collections::HashMap;
use std::time::Duration;

use sip_balancer::dialog::CallStatus;
use sip_balancer::sip::Method;

mod common;
use common::Peer;

#[tokio::test]
async fn test_invite_and_answer_round_trip() {
    let node = Peer::bind().await;
    let client = Peer::bind().await;
    let (balancer, shutdown) = common::start(common::config_for(&[node.addr])).await;
    let lb = balancer.local_addr();

    client.send(&common::invite("rt-1", client.addr, "example.com"), lb).await;

    let (invite, from) = node.recv().await;
    assert_eq!(from, lb);
    assert_eq!(invite.method(), Some(Method::Invite));
    assert_eq!(invite.max_forwards, Some(69));
    let vias = invite.headers.get_all("via");
    assert_eq!(vias.len(), 2);
    assert!(vias[0].contains(&lb.to_string()));
    assert!(vias[1].contains(&client.addr.to_string()));

    node.answer(&invite, 180, "Ringing", lb).await;
    let (ringing, _) = client.recv().await;
    assert_eq!(ringing.status_code(), Some(180));

    node.answer(&invite, 200, "OK", lb).await;
    let (ok, from) = client.recv().await;
    assert_eq!(from, lb);
    assert_eq!(ok.status_code(), Some(200));
    let vias = ok.headers.get_all("via");
    assert_eq!(vias.len(), 1);
    assert!(vias[0].contains(&client.addr.to_string()));

    let entry = balancer.cache().get("rt-1").unwrap();
    assert_eq!(entry.status(), CallStatus::Answered);
    assert_eq!(entry.node.addr, node.addr);

    // Gone after the clear window.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(balancer.cache().get("rt-1").is_none());

    common::stop(balancer, shutdown).await;
}

#[tokio::test]
async fn test_round_robin_spreads_new_dialogs() {
    let node_a = Peer::bind().await;
    let node_b = Peer::bind().await;
    let client = Peer::bind().await;
    let (balancer, shutdown) = common::start(common::config_for(&[node_a.addr, node_b.addr])).await;
    let lb = balancer.local_addr();

    for i in 0..4 {
        client
            .send(&common::invite(&format!("rr-{i}"), client.addr, "example.com"), lb)
            .await;
    }

    let mut counts = HashMap::new();
    for node in [&node_a, &node_b] {
        while let Some((msg, _)) = node.recv_within(Duration::from_millis(500)).await {
            assert_eq!(msg.method(), Some(Method::Invite));
            *counts.entry(node.addr).or_insert(0) += 1;
        }
    }
    assert_eq!(counts.get(&node_a.addr), Some(&2));
    assert_eq!(counts.get(&node_b.addr), Some(&2));
    assert_eq!(balancer.cache().len(), 4);

    common::stop(balancer, shutdown).await;
}

#[tokio::test]
async fn test_outbound_request_reaches_uri_target() {
    let node = Peer::bind().await;
    let carrier = Peer::bind().await;
    let (balancer, shutdown) = common::start(common::config_for(&[node.addr])).await;
    let lb = balancer.local_addr();

    node.send(&common::invite("out-1", node.addr, &carrier.addr.to_string()), lb)
        .await;

    let (invite, from) = carrier.recv().await;
    assert_eq!(from, lb);
    assert_eq!(invite.call_id, "out-1");

    carrier.answer(&invite, 200, "OK", lb).await;
    let (ok, _) = node.recv().await;
    assert_eq!(ok.status_code(), Some(200));

    // Outbound dialogs do not count against the node's hit counter.
    assert_eq!(balancer.registry().nodes()[0].hits(), 0);

    common::stop(balancer, shutdown).await;
}

#[tokio::test]
async fn test_admission_ceiling_answers_429() {
    let node = Peer::bind().await;
    let client = Peer::bind().await;
    let mut config = common::config_for(&[node.addr]);
    config.balancing.max_calls_per_second = 0;
    let (balancer, shutdown) = common::start(config).await;
    let lb = balancer.local_addr();

    client.send(&common::invite("limited-1", client.addr, "example.com"), lb).await;

    let (reply, _) = client.recv().await;
    assert_eq!(reply.status_code(), Some(429));
    assert_eq!(reply.headers.get("retry-after"), Some("1"));
    assert!(node.recv_within(Duration::from_millis(300)).await.is_none());
    assert!(balancer.cache().is_empty());

    common::stop(balancer, shutdown).await;
}

#[tokio::test]
async fn test_out_of_dialog_request_is_dropped() {
    let node = Peer::bind().await;
    let client = Peer::bind().await;
    let (balancer, shutdown) = common::start(common::config_for(&[node.addr])).await;
    let lb = balancer.local_addr();

    let bye = common::invite("stray-1", client.addr, "example.com")
        .replace("INVITE sip:", "BYE sip:")
        .replace("CSeq: 1 INVITE", "CSeq: 2 BYE");
    client.send(&bye, lb).await;

    assert!(node.recv_within(Duration::from_millis(300)).await.is_none());
    assert!(client.recv_within(Duration::from_millis(100)).await.is_none());
    assert!(balancer.cache().is_empty());

    common::stop(balancer, shutdown).await;
}
