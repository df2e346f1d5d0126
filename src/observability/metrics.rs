//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define balancer metrics (admission rate, dialogs, drops, rejections)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-node liveness
//!
//! # Metrics
//! - `slb_call_attempts_per_second` (gauge): dialogs admitted in the last second
//! - `slb_concurrent_dialogs` (gauge): non-probe entries in the call cache
//! - `slb_node_alive` (gauge): 1=alive, 0=dead, by node
//! - `slb_datagrams_received_total` (counter)
//! - `slb_messages_dropped_total` (counter): by error kind
//! - `slb_rejections_total` (counter): synthesized responses by status code
//! - `slb_runtime_faults_total` (counter): panics caught at the worker boundary
//! - `slb_send_errors_total` (counter)
//!
//! # Design Decisions
//! - Calls go through the `metrics` facade and are no-ops until a recorder is installed
//! - Labels kept low-cardinality (node address, error kind, status code)

use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call_attempts(per_second: u64) {
    metrics::gauge!("slb_call_attempts_per_second").set(per_second as f64);
}

pub fn dialog_opened() {
    metrics::gauge!("slb_concurrent_dialogs").increment(1.0);
}

pub fn dialog_closed() {
    metrics::gauge!("slb_concurrent_dialogs").decrement(1.0);
}

pub fn record_node_alive(node: &SocketAddr, alive: bool) {
    metrics::gauge!("slb_node_alive", "node" => node.to_string()).set(if alive { 1.0 } else { 0.0 });
}

pub fn record_datagram() {
    metrics::counter!("slb_datagrams_received_total").increment(1);
}

pub fn record_dropped(kind: &'static str) {
    metrics::counter!("slb_messages_dropped_total", "kind" => kind).increment(1);
}

pub fn record_rejection(code: u16) {
    metrics::counter!("slb_rejections_total", "code" => code.to_string()).increment(1);
}

pub fn record_runtime_fault() {
    metrics::counter!("slb_runtime_faults_total").increment(1);
}

pub fn record_send_error() {
    metrics::counter!("slb_send_errors_total").increment(1);
}
