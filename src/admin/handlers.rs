use axum::{
    extract::State,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::BalancerConfig;
use crate::dialog::EntrySnapshot;
use crate::load_balancer::node::NodeSnapshot;
use crate::load_balancer::DistributionKind;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub listen_address: String,
}

#[derive(Serialize)]
pub struct NodesView {
    pub distribution: DistributionKind,
    pub alive: usize,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Serialize)]
pub struct CacheView {
    pub size: usize,
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Serialize)]
pub struct Stats {
    pub cache_size: usize,
    pub call_attempts_per_second: u64,
    pub max_calls_per_second: i64,
    pub workers: usize,
    pub cpus: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let status = if state.cache.registry().alive_count() > 0 {
        "operational"
    } else {
        "degraded"
    };
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        listen_address: state.local_addr.to_string(),
    })
}

pub async fn get_nodes(State(state): State<AdminState>) -> Json<NodesView> {
    let registry = state.cache.registry();
    Json(NodesView {
        distribution: registry.distribution(),
        alive: registry.alive_count(),
        nodes: registry.snapshot(),
    })
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheView> {
    let entries = state.cache.snapshot();
    Json(CacheView {
        size: entries.len(),
        entries,
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<Stats> {
    let limiter = state.cache.limiter();
    Json(Stats {
        cache_size: state.cache.len(),
        call_attempts_per_second: limiter.last_rate(),
        max_calls_per_second: limiter.ceiling(),
        workers: state.workers,
        cpus: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Json<BalancerConfig> {
    Json(state.config.sanitized())
}
