//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::load_balancer::DistributionKind;

/// Root configuration for the SIP balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// UDP listener (bind address, advertised address).
    pub listener: ListenerConfig,

    /// Distribution policy and admission ceiling.
    pub balancing: BalancingConfig,

    /// Dialog timeout and cleanup windows.
    pub timers: TimerConfig,

    /// Health probing settings.
    pub health_check: HealthCheckConfig,

    /// Ingress worker pool sizing.
    pub pipeline: PipelineConfig,

    /// Core SIP servers.
    pub nodes: Vec<NodeConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5060").
    pub bind_address: String,

    /// Address written into Via/Contact of generated requests.
    /// Falls back to the bound address when unset.
    pub advertised_address: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5060".to_string(),
            advertised_address: None,
        }
    }
}

/// Load balancing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancingConfig {
    /// Node selection policy for new inbound dialogs.
    pub distribution: DistributionKind,

    /// New inbound dialogs admitted per second (-1 = unlimited, 0 = closed).
    pub max_calls_per_second: i64,
}

impl Default for BalancingConfig {
    fn default() -> Self {
        Self {
            distribution: DistributionKind::RoundRobin,
            max_calls_per_second: -1,
        }
    }
}

/// Dialog timer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Time without a response before a dialog is marked timed out.
    pub timeout_ms: u64,

    /// Grace period between a final state and removal from the cache.
    pub clear_ms: u64,

    /// Time a health probe waits for a reply before the node is marked dead.
    pub probe_timeout_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 32_000,
            clear_ms: 10_000,
            probe_timeout_ms: 5_000,
        }
    }
}

impl TimerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn clear(&self) -> Duration {
        Duration::from_millis(self.clear_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active OPTIONS probing.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

/// Ingress pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker count (0 = available parallelism).
    pub workers: usize,

    /// Total queued datagrams across all workers.
    pub queue_size: usize,

    /// Receive buffer size in bytes.
    pub buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_size: 3500,
            buffer_size: 4096,
        }
    }
}

impl PipelineConfig {
    /// Worker count with `0` resolved against the host.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Backend SIP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Host name or IP address.
    pub address: String,

    #[serde(default = "default_sip_port")]
    pub port: u16,

    #[serde(default)]
    pub description: String,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Cost for least-cost load balancing (default: 0).
    #[serde(default)]
    pub cost: u32,
}

impl NodeConfig {
    /// Resolve to the first socket address. Host names go through the system resolver.
    pub fn resolve(&self) -> Option<SocketAddr> {
        (self.address.as_str(), self.port)
            .to_socket_addrs()
            .ok()?
            .next()
    }
}

fn default_sip_port() -> u16 {
    5060
}

fn default_weight() -> u32 {
    1
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

impl BalancerConfig {
    /// Copy safe to expose over the admin API.
    pub fn sanitized(&self) -> Self {
        let mut copy = self.clone();
        copy.admin.api_key = "<redacted>".to_string();
        copy
    }
}
