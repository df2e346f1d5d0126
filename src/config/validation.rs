//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every node address resolves
//! - Validate value ranges (timers > 0, admission ceiling >= -1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::DistributionKind;

/// Smallest receive buffer that still fits a typical INVITE with SDP.
const MIN_BUFFER_SIZE: usize = 1024;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.nodes.is_empty() {
        errors.push(ValidationError::new("nodes", "at least one node is required"));
    }
    for (i, node) in config.nodes.iter().enumerate() {
        if node.resolve().is_none() {
            errors.push(ValidationError::new(
                format!("nodes[{i}].address"),
                format!("cannot resolve '{}:{}'", node.address, node.port),
            ));
        }
    }
    if config.balancing.distribution == DistributionKind::Weighted
        && !config.nodes.is_empty()
        && config.nodes.iter().all(|n| n.weight == 0)
    {
        errors.push(ValidationError::new(
            "nodes.weight",
            "weighted distribution needs at least one node with positive weight",
        ));
    }

    if config.balancing.max_calls_per_second < -1 {
        errors.push(ValidationError::new(
            "balancing.max_calls_per_second",
            "must be -1 (unlimited), 0 (closed) or positive",
        ));
    }

    let timers = &config.timers;
    for (field, value) in [
        ("timers.timeout_ms", timers.timeout_ms),
        ("timers.clear_ms", timers.clear_ms),
        ("timers.probe_timeout_ms", timers.probe_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new(
            "health_check.interval_secs",
            "must be greater than zero",
        ));
    }

    if config.pipeline.queue_size == 0 {
        errors.push(ValidationError::new("pipeline.queue_size", "must be greater than zero"));
    }
    if config.pipeline.buffer_size < MIN_BUFFER_SIZE {
        errors.push(ValidationError::new(
            "pipeline.buffer_size",
            format!("must be at least {MIN_BUFFER_SIZE} bytes"),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
