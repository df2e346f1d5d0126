//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry, limiter and call cache from a validated config
//! - Start background tasks (admission window, health probes, workers)
//! - Bind the socket and begin receiving traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The receive loop starts last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::BalancerConfig;
use crate::dialog::{CacheSettings, CallCache};
use crate::health::probe::HealthProber;
use crate::lifecycle::Shutdown;
use crate::load_balancer::registry::NodeRegistry;
use crate::net::buffer::BufferPool;
use crate::net::listener::{Listener, ListenerError};
use crate::net::spawn_workers;
use crate::security::rate_limit::AdmissionLimiter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("Failed to read local address: {0}")]
    LocalAddr(std::io::Error),
    #[error("No usable nodes configured")]
    NoNodes,
}

/// A running balancer: the context object handed to everything else.
pub struct Balancer {
    config: Arc<BalancerConfig>,
    registry: Arc<NodeRegistry>,
    limiter: Arc<AdmissionLimiter>,
    cache: CallCache,
    local_addr: SocketAddr,
    workers: usize,
    tasks: Vec<JoinHandle<()>>,
}

impl Balancer {
    /// Bring up every subsystem. Must be called inside a Tokio runtime.
    pub async fn start(config: BalancerConfig, shutdown: &Shutdown) -> Result<Self, StartupError> {
        let registry = Arc::new(NodeRegistry::new(&config.nodes, config.balancing.distribution));
        if registry.nodes().is_empty() {
            return Err(StartupError::NoNodes);
        }
        tracing::info!(
            nodes = registry.nodes().len(),
            distribution = ?registry.distribution(),
            "Node registry ready"
        );

        let limiter = Arc::new(AdmissionLimiter::new(config.balancing.max_calls_per_second));

        let pool = BufferPool::new(config.pipeline.buffer_size, config.pipeline.queue_size);
        let listener = Listener::bind(&config.listener, pool).await?;
        let local_addr = listener.local_addr().map_err(StartupError::LocalAddr)?;
        let advertised = config
            .listener
            .advertised_address
            .clone()
            .unwrap_or_else(|| local_addr.to_string());

        let cache = CallCache::new(
            registry.clone(),
            limiter.clone(),
            CacheSettings::new(&config.timers, advertised.clone()),
            Handle::current(),
        );

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(limiter.clone().run(shutdown.subscribe())));

        let socket = listener.socket();
        let workers = config.pipeline.effective_workers();
        let (queues, worker_tasks) = spawn_workers(workers, config.pipeline.queue_size, &cache, &socket);
        tasks.extend(worker_tasks);

        let prober = HealthProber::new(cache.clone(), socket, config.health_check.clone());
        tasks.push(tokio::spawn(prober.run(shutdown.subscribe())));

        tasks.push(tokio::spawn(listener.run(queues, shutdown.subscribe())));

        tracing::info!(
            address = %local_addr,
            advertised = %advertised,
            workers,
            max_calls_per_second = limiter.ceiling(),
            "SIP balancer ready"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            limiter,
            cache,
            local_addr,
            workers,
            tasks,
        })
    }

    pub fn config(&self) -> &Arc<BalancerConfig> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &CallCache {
        &self.cache
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Wait for every background task to finish (after shutdown).
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task failed");
            }
        }
    }
}
