//! Active health probing.
//!
//! # Responsibilities
//! - Periodically send an OPTIONS ping to every node
//! - Leave the verdict to the call cache: a reply marks the node alive,
//!   the probe timeout marks it dead

use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::HealthCheckConfig;
use crate::dialog::CallCache;
use crate::observability::metrics;

pub struct HealthProber {
    cache: CallCache,
    socket: Arc<UdpSocket>,
    config: HealthCheckConfig,
}

impl HealthProber {
    pub fn new(cache: CallCache, socket: Arc<UdpSocket>, config: HealthCheckConfig) -> Self {
        Self { cache, socket, config }
    }

    /// Probe immediately, then every interval until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Health probing disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            nodes = self.cache.registry().nodes().len(),
            "Health prober starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Send one probe to every node.
    pub async fn probe_all(&self) {
        for node in self.cache.registry().nodes() {
            let request = self.cache.open_probe(node);
            tracing::trace!(node = %node.addr, call_id = %request.call_id, "Probing node");

            // A failed send is left to the probe timeout.
            if let Err(e) = self.socket.send_to(&request.to_bytes(), node.addr).await {
                tracing::warn!(node = %node.addr, error = %e, "Failed to send probe");
                metrics::record_send_error();
            }
        }
    }
}
