//! UDP listener with backpressure.
//!
//! # Responsibilities
//! - Bind the signaling socket
//! - Receive datagrams into pooled buffers
//! - Hand each datagram to its worker queue
//!
//! # Design Decisions
//! - A full worker queue blocks the receive loop instead of dropping
//! - Datagrams are sharded by Call-ID so one dialog is handled in order

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use crate::config::ListenerConfig;
use crate::net::buffer::BufferPool;
use crate::net::dispatch::shard_for;
use crate::net::worker::Packet;
use crate::observability::metrics;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(std::io::Error),
}

/// The bound signaling socket plus its buffer pool.
pub struct Listener {
    socket: Arc<UdpSocket>,
    pool: BufferPool,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig, pool: BufferPool) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let socket = UdpSocket::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = socket.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            buffer_size = pool.buffer_size(),
            "Listener bound"
        );

        Ok(Self {
            socket: Arc::new(socket),
            pool,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Socket shared with the workers and the prober for sending.
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    /// Receive until shutdown, feeding `queues` (one per worker).
    ///
    /// Dropping the senders on exit lets the workers drain and stop.
    pub async fn run(self, queues: Vec<mpsc::Sender<Packet>>, mut shutdown: broadcast::Receiver<()>) {
        if queues.is_empty() {
            tracing::error!("Listener started without workers");
            return;
        }

        loop {
            let mut buffer = self.pool.acquire();
            let received = tokio::select! {
                result = self.socket.recv_from(buffer.spare_mut()) => result,
                _ = shutdown.recv() => {
                    tracing::info!("Listener received shutdown signal, exiting loop");
                    break;
                }
            };

            let (len, source) = match received {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to receive datagram");
                    continue;
                }
            };
            buffer.set_len(len);
            metrics::record_datagram();

            let shard = shard_for(&buffer, source, queues.len());
            if queues[shard].send(Packet { source, buffer }).await.is_err() {
                tracing::error!(worker = shard, "Worker queue closed, stopping listener");
                break;
            }
        }
    }
}
