//! Packet workers.
//!
//! # Responsibilities
//! - Drain one bounded queue of received datagrams
//! - Run the dispatch step behind a panic boundary
//! - Send whatever the dispatch step produced
//!
//! # Design Decisions
//! - A panic while handling one datagram is logged and counted, never fatal
//! - The receive buffer is returned to the pool before any send is awaited
//! - Send failures are logged, not retried

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::dialog::CallCache;
use crate::error::SlbError;
use crate::net::buffer::PooledBuffer;
use crate::net::dispatch::{process_datagram, Outbound};
use crate::observability::metrics;

/// A received datagram waiting for a worker.
#[derive(Debug)]
pub struct Packet {
    pub source: SocketAddr,
    pub buffer: PooledBuffer,
}

pub struct Worker {
    id: usize,
    cache: CallCache,
    socket: Arc<UdpSocket>,
    queue: mpsc::Receiver<Packet>,
}

impl Worker {
    pub fn new(id: usize, cache: CallCache, socket: Arc<UdpSocket>, queue: mpsc::Receiver<Packet>) -> Self {
        Self { id, cache, socket, queue }
    }

    /// Process packets until every sender of the queue is gone.
    pub async fn run(mut self) {
        tracing::debug!(worker = self.id, "Worker started");

        while let Some(packet) = self.queue.recv().await {
            let Some(outbound) = self.handle(&packet) else {
                continue;
            };
            drop(packet);

            for datagram in outbound {
                if let Err(e) = self.socket.send_to(&datagram.payload, datagram.destination).await {
                    tracing::warn!(
                        worker = self.id,
                        destination = %datagram.destination,
                        error = %e,
                        "Failed to send datagram"
                    );
                    metrics::record_send_error();
                }
            }
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    fn handle(&self, packet: &Packet) -> Option<Vec<Outbound>> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            process_datagram(&self.cache, &packet.buffer, packet.source)
        }));

        match result {
            Ok(outbound) => Some(outbound),
            Err(payload) => {
                let fault = SlbError::RuntimeFault(panic_message(payload.as_ref()));
                tracing::error!(
                    worker = self.id,
                    peer = %packet.source,
                    error = %fault,
                    raw = %String::from_utf8_lossy(&packet.buffer),
                    "Datagram processing failed - Dropping"
                );
                metrics::record_runtime_fault();
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}
