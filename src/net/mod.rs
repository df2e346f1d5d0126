//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming UDP datagram
//!     → listener.rs (receive loop, pooled buffer from buffer.rs)
//!     → dispatch.rs shard_for (Call-ID hash picks the worker)
//!     → bounded queue → worker.rs
//!     → dispatch.rs process_datagram (parse, route, rewrite)
//!     → send to the resolved next hop
//! ```
//!
//! # Design Decisions
//! - Bounded queues: a full queue blocks the receive loop
//! - Buffers are pooled to avoid per-packet allocation
//! - Workers survive any single bad datagram

pub mod buffer;
pub mod dispatch;
pub mod listener;
pub mod worker;

use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dialog::CallCache;

use self::worker::{Packet, Worker};

/// Spawn `workers` workers, splitting `queue_size` slots between them.
///
/// Returns the queue senders (for the listener) and the worker tasks.
pub fn spawn_workers(
    workers: usize,
    queue_size: usize,
    cache: &CallCache,
    socket: &Arc<UdpSocket>,
) -> (Vec<mpsc::Sender<Packet>>, Vec<JoinHandle<()>>) {
    let workers = workers.max(1);
    let per_worker = (queue_size / workers).max(1);

    let mut senders = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let (tx, rx) = mpsc::channel(per_worker);
        senders.push(tx);
        handles.push(tokio::spawn(Worker::new(id, cache.clone(), socket.clone(), rx).run()));
    }

    tracing::info!(workers, queue_per_worker = per_worker, "Workers started");
    (senders, handles)
}
