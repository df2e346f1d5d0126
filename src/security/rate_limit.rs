//! Admission rate limiting for new dialogs.
//!
//! A fixed one-second window: every admitted dialog bumps a counter, and a
//! background task swaps the counter back to zero once per second, publishing
//! the value it saw as the current call-attempt rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::observability::metrics;

/// Ceiling value that disables the limiter.
pub const UNLIMITED: i64 = -1;

const WINDOW: Duration = Duration::from_secs(1);

/// Per-second gate on newly admitted inbound dialogs.
#[derive(Debug)]
pub struct AdmissionLimiter {
    /// -1 = unlimited, 0 = closed.
    ceiling: i64,
    count: AtomicU64,
    last_rate: AtomicU64,
}

impl AdmissionLimiter {
    pub fn new(ceiling: i64) -> Self {
        Self {
            ceiling,
            count: AtomicU64::new(0),
            last_rate: AtomicU64::new(0),
        }
    }

    pub fn ceiling(&self) -> i64 {
        self.ceiling
    }

    /// Admit one new dialog if the current window has room.
    ///
    /// A refused attempt does not count against the window.
    pub fn try_admit(&self) -> bool {
        if self.ceiling < 0 {
            self.count.fetch_add(1, Ordering::AcqRel);
            return true;
        }
        let ceiling = self.ceiling as u64;
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < ceiling).then_some(n + 1)
            })
            .is_ok()
    }

    /// Close the current window. Returns the number admitted in it.
    pub fn reset(&self) -> u64 {
        let admitted = self.count.swap(0, Ordering::AcqRel);
        self.last_rate.store(admitted, Ordering::Release);
        metrics::record_call_attempts(admitted);
        admitted
    }

    /// Dialogs admitted so far in the open window.
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Dialogs admitted in the last closed window.
    pub fn last_rate(&self) -> u64 {
        self.last_rate.load(Ordering::Acquire)
    }

    /// Reset the window every second until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + WINDOW, WINDOW);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let admitted = self.reset();
                    if admitted > 0 {
                        tracing::trace!(admitted, "Admission window closed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Admission limiter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_never_admits() {
        let limiter = AdmissionLimiter::new(0);
        for _ in 0..10 {
            assert!(!limiter.try_admit());
        }
        assert_eq!(limiter.current(), 0);
    }

    #[test]
    fn test_unlimited_admits_any_burst() {
        let limiter = AdmissionLimiter::new(UNLIMITED);
        for _ in 0..100_000 {
            assert!(limiter.try_admit());
        }
        assert_eq!(limiter.reset(), 100_000);
    }

    #[test]
    fn test_ceiling_and_reset() {
        let limiter = AdmissionLimiter::new(3);
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
        assert_eq!(limiter.current(), 3);

        assert_eq!(limiter.reset(), 3);
        assert_eq!(limiter.last_rate(), 3);
        assert!(limiter.try_admit());
    }

    #[test]
    fn test_concurrent_admission_respects_ceiling() {
        let limiter = Arc::new(AdmissionLimiter::new(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..100).filter(|_| limiter.try_admit()).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_every_second() {
        let limiter = Arc::new(AdmissionLimiter::new(2));
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(limiter.clone().run(rx));

        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());

        time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(limiter.last_rate(), 2);
        assert!(limiter.try_admit());

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
