//! One-shot cancellable timers.
//!
//! A timer runs its callback on the Tokio runtime, never on the thread that
//! scheduled it. `stop` and the firing path race on one atomic state word, so
//! exactly one of them wins and the loser can tell.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

const PENDING: u8 = 0;
const CANCELLED: u8 = 1;
const FIRED: u8 = 2;

#[derive(Debug)]
pub struct Timer {
    state: Arc<AtomicU8>,
    task: AbortHandle,
}

impl Timer {
    /// Run `callback` once after `delay` unless stopped first.
    pub fn schedule<F>(runtime: &Handle, delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PENDING));
        let flag = state.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if flag
                .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                callback();
            }
        });

        Self {
            state,
            task: task.abort_handle(),
        }
    }

    /// Cancel the timer.
    ///
    /// Returns `true` if the timer was still pending; the callback will then
    /// never run. Returns `false` if it already fired or was already stopped.
    pub fn stop(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.task.abort();
        }
        won
    }

    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}
