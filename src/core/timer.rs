use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Handle to an action scheduled with [`Scheduler::schedule`].
///
/// Dropping the handle does not cancel the action; call [`TimerHandle::cancel`].
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Runs deferred actions on the tokio runtime.
///
/// Actions belong to the scheduler's current generation.
/// [`Scheduler::cancel_pending`] invalidates every action scheduled so far
/// without affecting ones scheduled afterwards. Dropping the scheduler
/// cancels everything still pending.
#[derive(Debug, Default)]
pub struct Scheduler {
    generation: Mutex<CancellationToken>,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` after `delay` unless it is cancelled first. Must be
    /// called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();
        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !task_token.is_cancelled() {
                        action();
                    }
                }
            }
        });
        TimerHandle { id, token }
    }

    pub fn cancel_pending(&self) {
        let previous = std::mem::take(
            &mut *self
                .generation
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        previous.cancel();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.generation
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}
