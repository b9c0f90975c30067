//! Injectable time source and single-shot timers.
//!
//! Everything time-dependent in the engine goes through [`Clock`] so the
//! coalescing behaviour can be driven deterministically in tests, either with
//! [`ManualClock`] or with [`TokioClock`] on a paused tokio runtime.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// Callback run when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Time source plus single-shot delayed callbacks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Run `task` once after `delay`. The task runs on a context owned by the
    /// clock, never on the caller's stack.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Handle to a scheduled timer.
///
/// Dropping the handle detaches the timer; call [`TimerHandle::cancel`] to
/// stop it from firing.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Prevent the timer from firing if it has not fired yet.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

/// Clock backed by `tokio::time`.
///
/// Honours paused time in `#[tokio::test(start_paused = true)]`.
pub struct TokioClock {
    runtime: Handle,
}

impl TokioClock {
    /// Create a clock that spawns its timers on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self {
            runtime: Handle::current(),
        }
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}

struct ManualTimer {
    id: u64,
    due: Instant,
    task: TimerTask,
}

struct ManualState {
    now: Instant,
    next_id: u64,
    timers: Vec<ManualTimer>,
}

/// Clock that only moves when told to.
///
/// Timers fire on the thread calling [`ManualClock::advance`], in due-time
/// order (ties in scheduling order).
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                next_id: 0,
                timers: Vec::new(),
            })),
        }
    }

    /// Move time forward by `by`, firing every timer that becomes due.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        loop {
            let due = {
                let mut state = self.state.lock();
                let next = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(index, _)| index);
                match next {
                    Some(index) => {
                        let timer = state.timers.remove(index);
                        state.now = state.now.max(timer.due);
                        timer.task
                    }
                    None => {
                        state.now = target;
                        return;
                    }
                }
            };
            // Run outside the lock so the task may schedule new timers.
            due();
        }
    }

    /// Number of timers scheduled and not yet fired or cancelled.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now + delay;
        state.timers.push(ManualTimer { id, due, task });

        let weak: Weak<Mutex<ManualState>> = Arc::downgrade(&self.state);
        TimerHandle::new(move || {
            if let Some(state) = weak.upgrade() {
                state.lock().timers.retain(|t| t.id != id);
            }
        })
    }
}
