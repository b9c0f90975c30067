//! Rate limiting of local write intents.
//!
//! [`InputCoalescer`] turns a burst of `offer()` calls (slider drag ticks,
//! repeated clicks) into at most one relay per interval. The relay always
//! carries the most recent value offered before it fires.

use super::clock::{Clock, TimerHandle};
use super::state::PendingCommand;
use log::debug;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Callback invoked with the coalesced value.
pub type Relay<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Mutable coalescing state of one control.
struct CoalescerWindow<T> {
    last_fired_at: Instant,
    pending: Option<PendingCommand<T>>,
    timer: Option<TimerHandle>,
    /// Incremented on every schedule and cancel; a firing timer whose
    /// generation no longer matches is stale.
    generation: u64,
    cancelled: bool,
}

struct Inner<T> {
    interval: Duration,
    clock: Arc<dyn Clock>,
    relay: Relay<T>,
    window: Mutex<CoalescerWindow<T>>,
}

/// Trailing-edge debounce with an immediate leading edge.
///
/// The window is primed at construction, so the leading edge only fires once
/// a full interval has passed since the coalescer was created or last relayed.
pub struct InputCoalescer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> InputCoalescer<T> {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>, relay: Relay<T>) -> Self {
        let now = clock.now();
        Self {
            inner: Arc::new(Inner {
                interval,
                clock,
                relay,
                window: Mutex::new(CoalescerWindow {
                    last_fired_at: now,
                    pending: None,
                    timer: None,
                    generation: 0,
                    cancelled: false,
                }),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Offer a new value. Either relays it right away or parks it as the
    /// pending value, replacing whatever was parked before.
    pub fn offer(&self, value: T) {
        let now = self.inner.clock.now();
        let mut window = self.inner.window.lock();
        if window.cancelled {
            return;
        }

        let idle = window.timer.is_none()
            && now.saturating_duration_since(window.last_fired_at) >= self.inner.interval;
        if idle {
            window.last_fired_at = now;
            drop(window);
            (self.inner.relay)(value);
            return;
        }

        if window.pending.is_some() {
            debug!("[Sync] Coalescer replaced pending value");
        }
        window.pending = Some(PendingCommand {
            value,
            enqueued_at: now,
        });

        if window.timer.is_none() {
            let due = window.last_fired_at + self.inner.interval;
            let delay = due.saturating_duration_since(now);
            window.generation += 1;
            let generation = window.generation;
            let weak = Arc::downgrade(&self.inner);
            let handle = self.inner.clock.schedule(
                delay,
                Box::new(move || Self::fire(&weak, generation)),
            );
            window.timer = Some(handle);
        }
    }

    /// Drop any pending value and timer. The coalescer ignores offers afterwards.
    pub fn cancel(&self) {
        let timer = {
            let mut window = self.inner.window.lock();
            window.cancelled = true;
            window.pending = None;
            window.generation += 1;
            window.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    /// Drop any pending value and timer but keep accepting offers. The
    /// interval still counts from the last relay.
    pub fn clear_pending(&self) {
        let timer = {
            let mut window = self.inner.window.lock();
            if window.pending.take().is_some() {
                debug!("[Sync] Coalescer dropped pending value");
            }
            window.generation += 1;
            window.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    /// Whether a value is waiting for the window to close.
    pub fn has_pending(&self) -> bool {
        self.inner.window.lock().pending.is_some()
    }

    fn fire(inner: &Weak<Inner<T>>, generation: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let pending = {
            let mut window = inner.window.lock();
            if window.generation != generation || window.cancelled {
                return;
            }
            window.timer = None;
            let pending = window.pending.take();
            if pending.is_some() {
                window.last_fired_at = inner.clock.now();
            }
            pending
        };
        if let Some(pending) = pending {
            (inner.relay)(pending.value);
        }
    }
}

impl<T> Drop for InputCoalescer<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.window.lock().timer.take() {
            timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::clock::ManualClock;

    fn recording(
        interval_ms: u64,
    ) -> (ManualClock, InputCoalescer<u32>, Arc<Mutex<Vec<(Duration, u32)>>>) {
        let clock = ManualClock::new();
        let start = clock.now();
        let relayed = Arc::new(Mutex::new(Vec::new()));

        let log = relayed.clone();
        let relay_clock = clock.clone();
        let relay: Relay<u32> = Arc::new(move |value| {
            log.lock().push((relay_clock.now() - start, value));
        });
        let coalescer =
            InputCoalescer::new(Duration::from_millis(interval_ms), Arc::new(clock.clone()), relay);
        (clock, coalescer, relayed)
    }

    #[test]
    fn test_burst_within_window_relays_last_value_once() {
        let (clock, coalescer, relayed) = recording(500);

        coalescer.offer(30);
        clock.advance(Duration::from_millis(150));
        coalescer.offer(20);
        clock.advance(Duration::from_millis(100));
        coalescer.offer(10);
        assert!(relayed.lock().is_empty());

        clock.advance(Duration::from_millis(300));
        assert_eq!(*relayed.lock(), vec![(Duration::from_millis(500), 10)]);
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn test_idle_offer_fires_immediately() {
        let (clock, coalescer, relayed) = recording(500);

        clock.advance(Duration::from_millis(600));
        coalescer.offer(7);

        assert_eq!(*relayed.lock(), vec![(Duration::from_millis(600), 7)]);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_offer_after_immediate_fire_waits_for_window() {
        let (clock, coalescer, relayed) = recording(500);
        clock.advance(Duration::from_secs(1));

        coalescer.offer(1);
        clock.advance(Duration::from_millis(100));
        coalescer.offer(2);
        clock.advance(Duration::from_millis(100));
        coalescer.offer(3);
        clock.advance(Duration::from_millis(400));

        let relayed = relayed.lock();
        assert_eq!(relayed.len(), 2);
        assert_eq!(relayed[0], (Duration::from_millis(1000), 1));
        assert_eq!(relayed[1], (Duration::from_millis(1500), 3));
    }

    #[test]
    fn test_at_most_one_relay_per_window_under_continuous_drag() {
        let (clock, coalescer, relayed) = recording(500);

        // 3 seconds of drag ticks every 20ms
        for tick in 0..150u32 {
            coalescer.offer(tick);
            clock.advance(Duration::from_millis(20));
        }
        clock.advance(Duration::from_secs(1));

        let relayed = relayed.lock();
        for pair in relayed.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(500));
        }
        assert_eq!(relayed.last().map(|(_, v)| *v), Some(149));
    }

    #[test]
    fn test_cancel_discards_pending_and_ignores_later_offers() {
        let (clock, coalescer, relayed) = recording(500);

        coalescer.offer(5);
        coalescer.cancel();
        clock.advance(Duration::from_secs(2));
        coalescer.offer(6);
        clock.advance(Duration::from_secs(2));

        assert!(relayed.lock().is_empty());
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_clear_pending_keeps_coalescer_usable() {
        let (clock, coalescer, relayed) = recording(500);

        coalescer.offer(1);
        clock.advance(Duration::from_millis(100));
        coalescer.clear_pending();
        assert!(!coalescer.has_pending());
        assert_eq!(clock.pending_timers(), 0);

        clock.advance(Duration::from_secs(1));
        assert!(relayed.lock().is_empty());

        coalescer.offer(2);
        assert_eq!(*relayed.lock(), vec![(Duration::from_millis(1100), 2)]);
    }

    #[test]
    fn test_window_reopens_after_trailing_fire() {
        let (clock, coalescer, relayed) = recording(200);

        coalescer.offer(1);
        clock.advance(Duration::from_millis(200));
        // Trailing fire at 200ms; next window ends at 400ms.
        clock.advance(Duration::from_millis(250));
        coalescer.offer(2);

        assert_eq!(
            *relayed.lock(),
            vec![(Duration::from_millis(200), 1), (Duration::from_millis(450), 2)]
        );
    }
}
