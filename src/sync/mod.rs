//! Bidirectional state synchronization between widgets and remote devices.
//!
//! A bound control wires four pieces together:
//!
//! ```text
//! device push -> RemoteStateObserver -> Reconciler --(UI queue)--> widget
//! widget gesture -> Reconciler -> InputCoalescer -> CommandDispatcher -> device
//! ```
//!
//! The two directions never cross: state coming from a device is only rendered.

pub mod clock;
pub mod coalescer;
pub mod control;
pub mod dispatcher;
pub mod observer;
pub mod reconciler;
pub mod state;

pub use clock::{Clock, ManualClock, TimerHandle, TokioClock};
pub use coalescer::{InputCoalescer, Relay};
pub use control::ControlHandle;
pub use dispatcher::{CommandDispatcher, CommandSink};
pub use observer::{RemoteStateObserver, Subscription};
pub use reconciler::Reconciler;
pub use state::{AlarmState, CanonicalState, ControlId, DeviceId, DispatchOutcome, Unit};

use crate::binding::ControlBinding;
use crate::binding::codec::PayloadCodec;
use crate::config::SyncConfig;
use crate::remote::RemoteDevice;
use crate::ui::{SharedWidget, UiDispatchQueue};
use log::info;
use reconciler::OutcomeSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Factory for bound controls. One per dashboard.
pub struct SyncEngine {
    clock: Arc<dyn Clock>,
    ui: Arc<dyn UiDispatchQueue>,
    dispatcher: Arc<CommandDispatcher>,
    coalesce_interval: Duration,
    next_id: AtomicU64,
}

impl SyncEngine {
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new(clock: Arc<dyn Clock>, ui: Arc<dyn UiDispatchQueue>, config: &SyncConfig) -> Self {
        Self {
            clock,
            ui,
            dispatcher: Arc::new(CommandDispatcher::new()),
            coalesce_interval: config.coalesce_interval(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn coalesce_interval(&self) -> Duration {
        self.coalesce_interval
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// Bind `widget` to one control of `remote`.
    ///
    /// Subscribes before reading the initial snapshot so no push is missed; a
    /// push that lands while the snapshot is in flight wins over the snapshot.
    /// Never fails: an unreachable device renders as unknown.
    pub async fn bind(
        &self,
        widget: SharedWidget,
        remote: Arc<dyn RemoteDevice>,
        codec: Arc<dyn PayloadCodec>,
        binding: ControlBinding,
    ) -> ControlHandle {
        let id = ControlId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let device = remote.device_id().clone();

        let relay: Relay<CanonicalState> = {
            let dispatcher = self.dispatcher.clone();
            let device = device.clone();
            Arc::new(move |value: CanonicalState| dispatcher.send(&device, id, value))
        };
        let coalescer = InputCoalescer::new(self.coalesce_interval, self.clock.clone(), relay);
        let reconciler = Arc::new(Reconciler::new(
            id,
            device.clone(),
            binding,
            widget,
            self.ui.clone(),
            coalescer,
        ));

        if binding.is_writable() {
            self.dispatcher.register(
                id,
                remote.clone(),
                codec.clone(),
                Arc::new(OutcomeSink(Arc::downgrade(&reconciler))),
            );
        }

        let observer = RemoteStateObserver::new(remote, codec);
        let weak: Weak<Reconciler> = Arc::downgrade(&reconciler);
        let subscription = observer.subscribe(move |state| {
            if let Some(reconciler) = weak.upgrade() {
                reconciler.on_remote_state(state);
            }
        });

        let seq = reconciler.reserve_arrival();
        let initial = observer.snapshot().await;
        info!(
            "[Sync] Bound {} {} as {} (initial {})",
            device,
            id,
            binding.name(),
            initial
        );
        reconciler.deliver(seq, initial);

        ControlHandle::new(reconciler, subscription, self.dispatcher.clone())
    }
}
