//! Per-control authority over what reaches the widget and what reaches the
//! device.
//!
//! Remote values are only ever applied to the widget. Local intents are only
//! ever offered to the coalescer. Keeping the two paths apart here is what
//! prevents a device's own state from being sent back to it.

use super::coalescer::InputCoalescer;
use super::dispatcher::CommandSink;
use super::state::{CanonicalState, ControlId, DeviceId, DispatchOutcome};
use crate::binding::{ControlBinding, WidgetValue};
use crate::ui::{SharedWidget, UiDispatchQueue};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct ControlState {
    /// Latest remote value applied.
    last_applied: CanonicalState,
    /// Arrival number of `last_applied`; older arrivals are discarded.
    applied_seq: u64,
    /// What the widget currently shows, remote or local echo.
    displayed: Option<CanonicalState>,
    enabled: bool,
}

pub struct Reconciler {
    id: ControlId,
    device: DeviceId,
    binding: ControlBinding,
    widget: SharedWidget,
    ui: Arc<dyn UiDispatchQueue>,
    coalescer: InputCoalescer<CanonicalState>,
    state: Mutex<ControlState>,
    alive: AtomicBool,
    arrivals: AtomicU64,
}

impl Reconciler {
    pub(crate) fn new(
        id: ControlId,
        device: DeviceId,
        binding: ControlBinding,
        widget: SharedWidget,
        ui: Arc<dyn UiDispatchQueue>,
        coalescer: InputCoalescer<CanonicalState>,
    ) -> Self {
        Self {
            id,
            device,
            binding,
            widget,
            ui,
            coalescer,
            state: Mutex::new(ControlState {
                last_applied: CanonicalState::Unknown,
                applied_seq: 0,
                displayed: None,
                enabled: true,
            }),
            alive: AtomicBool::new(true),
            arrivals: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ControlId {
        self.id
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn binding(&self) -> ControlBinding {
        self.binding
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn last_applied(&self) -> CanonicalState {
        self.state.lock().last_applied.clone()
    }

    /// Take the next arrival number. Values are applied in the order their
    /// numbers were taken.
    pub(crate) fn reserve_arrival(&self) -> u64 {
        self.arrivals.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Entry point for decoded remote values. Callable from any thread; the
    /// value is stamped here and applied later on the UI context.
    pub fn on_remote_state(self: &Arc<Self>, value: CanonicalState) {
        if !self.is_alive() {
            return;
        }
        let seq = self.reserve_arrival();
        self.deliver(seq, value);
    }

    /// Schedule applying a value stamped with `seq` on the UI context.
    pub(crate) fn deliver(self: &Arc<Self>, seq: u64, value: CanonicalState) {
        let this = self.clone();
        self.ui
            .schedule(Box::new(move || this.apply_remote(seq, value)));
    }

    /// Apply a remote value to the widget. UI context only. Never produces a
    /// command.
    fn apply_remote(&self, seq: u64, value: CanonicalState) {
        if !self.is_alive() {
            return;
        }
        let (re_enable, changed) = {
            let mut state = self.state.lock();
            if seq <= state.applied_seq {
                debug!(
                    "[Sync] {} {} discarding stale {} (#{} <= #{})",
                    self.device, self.id, value, seq, state.applied_seq
                );
                return;
            }
            state.applied_seq = seq;
            state.last_applied = value.clone();
            let re_enable = !state.enabled;
            state.enabled = true;
            let changed = state.displayed.as_ref() != Some(&value);
            if changed {
                state.displayed = Some(value.clone());
            }
            (re_enable, changed)
        };

        let mut widget = self.widget.lock();
        if re_enable {
            info!("[Sync] {} {} re-enabled by device state", self.device, self.id);
            widget.set_enabled(true);
        }
        if changed {
            debug!("[Sync] {} {} <- {}", self.device, self.id, value);
            widget.render(&self.binding.render(&value));
        }
    }

    /// Handle a user gesture. UI context only. Returns whether the intent was
    /// accepted.
    pub fn on_local_intent(&self, input: WidgetValue) -> bool {
        if !self.is_alive() {
            return false;
        }
        let Some(value) = self.binding.to_canonical(input) else {
            debug!(
                "[Sync] {} {} ignoring {:?} on {} control",
                self.device,
                self.id,
                input,
                self.binding.name()
            );
            return false;
        };

        let changed = {
            let mut state = self.state.lock();
            if !state.enabled {
                debug!("[Sync] {} {} is disabled, rejecting {}", self.device, self.id, value);
                return false;
            }
            let changed = state.displayed.as_ref() != Some(&value);
            state.displayed = Some(value.clone());
            changed
        };
        if changed {
            self.widget.lock().render(&self.binding.render(&value));
        }
        self.coalescer.offer(value);
        true
    }

    /// Outcome of a command sent for this control. Runs on the dispatch lane.
    ///
    /// A failure disables the control at once: the coalesced intent is
    /// dropped and commands still queued for it are refused. The widget is
    /// updated on the UI context.
    pub(crate) fn on_outcome(self: &Arc<Self>, outcome: DispatchOutcome) {
        if !self.is_alive() {
            debug!("[Sync] {} {} torn down, ignoring outcome", self.device, self.id);
            return;
        }
        let DispatchOutcome::Failure(reason) = outcome else {
            return;
        };
        {
            let mut state = self.state.lock();
            if !state.enabled {
                return;
            }
            state.enabled = false;
        }
        self.coalescer.clear_pending();
        warn!("[Sync] {} {} disabled: {}", self.device, self.id, reason);
        let this = self.clone();
        self.ui.schedule(Box::new(move || this.show_disabled()));
    }

    fn show_disabled(&self) {
        if !self.is_alive() || self.is_enabled() {
            return;
        }
        self.widget.lock().set_enabled(false);
    }

    /// Re-enable a control disabled by a failed command. UI context only.
    pub fn enable(&self) {
        if !self.is_alive() {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.enabled {
                return;
            }
            state.enabled = true;
        }
        info!("[Sync] {} {} re-enabled", self.device, self.id);
        self.widget.lock().set_enabled(true);
    }

    /// Stop applying values and drop any coalesced intent. Idempotent.
    pub(crate) fn shutdown(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.coalescer.cancel();
        }
    }
}

/// Dispatcher-facing side of a reconciler. Holds it weakly so a queued
/// route never keeps a torn-down control alive.
pub(crate) struct OutcomeSink(pub(crate) Weak<Reconciler>);

impl CommandSink for OutcomeSink {
    fn accepts_commands(&self) -> bool {
        self.0
            .upgrade()
            .is_some_and(|reconciler| reconciler.is_alive() && reconciler.is_enabled())
    }

    fn on_outcome(&self, outcome: DispatchOutcome) {
        if let Some(reconciler) = self.0.upgrade() {
            reconciler.on_outcome(outcome);
        }
    }
}
