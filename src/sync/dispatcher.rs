//! Outbound command delivery.
//!
//! Each device gets one lane: a tokio task that sends that device's commands
//! strictly one at a time. A lane holds at most one queued command per
//! control; a newer command for the same control replaces the queued one, so
//! after a slow send only the latest intent goes out.
//!
//! A lane stays registered until its task exits. Routes added while it is
//! winding down join the running lane, so a device never has two sends
//! outstanding.

use super::state::{ControlId, DeviceId, DispatchOutcome, PendingCommand};
use crate::binding::codec::PayloadCodec;
use crate::remote::RemoteDevice;
use crate::sync::state::CanonicalState;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Receiving end of a control's commands. Called on the lane's task.
pub trait CommandSink: Send + Sync {
    /// Whether a queued command for this control may still be sent. Checked
    /// right before each send.
    fn accepts_commands(&self) -> bool {
        true
    }

    fn on_outcome(&self, outcome: DispatchOutcome);
}

impl<F> CommandSink for F
where
    F: Fn(DispatchOutcome) + Send + Sync,
{
    fn on_outcome(&self, outcome: DispatchOutcome) {
        self(outcome)
    }
}

#[derive(Clone)]
struct Route {
    codec: Arc<dyn PayloadCodec>,
    sink: Arc<dyn CommandSink>,
}

type LaneMap = Mutex<HashMap<DeviceId, Arc<Lane>>>;

struct Lane {
    remote: Arc<dyn RemoteDevice>,
    routes: Mutex<HashMap<ControlId, Route>>,
    queue: Mutex<VecDeque<(ControlId, PendingCommand)>>,
    wake: Notify,
}

impl Lane {
    fn enqueue(&self, control: ControlId, value: CanonicalState) {
        let command = PendingCommand {
            value,
            enqueued_at: Instant::now(),
        };
        {
            let mut queue = self.queue.lock();
            match queue.iter_mut().find(|(id, _)| *id == control) {
                Some(slot) => {
                    debug!(
                        "[Dispatch] {} {} superseded {} with {}",
                        self.remote.device_id(),
                        control,
                        slot.1.value,
                        command.value
                    );
                    slot.1 = command;
                }
                None => queue.push_back((control, command)),
            }
        }
        self.wake.notify_one();
    }

    async fn run(self: Arc<Self>, lanes: Weak<LaneMap>) {
        let device = self.remote.device_id().clone();
        debug!("[Dispatch] Lane for {} started", device);
        loop {
            while let Some((control, command)) = self.next_command() {
                let Some(route) = self.routes.lock().get(&control).cloned() else {
                    continue;
                };
                if !route.sink.accepts_commands() {
                    debug!(
                        "[Dispatch] {} {} no longer accepts commands, dropping {}",
                        device, control, command.value
                    );
                    continue;
                }
                let outcome: DispatchOutcome = match route.codec.encode(&command.value) {
                    Ok(payload) => self.remote.send_command(payload).await.into(),
                    Err(e) => DispatchOutcome::Failure(e.to_string()),
                };
                match &outcome {
                    DispatchOutcome::Success => debug!(
                        "[Dispatch] {} {} = {} after {:?}",
                        device,
                        route.codec.name(),
                        command.value,
                        command.enqueued_at.elapsed()
                    ),
                    DispatchOutcome::Failure(reason) => warn!(
                        "[Dispatch] {} {} = {} failed: {}",
                        device,
                        route.codec.name(),
                        command.value,
                        reason
                    ),
                }
                route.sink.on_outcome(outcome);
            }
            if self.routes.lock().is_empty() && self.retire(&lanes) {
                break;
            }
            self.wake.notified().await;
        }
        debug!("[Dispatch] Lane for {} stopped", device);
    }

    /// Leave the lane map if no route was added meanwhile. Returns whether
    /// the lane should stop.
    fn retire(self: &Arc<Self>, lanes: &Weak<LaneMap>) -> bool {
        let Some(lanes) = lanes.upgrade() else {
            return true;
        };
        let mut lanes = lanes.lock();
        if !self.routes.lock().is_empty() {
            return false;
        }
        let device = self.remote.device_id();
        if lanes.get(device).is_some_and(|lane| Arc::ptr_eq(lane, self)) {
            lanes.remove(device);
            info!("[Dispatch] Closed lane for {}", device);
        }
        true
    }

    fn next_command(&self) -> Option<(ControlId, PendingCommand)> {
        self.queue.lock().pop_front()
    }
}

/// Per-device serialized command sender.
pub struct CommandDispatcher {
    runtime: Handle,
    lanes: Arc<LaneMap>,
}

impl CommandDispatcher {
    /// Create a dispatcher spawning lanes on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Route commands of `control` to `remote`, starting the device's lane if
    /// none is running.
    pub fn register(
        &self,
        control: ControlId,
        remote: Arc<dyn RemoteDevice>,
        codec: Arc<dyn PayloadCodec>,
        sink: Arc<dyn CommandSink>,
    ) {
        let device = remote.device_id().clone();
        let mut lanes = self.lanes.lock();
        let lane = lanes.entry(device.clone()).or_insert_with(|| {
            let lane = Arc::new(Lane {
                remote,
                routes: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
            });
            self.runtime
                .spawn(lane.clone().run(Arc::downgrade(&self.lanes)));
            info!("[Dispatch] Opened lane for {}", device);
            lane
        });
        lane.routes.lock().insert(control, Route { codec, sink });
    }

    /// Queue `value` for `control`. Never blocks; callable from any thread.
    pub fn send(&self, device: &DeviceId, control: ControlId, value: CanonicalState) {
        let lane = self.lanes.lock().get(device).cloned();
        match lane {
            Some(lane) if lane.routes.lock().contains_key(&control) => {
                lane.enqueue(control, value)
            }
            _ => warn!(
                "[Dispatch] No route for {} {}, dropping {}",
                device, control, value
            ),
        }
    }

    /// Remove `control`'s route and any command it has queued. The device's
    /// lane stops once its last route is gone and an in-flight send has
    /// completed.
    pub fn close(&self, device: &DeviceId, control: ControlId) {
        let Some(lane) = self.lanes.lock().get(device).cloned() else {
            return;
        };
        lane.queue.lock().retain(|(id, _)| *id != control);
        let remaining = {
            let mut routes = lane.routes.lock();
            routes.remove(&control);
            routes.len()
        };
        if remaining == 0 {
            lane.wake.notify_one();
        }
    }

    /// Number of devices with a running lane.
    pub fn lane_count(&self) -> usize {
        self.lanes.lock().len()
    }
}
