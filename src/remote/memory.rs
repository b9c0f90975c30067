//! In-process simulated devices.
//!
//! Used by the `--simulate` mode of the dashboard and as the remote in tests.
//! Failure injection (link down, rejected commands, slow commands) is
//! controlled at runtime through atomics so tests can flip it mid-scenario.

use super::{PushCallback, RemoteDevice, RemotePayload, SubscriptionHandle, merge_payload};
use crate::error::{Result, SyncError};
use crate::sync::state::DeviceId;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval};

/// A command received by a [`SimulatedDevice`].
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub payload: RemotePayload,
    pub at: Instant,
}

/// Simulated device holding its state as a JSON object.
pub struct SimulatedDevice {
    id: DeviceId,
    state: RwLock<RemotePayload>,
    subscribers: RwLock<BTreeMap<u64, PushCallback>>,
    next_subscription: AtomicU64,
    available: AtomicBool,
    fail_commands: AtomicBool,
    echo_commands: AtomicBool,
    command_latency: Mutex<Duration>,
    sent: Mutex<Vec<SentCommand>>,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>, initial: RemotePayload) -> Self {
        Self {
            id: DeviceId::new(name),
            state: RwLock::new(initial),
            subscribers: RwLock::new(BTreeMap::new()),
            next_subscription: AtomicU64::new(0),
            available: AtomicBool::new(true),
            fail_commands: AtomicBool::new(false),
            echo_commands: AtomicBool::new(false),
            command_latency: Mutex::new(Duration::ZERO),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Report accepted commands back as pushes, like real hardware does.
    pub fn with_echo(self) -> Self {
        self.echo_commands.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.command_latency.lock() = latency;
        self
    }

    /// Toggle the link. While unavailable, snapshots fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every following command fail (or succeed again).
    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Merge `update` into the device state and notify subscribers on the
    /// calling thread.
    pub fn push(&self, update: RemotePayload) {
        let snapshot = {
            let mut state = self.state.write();
            merge_payload(&mut state, &update);
            state.clone()
        };
        let callbacks: Vec<PushCallback> = self.subscribers.read().values().cloned().collect();
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    pub fn state(&self) -> RemotePayload {
        self.state.read().clone()
    }

    /// Every command attempt received so far, failed ones included.
    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }

    pub fn sent_payloads(&self) -> Vec<RemotePayload> {
        self.sent.lock().iter().map(|c| c.payload.clone()).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[async_trait]
impl RemoteDevice for SimulatedDevice {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    async fn snapshot(&self) -> Result<RemotePayload> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteUnavailable(format!("{} is offline", self.id)));
        }
        Ok(self.state())
    }

    fn subscribe(&self, callback: PushCallback) -> SubscriptionHandle {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().insert(id, callback);
        SubscriptionHandle(id)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.write().remove(&handle.0);
    }

    async fn send_command(&self, payload: RemotePayload) -> Result<()> {
        let latency = *self.command_latency.lock();
        self.sent.lock().push(SentCommand {
            payload: payload.clone(),
            at: Instant::now(),
        });
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteCommand(format!(
                "{} rejected {}",
                self.id, payload
            )));
        }

        debug!("[Sim] {} accepted {}", self.id, payload);
        if self.echo_commands.load(Ordering::SeqCst) {
            self.push(payload);
        } else {
            merge_payload(&mut self.state.write(), &payload);
        }
        Ok(())
    }
}

/// Spawn a task that periodically pushes temperature readings and a
/// derived alarm state to `sensor`.
///
/// The temperature sweeps between 12°C and 32°C in one degree steps; the alarm
/// is raised above 30°C.
pub fn spawn_sensor_simulation(sensor: Arc<SimulatedDevice>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut temperature = 21.5_f64;
        let mut step = 1.0_f64;
        loop {
            ticker.tick().await;
            temperature += step;
            if !(12.0..=32.0).contains(&temperature) {
                step = -step;
                temperature += 2.0 * step;
            }
            let alarm = if temperature > 30.0 { "ALARM" } else { "NO_ALARM" };
            info!("[Sim] {} temperature {:.1}°C", sensor.device_id(), temperature);
            sensor.push(json!({
                "temperature": temperature,
                "temperature_alarm": alarm,
            }));
        }
    })
}
