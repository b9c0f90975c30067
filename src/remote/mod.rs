//! Remote device capability consumed by the sync engine.
//!
//! A [`RemoteDevice`] is one addressable device on some bus. It reports its
//! state as raw JSON payloads; decoding into canonical state is the job of a
//! [`PayloadCodec`](crate::binding::codec::PayloadCodec).
//!
//! Available adapters:
//! - `mqtt`: zigbee2mqtt-style devices over an MQTT broker
//! - `memory`: in-process simulated devices

pub mod memory;
pub mod mqtt;

use crate::error::Result;
use crate::sync::state::DeviceId;
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::{SimulatedDevice, spawn_sensor_simulation};
pub use mqtt::{MqttHub, MqttRemoteDevice};

/// Raw device payload as pushed by the remote.
pub type RemotePayload = serde_json::Value;

/// Callback invoked on a notifier context for every pushed payload.
pub type PushCallback = Arc<dyn Fn(&RemotePayload) + Send + Sync>;

/// Token returned by [`RemoteDevice::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

/// One remote device.
#[async_trait]
pub trait RemoteDevice: Send + Sync {
    fn device_id(&self) -> &DeviceId;

    /// Current authoritative state.
    ///
    /// Fails with [`SyncError::RemoteUnavailable`](crate::error::SyncError)
    /// when the device link is down.
    async fn snapshot(&self) -> Result<RemotePayload>;

    /// Register a callback for pushed updates. Callbacks run on a context
    /// owned by the remote, in FIFO order per device.
    fn subscribe(&self, callback: PushCallback) -> SubscriptionHandle;

    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Send a command payload.
    ///
    /// Fails with [`SyncError::RemoteCommand`](crate::error::SyncError).
    async fn send_command(&self, payload: RemotePayload) -> Result<()>;
}

/// Shallow-merge `update` into `state` (zigbee2mqtt partial updates).
pub(crate) fn merge_payload(state: &mut RemotePayload, update: &RemotePayload) {
    match (state.as_object_mut(), update.as_object()) {
        (Some(state), Some(update)) => {
            for (key, value) in update {
                state.insert(key.clone(), value.clone());
            }
        }
        _ => *state = update.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_payload_overwrites_fields() {
        let mut state = json!({"state": "ON", "brightness": 100});
        merge_payload(&mut state, &json!({"brightness": 20, "linkquality": 90}));
        assert_eq!(
            state,
            json!({"state": "ON", "brightness": 20, "linkquality": 90})
        );
    }

    #[test]
    fn test_merge_payload_replaces_non_objects() {
        let mut state = json!(null);
        merge_payload(&mut state, &json!({"state": "OFF"}));
        assert_eq!(state, json!({"state": "OFF"}));
    }
}
