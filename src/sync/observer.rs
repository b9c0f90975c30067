//! Adapts a remote device's pushes into canonical state values.

use crate::binding::codec::PayloadCodec;
use crate::error::DecodeError;
use crate::remote::{RemoteDevice, RemotePayload, SubscriptionHandle};
use crate::sync::state::CanonicalState;
use log::{debug, warn};
use std::sync::Arc;

/// Decodes the pushes of one device for one control.
#[derive(Clone)]
pub struct RemoteStateObserver {
    remote: Arc<dyn RemoteDevice>,
    codec: Arc<dyn PayloadCodec>,
}

impl RemoteStateObserver {
    pub fn new(remote: Arc<dyn RemoteDevice>, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { remote, codec }
    }

    /// Register `on_state` for every decodable push.
    ///
    /// `on_state` runs on the remote's notifier context. Payloads that do not
    /// decode are dropped, so the last applied state stays in place.
    pub fn subscribe<F>(&self, on_state: F) -> Subscription
    where
        F: Fn(CanonicalState) + Send + Sync + 'static,
    {
        let codec = self.codec.clone();
        let device = self.remote.device_id().clone();
        let handle = self.remote.subscribe(Arc::new(move |payload: &RemotePayload| {
            match codec.decode(payload) {
                Ok(state) => on_state(state),
                Err(DecodeError::MissingField(field)) => {
                    debug!("[Sync] {} push without `{}`, ignored", device, field);
                }
                Err(e) => warn!("[Sync] Dropping {} update: {}", device, e),
            }
        }));
        Subscription {
            remote: self.remote.clone(),
            handle: Some(handle),
        }
    }

    /// Fetch and decode the current state. Never fails: an unreachable device
    /// or an undecodable payload reads as `Unknown`.
    pub async fn snapshot(&self) -> CanonicalState {
        match self.remote.snapshot().await {
            Ok(payload) => match self.codec.decode(&payload) {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        "[Sync] {} snapshot undecodable: {}",
                        self.remote.device_id(),
                        e
                    );
                    CanonicalState::Unknown
                }
            },
            Err(e) => {
                warn!("[Sync] {}", e);
                CanonicalState::Unknown
            }
        }
    }
}

/// Live registration with a remote. Unsubscribes on [`Subscription::cancel`]
/// or drop.
pub struct Subscription {
    remote: Arc<dyn RemoteDevice>,
    handle: Option<SubscriptionHandle>,
}

impl Subscription {
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.remote.unsubscribe(handle);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::codec::{PowerCodec, TemperatureCodec};
    use crate::remote::SimulatedDevice;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_pushes_are_decoded_and_bad_ones_dropped() {
        let device = Arc::new(SimulatedDevice::new("office", json!({})));
        let observer = RemoteStateObserver::new(device.clone(), Arc::new(TemperatureCodec));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let subscription = observer.subscribe(move |state| sink.lock().push(state));

        device.push(json!({"temperature": 20.5}));
        device.push(json!({"temperature": "hot"}));
        device.push(json!({"temperature": 19.0}));

        assert_eq!(
            *seen.lock(),
            vec![CanonicalState::celsius(20.5), CanonicalState::celsius(19.0)]
        );

        subscription.cancel();
        assert_eq!(device.subscriber_count(), 0);
        device.push(json!({"temperature": 1.0}));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let device = Arc::new(SimulatedDevice::new("lamp", json!({"state": "ON"})));
        let observer = RemoteStateObserver::new(device.clone(), Arc::new(PowerCodec));
        {
            let _subscription = observer.subscribe(|_| {});
            assert_eq!(device.subscriber_count(), 1);
        }
        assert_eq!(device.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_fails_closed() {
        let device = Arc::new(SimulatedDevice::new("lamp", json!({"state": "ON"})));
        let observer = RemoteStateObserver::new(device.clone(), Arc::new(PowerCodec));
        assert_eq!(observer.snapshot().await, CanonicalState::Boolean(true));

        device.set_available(false);
        assert_eq!(observer.snapshot().await, CanonicalState::Unknown);

        device.set_available(true);
        device.push(json!({"state": 42}));
        assert_eq!(observer.snapshot().await, CanonicalState::Unknown);
    }
}
