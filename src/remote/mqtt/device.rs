//! zigbee2mqtt devices exposed as [`RemoteDevice`]s.
//!
//! A single [`MqttHub`] owns the broker connection and routes incoming state
//! messages to the registered [`MqttRemoteDevice`]s. The hub's router task is
//! the notifier context: push callbacks run there, in topic order.

use super::client::{MqttClient, MqttEvent, MqttMessage};
use crate::config::MqttConfig;
use crate::error::{Result, SyncError};
use crate::remote::{PushCallback, RemoteDevice, RemotePayload, SubscriptionHandle, merge_payload};
use crate::sync::state::DeviceId;
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, QoS};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One zigbee2mqtt device addressed by its friendly name.
pub struct MqttRemoteDevice {
    id: DeviceId,
    client: AsyncClient,
    base_topic: String,
    snapshot_timeout: Duration,
    online: AtomicBool,
    last: RwLock<Option<RemotePayload>>,
    waiters: Mutex<Vec<oneshot::Sender<RemotePayload>>>,
    subscribers: RwLock<BTreeMap<u64, PushCallback>>,
    next_subscription: AtomicU64,
}

impl MqttRemoteDevice {
    fn new(
        name: &str,
        client: AsyncClient,
        base_topic: &str,
        snapshot_timeout: Duration,
    ) -> Self {
        Self {
            id: DeviceId::new(name),
            client,
            base_topic: base_topic.to_string(),
            snapshot_timeout,
            online: AtomicBool::new(true),
            last: RwLock::new(None),
            waiters: Mutex::new(Vec::new()),
            subscribers: RwLock::new(BTreeMap::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub fn state_topic(&self) -> String {
        format!("{}/{}", self.base_topic, self.id)
    }

    fn set_topic(&self) -> String {
        format!("{}/{}/set", self.base_topic, self.id)
    }

    fn get_topic(&self) -> String {
        format!("{}/{}/get", self.base_topic, self.id)
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/{}/availability", self.base_topic, self.id)
    }

    fn subscribe_topics(&self) -> Vec<String> {
        vec![self.state_topic(), self.availability_topic()]
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Ask the device to publish its current state.
    async fn request_state(&self) -> Result<()> {
        self.client
            .publish(self.get_topic(), QoS::AtMostOnce, false, r#"{"state":""}"#)
            .await
            .map_err(|e| SyncError::RemoteUnavailable(format!("{}: {}", self.id, e)))
    }

    fn deliver(&self, update: &RemotePayload) {
        let payload = {
            let mut last = self.last.write();
            match last.as_mut() {
                Some(state) => merge_payload(state, update),
                None => *last = Some(update.clone()),
            }
            last.clone().unwrap_or_else(|| update.clone())
        };

        for waiter in self.waiters.lock().drain(..) {
            let _ = waiter.send(payload.clone());
        }

        let callbacks: Vec<PushCallback> = self.subscribers.read().values().cloned().collect();
        for callback in callbacks {
            callback(&payload);
        }
    }

    fn set_availability(&self, payload: &str) {
        // zigbee2mqtt publishes either `online` or `{"state":"online"}`
        let state = serde_json::from_str::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("state").and_then(|s| s.as_str()).map(str::to_string))
            .unwrap_or_else(|| payload.trim().to_string());
        let online = state.eq_ignore_ascii_case("online");
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            info!(
                "[MQTT] {} is {}",
                self.id,
                if online { "online" } else { "offline" }
            );
        }
    }
}

#[async_trait]
impl RemoteDevice for MqttRemoteDevice {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    async fn snapshot(&self) -> Result<RemotePayload> {
        if !self.is_online() {
            return Err(SyncError::RemoteUnavailable(format!("{} is offline", self.id)));
        }
        let cached = self.last.read().clone();
        if let Some(state) = cached {
            return Ok(state);
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push(tx);
        self.request_state().await?;

        match tokio::time::timeout(self.snapshot_timeout, rx).await {
            Ok(Ok(state)) => Ok(state),
            _ => Err(SyncError::RemoteUnavailable(format!(
                "{} sent no state within {:?}",
                self.id, self.snapshot_timeout
            ))),
        }
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
        if !self.is_online() {
            return Err(SyncError::RemoteCommand(format!("{} is offline", self.id)));
        }
        debug!("[MQTT] {} <- {}", self.set_topic(), payload);
        self.client
            .publish(self.set_topic(), QoS::AtLeastOnce, false, payload.to_string())
            .await
            .map_err(|e| SyncError::RemoteCommand(format!("{}: {}", self.id, e)))
    }
}

/// Broker connection shared by all MQTT devices.
pub struct MqttHub {
    client: AsyncClient,
    base_topic: String,
    snapshot_timeout: Duration,
    devices: RwLock<HashMap<String, Arc<MqttRemoteDevice>>>,
}

impl MqttHub {
    /// Connect to the broker and start routing.
    ///
    /// Returns the hub and the router task handle; aborting the handle stops
    /// push delivery.
    pub fn start(config: &MqttConfig, snapshot_timeout: Duration) -> (Arc<Self>, JoinHandle<()>) {
        info!(
            "[MQTT] Connecting to {}:{}",
            config.broker_host, config.broker_port
        );
        let mqtt_client = MqttClient::new(config);
        let hub = Arc::new(Self::with_client(
            mqtt_client.client(),
            &config.base_topic,
            snapshot_timeout,
        ));

        let (tx, rx) = mpsc::channel::<MqttEvent>(64);
        let event_loop = tokio::spawn(mqtt_client.run(tx));

        let router = hub.clone();
        let handle = tokio::spawn(async move {
            router.route(rx).await;
            event_loop.abort();
        });
        (hub, handle)
    }

    fn with_client(client: AsyncClient, base_topic: &str, snapshot_timeout: Duration) -> Self {
        Self {
            client,
            base_topic: base_topic.trim_end_matches('/').to_string(),
            snapshot_timeout,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Get or register the device with the given friendly name.
    pub async fn device(&self, friendly_name: &str) -> Arc<MqttRemoteDevice> {
        let existing = self
            .devices
            .read()
            .values()
            .find(|d| d.device_id().as_str() == friendly_name)
            .cloned();
        if let Some(device) = existing {
            return device;
        }

        let device = Arc::new(MqttRemoteDevice::new(
            friendly_name,
            self.client.clone(),
            &self.base_topic,
            self.snapshot_timeout,
        ));
        {
            let mut devices = self.devices.write();
            for topic in device.subscribe_topics() {
                devices.insert(topic, device.clone());
            }
        }
        for topic in device.subscribe_topics() {
            if let Err(e) = self.client.subscribe(&topic, QoS::AtMostOnce).await {
                warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e);
            }
        }
        device
    }

    async fn route(&self, mut rx: mpsc::Receiver<MqttEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                MqttEvent::Connected => self.resubscribe().await,
                MqttEvent::Message(msg) => self.dispatch(&msg),
            }
        }
        debug!("[MQTT] Router finished");
    }

    fn dispatch(&self, msg: &MqttMessage) {
        let Some(device) = self.devices.read().get(&msg.topic).cloned() else {
            return;
        };

        if msg.topic == device.availability_topic() {
            device.set_availability(&msg.payload);
            return;
        }

        match serde_json::from_str::<RemotePayload>(&msg.payload) {
            Ok(payload) if payload.is_object() => device.deliver(&payload),
            Ok(_) => warn!("[MQTT] {} sent a non-object payload", device.device_id()),
            Err(e) => warn!("[MQTT] Failed to parse {} state: {}", device.device_id(), e),
        }
    }

    /// Renew subscriptions and request fresh state after a (re)connect.
    async fn resubscribe(&self) {
        let devices: Vec<Arc<MqttRemoteDevice>> = {
            let devices = self.devices.read();
            let mut unique: Vec<Arc<MqttRemoteDevice>> = Vec::new();
            for device in devices.values() {
                if !unique.iter().any(|d| Arc::ptr_eq(d, device)) {
                    unique.push(device.clone());
                }
            }
            unique
        };

        for device in &devices {
            for topic in device.subscribe_topics() {
                if let Err(e) = self.client.subscribe(&topic, QoS::AtMostOnce).await {
                    warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e);
                }
            }
        }

        // Small delay to ensure subscriptions are processed before requesting state
        tokio::time::sleep(Duration::from_millis(100)).await;

        for device in &devices {
            if let Err(e) = device.request_state().await {
                warn!("[MQTT] Failed to request state: {}", e);
            }
        }
        info!("[MQTT] Tracking {} device(s)", devices.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{EventLoop, MqttOptions};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn offline_client() -> (AsyncClient, EventLoop) {
        AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 32)
    }

    fn message(topic: &str, payload: &str) -> MqttEvent {
        MqttEvent::Message(MqttMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        })
    }

    #[tokio::test]
    async fn test_router_delivers_state_to_subscribers() {
        let (client, _event_loop) = offline_client();
        let hub = MqttHub::with_client(client, "zigbee2mqtt/", Duration::from_secs(1));
        let lamp = hub.device("Hallway").await;
        assert_eq!(lamp.state_topic(), "zigbee2mqtt/Hallway");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        lamp.subscribe(Arc::new(move |p| sink.lock().push(p.clone())));

        let (tx, rx) = mpsc::channel(8);
        tx.send(message("zigbee2mqtt/Hallway", r#"{"state":"ON"}"#))
            .await
            .unwrap();
        tx.send(message("zigbee2mqtt/Hallway", "not json")).await.unwrap();
        tx.send(message("zigbee2mqtt/Other", r#"{"state":"OFF"}"#))
            .await
            .unwrap();
        tx.send(message("zigbee2mqtt/Hallway", r#"{"brightness":20}"#))
            .await
            .unwrap();
        drop(tx);
        hub.route(rx).await;

        assert_eq!(
            *seen.lock(),
            vec![
                json!({"state": "ON"}),
                json!({"state": "ON", "brightness": 20})
            ]
        );
        assert_eq!(
            assert_ok!(lamp.snapshot().await),
            json!({"state": "ON", "brightness": 20})
        );
    }

    #[tokio::test]
    async fn test_device_registration_is_shared() {
        let (client, _event_loop) = offline_client();
        let hub = MqttHub::with_client(client, "zigbee2mqtt", Duration::from_secs(1));
        let first = hub.device("Kitchen").await;
        let second = hub.device("Kitchen").await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_availability_controls_snapshot_and_commands() {
        let (client, _event_loop) = offline_client();
        let hub = MqttHub::with_client(client, "zigbee2mqtt", Duration::from_secs(1));
        let lamp = hub.device("Hallway").await;

        hub.dispatch(&MqttMessage {
            topic: "zigbee2mqtt/Hallway/availability".into(),
            payload: r#"{"state":"offline"}"#.into(),
        });
        assert!(!lamp.is_online());
        let err = assert_err!(lamp.snapshot().await);
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
        let err = assert_err!(lamp.send_command(json!({"state": "ON"})).await);
        assert!(matches!(err, SyncError::RemoteCommand(_)));

        hub.dispatch(&MqttMessage {
            topic: "zigbee2mqtt/Hallway/availability".into(),
            payload: "online".into(),
        });
        assert!(lamp.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_times_out_without_state() {
        let (client, _event_loop) = offline_client();
        let hub = MqttHub::with_client(client, "zigbee2mqtt", Duration::from_millis(200));
        let lamp = hub.device("Hallway").await;

        let err = assert_err!(lamp.snapshot().await);
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_snapshot_waits_for_requested_state() {
        let (client, _event_loop) = offline_client();
        let hub = Arc::new(MqttHub::with_client(
            client,
            "zigbee2mqtt",
            Duration::from_secs(5),
        ));
        let lamp = hub.device("Hallway").await;

        let waiting = {
            let lamp = lamp.clone();
            tokio::spawn(async move { lamp.snapshot().await })
        };
        // Let the snapshot register its waiter
        tokio::task::yield_now().await;
        while lamp.waiters.lock().is_empty() {
            tokio::task::yield_now().await;
        }
        hub.dispatch(&MqttMessage {
            topic: "zigbee2mqtt/Hallway".into(),
            payload: r#"{"state":"OFF"}"#.into(),
        });

        let state = assert_ok!(waiting.await.unwrap());
        assert_eq!(state, json!({"state": "OFF"}));
    }
}
