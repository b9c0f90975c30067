//! MQTT client wrapper for zigbee2mqtt communication.

use crate::config::MqttConfig;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::time::Duration;
use tokio::sync::mpsc;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Message received from MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

/// Event forwarded from the MQTT event loop.
#[derive(Debug, Clone)]
pub enum MqttEvent {
    /// The broker acknowledged a (re)connect; subscriptions must be renewed.
    Connected,
    Message(MqttMessage),
}

/// Broker connection: a publishing handle plus the event loop driving it.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Self { client, event_loop }
    }

    /// Run the MQTT event loop and forward events to the provided channel.
    ///
    /// Runs until the receiving side of the channel is dropped. Connection
    /// errors are retried every five seconds.
    pub async fn run(mut self, tx: mpsc::Sender<MqttEvent>) {
        info!("[MQTT] Event loop started");

        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("[MQTT] Connected to broker");
                    if tx.send(MqttEvent::Connected).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let topic = publish.topic.clone();
                    let payload = match String::from_utf8(publish.payload.to_vec()) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("[MQTT] Dropping non UTF-8 payload on {}: {}", topic, e);
                            continue;
                        }
                    };

                    debug!("[MQTT] {} <- {}", topic, payload);

                    let msg = MqttMessage { topic, payload };
                    if tx.send(MqttEvent::Message(msg)).await.is_err() {
                        debug!("[MQTT] Router gone, stopping event loop");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[MQTT] Connection error: {:?}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }
}
