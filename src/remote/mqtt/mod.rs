//! MQTT adapter for zigbee2mqtt devices.
//!
//! This module provides the broker connection and translates zigbee2mqtt
//! topics into [`RemoteDevice`](crate::remote::RemoteDevice)s.

mod client;
mod device;

pub use client::{MqttClient, MqttEvent, MqttMessage};
pub use device::{MqttHub, MqttRemoteDevice};
