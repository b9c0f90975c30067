use crate::dashboard::DeviceKind;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the tokio runtime is built
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            pairs.push((key, value));
        }
    }
    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub sync: SyncConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// zigbee2mqtt base topic
    pub base_topic: String,
}

/// Tuning of the synchronization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum spacing between two outbound commands of one control.
    pub coalesce_interval_ms: u64,
    /// How long to wait for a device's initial state.
    pub snapshot_timeout_ms: u64,
    /// Temperature rendered fully blue.
    pub temperature_low: f64,
    /// Temperature rendered fully red.
    pub temperature_high: f64,
}

impl SyncConfig {
    pub fn coalesce_interval(&self) -> Duration {
        Duration::from_millis(self.coalesce_interval_ms)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            coalesce_interval_ms: 500,
            snapshot_timeout_ms: 2000,
            temperature_low: 15.0,
            temperature_high: 30.0,
        }
    }
}

/// One device shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub kind: DeviceKind,
    /// Friendly name on the bus
    pub name: String,
}

impl FromStr for DeviceConfig {
    type Err = String;

    /// Parse `kind:name`, e.g. `dimmer:Kitchen`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once(':')
            .ok_or_else(|| format!("expected kind:name, got `{}`", s))?;
        let kind = DeviceKind::from_str(kind.trim())
            .map_err(|_| format!("unknown device kind `{}`", kind.trim()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("device name missing in `{}`", s));
        }
        Ok(Self {
            kind,
            name: name.to_string(),
        })
    }
}

/// Parse a comma separated device list, skipping malformed entries.
pub fn parse_devices(list: &str) -> Vec<DeviceConfig> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse() {
            Ok(device) => Some(device),
            Err(e) => {
                warn!("Ignoring device entry: {}", e);
                None
            }
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker_host: "10.0.0.2".to_string(),
                broker_port: 1883,
                client_id: "device-dashboard".to_string(),
                username: None,
                password: None,
                base_topic: "zigbee2mqtt".to_string(),
            },
            sync: SyncConfig::default(),
            devices: parse_devices(
                "light:Hallway,dimmer:Kitchen,temperature:Office,shutter:Living",
            ),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // MQTT configuration
        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Ok(base_topic) = std::env::var("MQTT_BASE_TOPIC") {
            config.mqtt.base_topic = base_topic;
        }

        // Sync engine tuning
        if let Ok(ms) = std::env::var("SYNC_COALESCE_MS")
            && let Ok(ms) = ms.parse()
        {
            config.sync.coalesce_interval_ms = ms;
        }
        if let Ok(ms) = std::env::var("SYNC_SNAPSHOT_TIMEOUT_MS")
            && let Ok(ms) = ms.parse()
        {
            config.sync.snapshot_timeout_ms = ms;
        }
        if let Ok(low) = std::env::var("TEMPERATURE_LOW")
            && let Ok(low) = low.parse()
        {
            config.sync.temperature_low = low;
        }
        if let Ok(high) = std::env::var("TEMPERATURE_HIGH")
            && let Ok(high) = high.parse()
        {
            config.sync.temperature_high = high;
        }

        if let Ok(devices) = std::env::var("DASHBOARD_DEVICES") {
            config.devices = parse_devices(&devices);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv() {
        let content = "# broker\nMQTT_BROKER_HOST = 10.0.0.9\n\nDASHBOARD_DEVICES=\"light:Hall Lamp\"\nEMPTY=\nbroken line\n";
        assert_eq!(
            parse_dotenv(content),
            vec![
                ("MQTT_BROKER_HOST", "10.0.0.9"),
                ("DASHBOARD_DEVICES", "light:Hall Lamp"),
                ("EMPTY", ""),
            ]
        );
    }

    #[test]
    fn test_parse_devices_skips_malformed() {
        let devices = parse_devices("light:Hallway, dimmer : Kitchen,toaster:Bar,shutter:,nocolon,");
        assert_eq!(
            devices,
            vec![
                DeviceConfig {
                    kind: DeviceKind::Light,
                    name: "Hallway".into()
                },
                DeviceConfig {
                    kind: DeviceKind::Dimmer,
                    name: "Kitchen".into()
                },
            ]
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.coalesce_interval(), Duration::from_millis(500));
        assert_eq!(config.devices.len(), 4);
        assert_eq!(config.mqtt.base_topic, "zigbee2mqtt");
    }
}
