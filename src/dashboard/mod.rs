//! The set of device widgets shown together, and the mapping from a device
//! kind to the controls it exposes.

pub mod widget;

pub use widget::HeadlessWidget;

use crate::binding::codec::{
    AlarmCodec, BrightnessCodec, PayloadCodec, PositionCodec, PowerCodec, TemperatureCodec,
};
use crate::binding::{ControlBinding, Thresholds, WidgetValue};
use crate::config::DeviceConfig;
use crate::error::{Result, SyncError};
use crate::remote::{RemoteDevice, RemotePayload};
use crate::sync::{ControlHandle, SyncEngine};
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Kind of device shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// On/off light
    Light,
    /// Light with on/off and brightness
    Dimmer,
    /// Temperature sensor with alarm
    Temperature,
    /// Roller shutter / cover
    Shutter,
}

impl DeviceKind {
    /// Controls exposed by this kind, in display order.
    pub fn controls(self, thresholds: Thresholds) -> Vec<(Arc<dyn PayloadCodec>, ControlBinding)> {
        match self {
            DeviceKind::Light => vec![control(PowerCodec, ControlBinding::Power)],
            DeviceKind::Dimmer => vec![
                control(PowerCodec, ControlBinding::Power),
                control(BrightnessCodec, ControlBinding::Ratio),
            ],
            DeviceKind::Temperature => vec![
                control(TemperatureCodec, ControlBinding::Scalar(thresholds)),
                control(AlarmCodec, ControlBinding::Alarm),
            ],
            DeviceKind::Shutter => vec![control(PositionCodec, ControlBinding::Ratio)],
        }
    }

    /// Plausible starting state for a simulated device of this kind.
    pub fn simulated_state(self) -> RemotePayload {
        match self {
            DeviceKind::Light => json!({"state": "OFF"}),
            DeviceKind::Dimmer => json!({"state": "ON", "brightness": 127}),
            DeviceKind::Temperature => json!({"temperature": 21.0, "temperature_alarm": "NO_ALARM"}),
            DeviceKind::Shutter => json!({"position": 0}),
        }
    }
}

fn control(
    codec: impl PayloadCodec + 'static,
    binding: ControlBinding,
) -> (Arc<dyn PayloadCodec>, ControlBinding) {
    (Arc::new(codec), binding)
}

/// A control of a dashboard device together with its widget.
pub struct BoundControl {
    pub handle: ControlHandle,
    pub widget: Arc<Mutex<HeadlessWidget>>,
}

pub struct DashboardDevice {
    pub name: String,
    pub kind: DeviceKind,
    pub controls: Vec<BoundControl>,
}

/// All bound devices. Lives on the UI context.
pub struct Dashboard {
    engine: SyncEngine,
    thresholds: Thresholds,
    devices: Vec<DashboardDevice>,
}

impl Dashboard {
    pub fn new(engine: SyncEngine, thresholds: Thresholds) -> Self {
        Self {
            engine,
            thresholds,
            devices: Vec::new(),
        }
    }

    /// Bind every control of one device.
    pub async fn bind_device(&mut self, config: &DeviceConfig, remote: Arc<dyn RemoteDevice>) {
        let mut controls = Vec::new();
        for (codec, binding) in config.kind.controls(self.thresholds) {
            let widget = Arc::new(Mutex::new(HeadlessWidget::new(format!(
                "{} {}",
                config.name,
                codec.name()
            ))));
            let handle = self
                .engine
                .bind(widget.clone(), remote.clone(), codec, binding)
                .await;
            controls.push(BoundControl { handle, widget });
        }
        info!(
            "Dashboard: {} ({}) bound with {} control(s)",
            config.name,
            config.kind,
            controls.len()
        );
        self.devices.push(DashboardDevice {
            name: config.name.clone(),
            kind: config.kind,
            controls,
        });
    }

    pub async fn bind_all<I>(&mut self, devices: I)
    where
        I: IntoIterator<Item = (DeviceConfig, Arc<dyn RemoteDevice>)>,
    {
        for (config, remote) in devices {
            self.bind_device(&config, remote).await;
        }
    }

    pub fn devices(&self) -> &[DashboardDevice] {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Option<&DashboardDevice> {
        self.devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Apply a textual gesture to a device: `on`, `off`, a slider position
    /// `0..=100`, or `enable` to re-enable controls after a failure.
    ///
    /// Returns whether the gesture was accepted. Must run on the UI context.
    pub fn apply_input(&self, name: &str, input: &str) -> Result<bool> {
        let device = self
            .device(name)
            .ok_or_else(|| SyncError::UnknownDevice(name.to_string()))?;
        let input = input.trim();
        let invalid = || SyncError::InvalidInput {
            device: device.name.clone(),
            input: input.to_string(),
        };

        if input.eq_ignore_ascii_case("enable") {
            for control in &device.controls {
                control.handle.enable();
            }
            return Ok(true);
        }

        let value = parse_input(input).ok_or_else(invalid)?;
        let control = device
            .controls
            .iter()
            .find(|c| c.handle.binding().to_canonical(value).is_some())
            .ok_or_else(invalid)?;

        let accepted = control.handle.on_local_intent(value);
        if !accepted {
            warn!("Dashboard: {} rejected `{}`", device.name, input);
        }
        Ok(accepted)
    }

    /// Tear down every control. Idempotent.
    pub fn teardown(&mut self) {
        for device in self.devices.drain(..) {
            for mut control in device.controls {
                control.handle.teardown();
            }
            info!("Dashboard: {} removed", device.name);
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn parse_input(input: &str) -> Option<WidgetValue> {
    if input.eq_ignore_ascii_case("on") {
        Some(WidgetValue::Toggle(true))
    } else if input.eq_ignore_ascii_case("off") {
        Some(WidgetValue::Toggle(false))
    } else {
        input
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(WidgetValue::Slider)
    }
}
