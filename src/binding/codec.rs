//! Payload codecs for zigbee2mqtt style JSON.
//!
//! A codec decodes the subset of a device payload one control cares about
//! and encodes that control's outbound commands. Decoding is pure and never
//! panics; malformed input yields a [`DecodeError`].

use crate::error::{DecodeError, SyncError};
use crate::remote::RemotePayload;
use crate::sync::state::{AlarmState, CanonicalState, Unit};
use serde_json::{Value, json};
use std::str::FromStr;

/// zigbee2mqtt brightness full scale.
pub const BRIGHTNESS_MAX: f64 = 254.0;

/// Shutter position full scale.
pub const POSITION_MAX: f64 = 100.0;

/// Decoder/encoder for one control's slice of a device payload.
pub trait PayloadCodec: Send + Sync {
    /// Name of the control, used in logs and errors.
    fn name(&self) -> &'static str;

    fn decode(&self, payload: &RemotePayload) -> Result<CanonicalState, DecodeError>;

    fn encode(&self, state: &CanonicalState) -> Result<RemotePayload, SyncError>;
}

fn field<'a>(payload: &'a RemotePayload, name: &'static str) -> Result<&'a Value, DecodeError> {
    payload.get(name).ok_or(DecodeError::MissingField(name))
}

fn number(payload: &RemotePayload, name: &'static str) -> Result<f64, DecodeError> {
    field(payload, name)?
        .as_f64()
        .ok_or_else(|| DecodeError::malformed(name, "expected a number"))
}

fn power_state(payload: &RemotePayload) -> Result<Option<bool>, DecodeError> {
    match field(payload, "state")? {
        Value::Null => Ok(None),
        Value::String(s) if s.eq_ignore_ascii_case("on") => Ok(Some(true)),
        Value::String(s) if s.eq_ignore_ascii_case("off") => Ok(Some(false)),
        other => Err(DecodeError::malformed("state", format!("unexpected {}", other))),
    }
}

fn unsupported(codec: &dyn PayloadCodec, state: &CanonicalState) -> SyncError {
    SyncError::UnsupportedCommand {
        control: codec.name(),
        state: state.to_string(),
    }
}

/// `state: "ON" | "OFF"` on/off switch.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerCodec;

impl PayloadCodec for PowerCodec {
    fn name(&self) -> &'static str {
        "power"
    }

    fn decode(&self, payload: &RemotePayload) -> Result<CanonicalState, DecodeError> {
        Ok(match power_state(payload)? {
            Some(on) => CanonicalState::Boolean(on),
            None => CanonicalState::Unknown,
        })
    }

    fn encode(&self, state: &CanonicalState) -> Result<RemotePayload, SyncError> {
        match state {
            CanonicalState::Boolean(on) => Ok(json!({"state": if *on { "ON" } else { "OFF" }})),
            other => Err(unsupported(self, other)),
        }
    }
}

/// Dimmable light brightness, `0..=254`. A light that is off reads as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrightnessCodec;

impl PayloadCodec for BrightnessCodec {
    fn name(&self) -> &'static str {
        "brightness"
    }

    fn decode(&self, payload: &RemotePayload) -> Result<CanonicalState, DecodeError> {
        if let Ok(Some(false)) = power_state(payload) {
            return Ok(CanonicalState::Ratio(0.0));
        }
        let raw = number(payload, "brightness")?;
        if !(0.0..=BRIGHTNESS_MAX).contains(&raw) {
            return Err(DecodeError::malformed("brightness", format!("{} out of range", raw)));
        }
        Ok(CanonicalState::Ratio(raw / BRIGHTNESS_MAX))
    }

    fn encode(&self, state: &CanonicalState) -> Result<RemotePayload, SyncError> {
        match state {
            CanonicalState::Ratio(r) if *r <= 0.0 => Ok(json!({"state": "OFF"})),
            CanonicalState::Ratio(r) => Ok(json!({
                "state": "ON",
                "brightness": (r.min(1.0) * BRIGHTNESS_MAX).round() as u8,
            })),
            other => Err(unsupported(self, other)),
        }
    }
}

/// Shutter / cover position, `0..=100` percent open.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionCodec;

impl PayloadCodec for PositionCodec {
    fn name(&self) -> &'static str {
        "position"
    }

    fn decode(&self, payload: &RemotePayload) -> Result<CanonicalState, DecodeError> {
        let raw = number(payload, "position")?;
        if !(0.0..=POSITION_MAX).contains(&raw) {
            return Err(DecodeError::malformed("position", format!("{} out of range", raw)));
        }
        Ok(CanonicalState::Ratio(raw / POSITION_MAX))
    }

    fn encode(&self, state: &CanonicalState) -> Result<RemotePayload, SyncError> {
        match state {
            CanonicalState::Ratio(r) => Ok(json!({
                "position": (r.clamp(0.0, 1.0) * POSITION_MAX).round() as u8,
            })),
            other => Err(unsupported(self, other)),
        }
    }
}

/// Read-only temperature in degrees Celsius.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemperatureCodec;

impl PayloadCodec for TemperatureCodec {
    fn name(&self) -> &'static str {
        "temperature"
    }

    fn decode(&self, payload: &RemotePayload) -> Result<CanonicalState, DecodeError> {
        match field(payload, "temperature")? {
            Value::Null => Ok(CanonicalState::Unknown),
            _ => Ok(CanonicalState::Scalar {
                value: number(payload, "temperature")?,
                unit: Unit::Celsius,
            }),
        }
    }

    fn encode(&self, state: &CanonicalState) -> Result<RemotePayload, SyncError> {
        Err(unsupported(self, state))
    }
}

/// Read-only temperature alarm, `ALARM | NO_ALARM | UNKNOWN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlarmCodec;

impl PayloadCodec for AlarmCodec {
    fn name(&self) -> &'static str {
        "temperature_alarm"
    }

    fn decode(&self, payload: &RemotePayload) -> Result<CanonicalState, DecodeError> {
        let raw = field(payload, "temperature_alarm")?
            .as_str()
            .ok_or_else(|| DecodeError::malformed("temperature_alarm", "expected a string"))?;
        AlarmState::from_str(raw)
            .map(CanonicalState::Enum)
            .map_err(|_| DecodeError::malformed("temperature_alarm", format!("unknown state {}", raw)))
    }

    fn encode(&self, state: &CanonicalState) -> Result<RemotePayload, SyncError> {
        Err(unsupported(self, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_codec() {
        let codec = PowerCodec;
        assert_eq!(
            codec.decode(&json!({"state": "ON"})),
            Ok(CanonicalState::Boolean(true))
        );
        assert_eq!(
            codec.decode(&json!({"state": "off", "linkquality": 3})),
            Ok(CanonicalState::Boolean(false))
        );
        assert_eq!(codec.decode(&json!({"state": null})), Ok(CanonicalState::Unknown));
        assert_eq!(
            codec.decode(&json!({"brightness": 4})),
            Err(DecodeError::MissingField("state"))
        );
        assert!(matches!(
            codec.decode(&json!({"state": 7})),
            Err(DecodeError::Malformed { field: "state", .. })
        ));

        assert_eq!(
            codec.encode(&CanonicalState::Boolean(false)).unwrap(),
            json!({"state": "OFF"})
        );
        assert!(codec.encode(&CanonicalState::Unknown).is_err());
    }

    #[test]
    fn test_brightness_codec() {
        let codec = BrightnessCodec;
        assert_eq!(
            codec.decode(&json!({"state": "ON", "brightness": 127})),
            Ok(CanonicalState::Ratio(127.0 / 254.0))
        );
        assert_eq!(
            codec.decode(&json!({"state": "OFF", "brightness": 200})),
            Ok(CanonicalState::Ratio(0.0))
        );
        assert!(codec.decode(&json!({"state": "ON", "brightness": 900})).is_err());

        assert_eq!(
            codec.encode(&CanonicalState::Ratio(0.5)).unwrap(),
            json!({"state": "ON", "brightness": 127})
        );
        assert_eq!(
            codec.encode(&CanonicalState::Ratio(0.0)).unwrap(),
            json!({"state": "OFF"})
        );
    }

    #[test]
    fn test_position_codec() {
        let codec = PositionCodec;
        assert_eq!(
            codec.decode(&json!({"position": 60})),
            Ok(CanonicalState::Ratio(0.6))
        );
        assert_eq!(
            codec.encode(&CanonicalState::Ratio(0.2)).unwrap(),
            json!({"position": 20})
        );
        assert!(codec.encode(&CanonicalState::Boolean(true)).is_err());
    }

    #[test]
    fn test_temperature_codec() {
        let codec = TemperatureCodec;
        assert_eq!(
            codec.decode(&json!({"temperature": 21.5, "humidity": 40})),
            Ok(CanonicalState::celsius(21.5))
        );
        assert_eq!(
            codec.decode(&json!({"temperature": null})),
            Ok(CanonicalState::Unknown)
        );
        assert!(codec.decode(&json!({"temperature": "warm"})).is_err());
        assert!(codec.decode(&json!("garbage")).is_err());
        assert!(codec.encode(&CanonicalState::celsius(20.0)).is_err());
    }

    #[test]
    fn test_alarm_codec() {
        let codec = AlarmCodec;
        assert_eq!(
            codec.decode(&json!({"temperature_alarm": "ALARM"})),
            Ok(CanonicalState::Enum(AlarmState::Alarm))
        );
        assert_eq!(
            codec.decode(&json!({"temperature_alarm": "NO_ALARM"})),
            Ok(CanonicalState::Enum(AlarmState::NoAlarm))
        );
        assert!(codec.decode(&json!({"temperature_alarm": "FIRE"})).is_err());
        assert_eq!(
            codec.decode(&json!({"temperature": 3})),
            Err(DecodeError::MissingField("temperature_alarm"))
        );
    }
}
