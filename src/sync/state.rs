//! Canonical device state and the small value types shared by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use strum::{Display, EnumString};

/// Identity of a remote device (its friendly name on the bus).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one bound control. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub(crate) u64);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unit attached to a scalar reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Celsius,
}

impl Unit {
    /// Glyph appended to the displayed value.
    pub fn glyph(self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
        }
    }
}

/// Three-valued alarm state as reported by sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AlarmState {
    Alarm,
    NoAlarm,
    Unknown,
}

/// Device-kind agnostic view of what a device reports.
///
/// Produced by decoding remote pushes or by mapping a user's gesture through a
/// [`ControlBinding`](crate::binding::ControlBinding). Equality is by value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CanonicalState {
    #[default]
    Unknown,
    Boolean(bool),
    /// Continuous value in `0.0..=1.0`.
    Ratio(f64),
    Scalar { value: f64, unit: Unit },
    Enum(AlarmState),
}

impl CanonicalState {
    /// Build a ratio, clamping into `0.0..=1.0`. Non-finite input yields `Unknown`.
    pub fn ratio(value: f64) -> Self {
        if value.is_finite() {
            CanonicalState::Ratio(value.clamp(0.0, 1.0))
        } else {
            CanonicalState::Unknown
        }
    }

    pub fn celsius(value: f64) -> Self {
        CanonicalState::Scalar {
            value,
            unit: Unit::Celsius,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CanonicalState::Unknown)
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalState::Unknown => f.write_str("unknown"),
            CanonicalState::Boolean(true) => f.write_str("on"),
            CanonicalState::Boolean(false) => f.write_str("off"),
            CanonicalState::Ratio(r) => write!(f, "{:.0}%", r * 100.0),
            CanonicalState::Scalar { value, unit } => write!(f, "{:.1}{}", value, unit.glyph()),
            CanonicalState::Enum(alarm) => write!(f, "{}", alarm),
        }
    }
}

/// A value waiting to be relayed or sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand<T = CanonicalState> {
    pub value: T,
    pub enqueued_at: Instant,
}

/// Result of one outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success,
    Failure(String),
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, DispatchOutcome::Failure(_))
    }
}

impl From<crate::error::Result<()>> for DispatchOutcome {
    fn from(result: crate::error::Result<()>) -> Self {
        match result {
            Ok(()) => DispatchOutcome::Success,
            Err(e) => DispatchOutcome::Failure(e.to_string()),
        }
    }
}
