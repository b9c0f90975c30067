//! Device-kind specific mapping between canonical state and widget rendering.
//!
//! [`ControlBinding`] is the only part of a control that knows what kind of
//! device it talks to. Both directions are pure: [`ControlBinding::render`]
//! turns a state into a [`WidgetView`], [`ControlBinding::to_canonical`] turns a
//! user gesture into a state.

pub mod codec;

use crate::config::SyncConfig;
use crate::sync::state::{AlarmState, CanonicalState};
use serde::{Deserialize, Serialize};

/// Full-scale value of slider controls.
pub const SLIDER_MAX: f64 = 100.0;

/// Straight-alpha RGBA color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);
    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
    pub const BLUE: Rgba = Rgba::new(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Rgba = Rgba::new(1.0, 1.0, 0.0, 1.0);
    /// Warm lamp color used for lit bulbs.
    pub const LIGHTBULB: Rgba = Rgba::new(1.0, 0.85, 0.4, 1.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Same hue and saturation at a fraction of the brightness.
    pub fn dimmed(self, brightness: f64) -> Self {
        let k = brightness.clamp(0.0, 1.0);
        Self::new(self.r * k, self.g * k, self.b * k, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IconKind {
    LightBulb,
    Thermometer,
    AlarmTriangle,
    Unknown,
}

/// Fully computed rendering of one control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetView {
    pub icon: IconKind,
    pub color: Rgba,
    /// Slider position in `0.0..=SLIDER_MAX`.
    pub slider: Option<f64>,
    /// Progress bar fill in `0.0..=1.0`.
    pub progress: Option<f64>,
    /// Toggle switch selection; `None` hides the selection (unknown).
    pub toggle: Option<bool>,
    pub text: Option<String>,
    /// Localization key for the tooltip.
    pub tooltip: &'static str,
}

impl WidgetView {
    fn unknown() -> Self {
        Self {
            icon: IconKind::Unknown,
            color: Rgba::BLUE,
            slider: None,
            progress: None,
            toggle: None,
            text: None,
            tooltip: "unknown",
        }
    }
}

/// Raw value read from a widget after a user gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WidgetValue {
    Toggle(bool),
    /// Slider position in `0.0..=SLIDER_MAX`.
    Slider(f64),
}

/// Color gradient thresholds for scalar readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
}

impl Thresholds {
    /// Blue at or below `low`, red at or above `high`, linear in between.
    pub fn gradient(&self, value: f64) -> Rgba {
        if value <= self.low {
            Rgba::BLUE
        } else if value >= self.high {
            Rgba::RED
        } else {
            let red = (value - self.low) / (self.high - self.low);
            Rgba::new(red, 0.0, 1.0 - red, 1.0)
        }
    }
}

impl From<&SyncConfig> for Thresholds {
    fn from(config: &SyncConfig) -> Self {
        Self {
            low: config.temperature_low,
            high: config.temperature_high,
        }
    }
}

/// Per-kind adapter between canonical state and a widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlBinding {
    /// On/off switch with unknown tri-state.
    Power,
    /// Continuous 0..1 control rendered as fill color and slider.
    Ratio,
    /// Read-only reading shown as truncated integer plus unit glyph.
    Scalar(Thresholds),
    /// Read-only three-valued alarm indicator.
    Alarm,
}

impl ControlBinding {
    pub fn name(&self) -> &'static str {
        match self {
            ControlBinding::Power => "power",
            ControlBinding::Ratio => "ratio",
            ControlBinding::Scalar(_) => "scalar",
            ControlBinding::Alarm => "alarm",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, ControlBinding::Power | ControlBinding::Ratio)
    }

    /// Map a user gesture to the state it requests. `None` when the gesture
    /// means nothing for this kind of control.
    pub fn to_canonical(&self, input: WidgetValue) -> Option<CanonicalState> {
        match (self, input) {
            (ControlBinding::Power, WidgetValue::Toggle(on)) => Some(CanonicalState::Boolean(on)),
            (ControlBinding::Ratio, WidgetValue::Slider(position)) if position.is_finite() => {
                Some(CanonicalState::ratio(position / SLIDER_MAX))
            }
            _ => None,
        }
    }

    /// Compute the rendering for `state`. States of another kind render as
    /// unknown.
    pub fn render(&self, state: &CanonicalState) -> WidgetView {
        match self {
            ControlBinding::Power => render_power(state),
            ControlBinding::Ratio => render_ratio(state),
            ControlBinding::Scalar(thresholds) => render_scalar(thresholds, state),
            ControlBinding::Alarm => render_alarm(state),
        }
    }
}

fn render_power(state: &CanonicalState) -> WidgetView {
    match state {
        CanonicalState::Boolean(true) => WidgetView {
            icon: IconKind::LightBulb,
            color: Rgba::LIGHTBULB,
            toggle: Some(true),
            tooltip: "lightOn",
            ..WidgetView::unknown()
        },
        CanonicalState::Boolean(false) => WidgetView {
            icon: IconKind::LightBulb,
            color: Rgba::TRANSPARENT,
            toggle: Some(false),
            tooltip: "lightOff",
            ..WidgetView::unknown()
        },
        _ => WidgetView::unknown(),
    }
}

fn render_ratio(state: &CanonicalState) -> WidgetView {
    let CanonicalState::Ratio(ratio) = state else {
        return WidgetView::unknown();
    };
    let ratio = ratio.clamp(0.0, 1.0);
    if ratio > 0.0 {
        WidgetView {
            icon: IconKind::LightBulb,
            color: Rgba::LIGHTBULB.dimmed(ratio),
            slider: Some(ratio * SLIDER_MAX),
            progress: Some(ratio),
            tooltip: "lightOn",
            ..WidgetView::unknown()
        }
    } else {
        WidgetView {
            icon: IconKind::LightBulb,
            color: Rgba::TRANSPARENT,
            slider: Some(0.0),
            progress: Some(0.0),
            tooltip: "lightOff",
            ..WidgetView::unknown()
        }
    }
}

fn render_scalar(thresholds: &Thresholds, state: &CanonicalState) -> WidgetView {
    match state {
        CanonicalState::Scalar { value, unit } if value.is_finite() => WidgetView {
            icon: IconKind::Thermometer,
            color: thresholds.gradient(*value),
            text: Some(format!("{}{}", value.trunc() as i64, unit.glyph())),
            tooltip: "temperature",
            ..WidgetView::unknown()
        },
        CanonicalState::Scalar { unit, .. } => WidgetView {
            icon: IconKind::Thermometer,
            color: Rgba::RED,
            text: Some(format!("??{}", unit.glyph())),
            tooltip: "unknown",
            ..WidgetView::unknown()
        },
        _ => WidgetView {
            icon: IconKind::Thermometer,
            color: Rgba::RED,
            text: Some("??°C".to_string()),
            tooltip: "unknown",
            ..WidgetView::unknown()
        },
    }
}

fn render_alarm(state: &CanonicalState) -> WidgetView {
    let (color, tooltip) = match state {
        CanonicalState::Enum(AlarmState::Alarm) => (Rgba::RED, "alarm"),
        CanonicalState::Enum(AlarmState::NoAlarm) => (Rgba::TRANSPARENT, "noAlarm"),
        _ => (Rgba::YELLOW, "unknown"),
    };
    WidgetView {
        icon: IconKind::AlarmTriangle,
        color,
        tooltip,
        ..WidgetView::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: Thresholds = Thresholds {
        low: 15.0,
        high: 30.0,
    };

    #[test]
    fn test_power_rendering() {
        let on = ControlBinding::Power.render(&CanonicalState::Boolean(true));
        assert_eq!(on.toggle, Some(true));
        assert_eq!(on.color, Rgba::LIGHTBULB);
        assert_eq!(on.tooltip, "lightOn");

        let off = ControlBinding::Power.render(&CanonicalState::Boolean(false));
        assert_eq!(off.toggle, Some(false));
        assert_eq!(off.color, Rgba::TRANSPARENT);

        let unknown = ControlBinding::Power.render(&CanonicalState::Unknown);
        assert_eq!(unknown.icon, IconKind::Unknown);
        assert_eq!(unknown.toggle, None);
        assert_eq!(unknown.tooltip, "unknown");
    }

    #[test]
    fn test_ratio_rendering_tracks_brightness() {
        let view = ControlBinding::Ratio.render(&CanonicalState::Ratio(0.6));
        assert_eq!(view.slider, Some(60.0));
        assert_eq!(view.progress, Some(0.6));
        assert_eq!(view.color, Rgba::LIGHTBULB.dimmed(0.6));

        let dark = ControlBinding::Ratio.render(&CanonicalState::Ratio(0.0));
        assert_eq!(dark.slider, Some(0.0));
        assert_eq!(dark.color, Rgba::TRANSPARENT);
        assert_eq!(dark.tooltip, "lightOff");
    }

    #[test]
    fn test_render_is_deterministic() {
        let state = CanonicalState::Ratio(0.25);
        assert_eq!(
            ControlBinding::Ratio.render(&state),
            ControlBinding::Ratio.render(&state)
        );
    }

    #[test]
    fn test_scalar_text_truncates() {
        let binding = ControlBinding::Scalar(THRESHOLDS);
        let view = binding.render(&CanonicalState::celsius(21.9));
        assert_eq!(view.text.as_deref(), Some("21°C"));

        let view = binding.render(&CanonicalState::celsius(-3.7));
        assert_eq!(view.text.as_deref(), Some("-3°C"));

        let view = binding.render(&CanonicalState::Unknown);
        assert_eq!(view.text.as_deref(), Some("??°C"));

        let view = binding.render(&CanonicalState::celsius(f64::NEG_INFINITY));
        assert_eq!(view.text.as_deref(), Some("??°C"));
    }

    #[test]
    fn test_gradient_saturates_outside_thresholds() {
        assert_eq!(THRESHOLDS.gradient(-40.0), Rgba::BLUE);
        assert_eq!(THRESHOLDS.gradient(15.0), Rgba::BLUE);
        assert_eq!(THRESHOLDS.gradient(30.0), Rgba::RED);
        assert_eq!(THRESHOLDS.gradient(90.0), Rgba::RED);

        let mid = THRESHOLDS.gradient(22.5);
        assert!((mid.r - 0.5).abs() < 1e-9);
        assert!((mid.b - 0.5).abs() < 1e-9);
        assert_eq!(mid.g, 0.0);
    }

    #[test]
    fn test_alarm_rendering() {
        let alarm = ControlBinding::Alarm.render(&CanonicalState::Enum(AlarmState::Alarm));
        assert_eq!((alarm.color, alarm.tooltip), (Rgba::RED, "alarm"));

        let quiet = ControlBinding::Alarm.render(&CanonicalState::Enum(AlarmState::NoAlarm));
        assert_eq!((quiet.color, quiet.tooltip), (Rgba::TRANSPARENT, "noAlarm"));

        let unknown = ControlBinding::Alarm.render(&CanonicalState::Unknown);
        assert_eq!((unknown.color, unknown.tooltip), (Rgba::YELLOW, "unknown"));
    }

    #[test]
    fn test_to_canonical() {
        assert_eq!(
            ControlBinding::Power.to_canonical(WidgetValue::Toggle(true)),
            Some(CanonicalState::Boolean(true))
        );
        assert_eq!(
            ControlBinding::Ratio.to_canonical(WidgetValue::Slider(30.0)),
            Some(CanonicalState::Ratio(0.3))
        );
        assert_eq!(
            ControlBinding::Ratio.to_canonical(WidgetValue::Slider(250.0)),
            Some(CanonicalState::Ratio(1.0))
        );
        assert_eq!(
            ControlBinding::Ratio.to_canonical(WidgetValue::Slider(f64::NAN)),
            None
        );
        assert_eq!(ControlBinding::Power.to_canonical(WidgetValue::Slider(1.0)), None);
        assert_eq!(ControlBinding::Alarm.to_canonical(WidgetValue::Toggle(true)), None);
        assert!(!ControlBinding::Scalar(THRESHOLDS).is_writable());
    }
}
