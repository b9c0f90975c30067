use crate::binding::{IconKind, WidgetView};
use crate::ui::Widget;
use log::info;

/// Widget without a screen: keeps what it was asked to show and logs it.
#[derive(Debug)]
pub struct HeadlessWidget {
    label: String,
    history: Vec<WidgetView>,
    enabled: bool,
}

impl HeadlessWidget {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            history: Vec::new(),
            enabled: true,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Most recent view, if anything was rendered yet.
    pub fn current(&self) -> Option<&WidgetView> {
        self.history.last()
    }

    pub fn history(&self) -> &[WidgetView] {
        &self.history
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// One-line human summary of a view.
pub fn describe(view: &WidgetView) -> String {
    if view.icon == IconKind::Unknown {
        return "unknown".to_string();
    }
    if let Some(text) = &view.text {
        return format!("{} ({})", text, view.tooltip);
    }
    if let Some(slider) = view.slider {
        return format!("{:.0}%", slider);
    }
    match view.toggle {
        Some(true) => "on".to_string(),
        Some(false) => "off".to_string(),
        None => view.tooltip.to_string(),
    }
}

impl Widget for HeadlessWidget {
    fn render(&mut self, view: &WidgetView) {
        info!("[UI] {}: {}", self.label, describe(view));
        self.history.push(view.clone());
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(
                "[UI] {}: {}",
                self.label,
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ControlBinding, Thresholds};
    use crate::sync::state::{AlarmState, CanonicalState};

    #[test]
    fn test_describe() {
        let thresholds = Thresholds {
            low: 15.0,
            high: 30.0,
        };
        let cases = [
            (ControlBinding::Power, CanonicalState::Boolean(true), "on"),
            (ControlBinding::Power, CanonicalState::Unknown, "unknown"),
            (ControlBinding::Ratio, CanonicalState::Ratio(0.42), "42%"),
            (
                ControlBinding::Scalar(thresholds),
                CanonicalState::celsius(21.7),
                "21°C (temperature)",
            ),
            (
                ControlBinding::Alarm,
                CanonicalState::Enum(AlarmState::Alarm),
                "alarm",
            ),
        ];
        for (binding, state, expected) in cases {
            assert_eq!(describe(&binding.render(&state)), expected);
        }
    }

    #[test]
    fn test_records_history() {
        let mut widget = HeadlessWidget::new("Hallway power");
        assert!(widget.current().is_none());

        widget.render(&ControlBinding::Power.render(&CanonicalState::Boolean(false)));
        widget.render(&ControlBinding::Power.render(&CanonicalState::Boolean(true)));
        widget.set_enabled(false);

        assert_eq!(widget.history().len(), 2);
        assert_eq!(widget.current().and_then(|v| v.toggle), Some(true));
        assert!(!widget.is_enabled());
    }
}
