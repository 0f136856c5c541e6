//! # Control panel input
//!
//! Widget front end for a browser panel. The panel is described by a list of [ControlDescriptor]s; the front end
//! renders them and reports clicks and slider changes by widget id. [ControlPanel] turns those reports into
//! [InputEvent]s through a dispatch table built from the same descriptors.
//!
//! Movement buttons produce timed pulses ([Action::Pulse]) rather than held axes: a click moves the vehicle for the
//! configured pulse duration, then it hovers again.
//!
//! ```
//! use flowdeck_pilot::input::panel::{default_controls, ControlPanel, WidgetEvent};
//! use flowdeck_pilot::input::{InputEvent, InputSource, ProfileParam};
//! use flowdeck_pilot::PilotConfig;
//!
//! let mut panel = ControlPanel::new(default_controls(&PilotConfig::default())).unwrap();
//! let event = panel.translate(WidgetEvent::Change { id: "height".to_owned(), value: 7.0 });
//! assert_eq!(event, Some(InputEvent::Param { param: ProfileParam::TakeoffHeight, value: 3.0 }));
//! ```

use std::collections::HashMap;

use log::debug;

use crate::config::{PilotConfig, MAX_TAKEOFF_HEIGHT, MIN_TAKEOFF_HEIGHT};
use crate::control::intent::AxisKey;
use crate::input::{Action, InputEvent, InputSource, ProfileParam};
use crate::{Error, Result};

/// Kind of widget
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WidgetKind {
    /// Push button
    Button,
    /// Slider, values reported outside `min..=max` are clamped
    Slider {
        /// Lowest value
        min: f32,
        /// Highest value
        max: f32,
        /// Step between two positions
        step: f32,
        /// Position when the panel opens
        initial: f32,
    },
}

/// What a widget does
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Handler {
    /// Fire an action on click
    Action(Action),
    /// Set a parameter on change
    Param(ProfileParam),
}

/// Declarative description of one panel widget
#[derive(Debug, Clone, PartialEq)]
pub struct ControlDescriptor {
    /// Identifier reported by the front end
    pub id: &'static str,
    /// Label displayed on the widget
    pub label: &'static str,
    /// Tooltip
    pub hint: &'static str,
    /// Widget kind
    pub kind: WidgetKind,
    /// Effect of the widget
    pub handler: Handler,
}

impl ControlDescriptor {
    fn button(id: &'static str, label: &'static str, hint: &'static str, action: Action) -> Self {
        Self {
            id,
            label,
            hint,
            kind: WidgetKind::Button,
            handler: Handler::Action(action),
        }
    }

    fn slider(
        id: &'static str,
        label: &'static str,
        (min, max, step): (f32, f32, f32),
        initial: f32,
        param: ProfileParam,
    ) -> Self {
        Self {
            id,
            label,
            hint: "",
            kind: WidgetKind::Slider {
                min,
                max,
                step,
                initial: initial.max(min).min(max),
            },
            handler: Handler::Param(param),
        }
    }
}

/// Widget set of the flow deck control panel
///
/// Slider initial positions come from `config`.
pub fn default_controls(config: &PilotConfig) -> Vec<ControlDescriptor> {
    let mut controls = vec![
        ControlDescriptor::button("takeoff", "Takeoff", "Take off to the selected height", Action::TakeOff),
        ControlDescriptor::button("land", "Land", "Land and disarm", Action::Land),
        ControlDescriptor::button("emergency", "Emergency", "Stop and land immediately", Action::Emergency),
        ControlDescriptor::slider(
            "height",
            "Height (m)",
            (MIN_TAKEOFF_HEIGHT, MAX_TAKEOFF_HEIGHT, 0.1),
            config.takeoff_height,
            ProfileParam::TakeoffHeight,
        ),
        ControlDescriptor::slider(
            "speed",
            "Speed (m/s)",
            (0.05, 1.0, 0.05),
            config.profile.linear_speed,
            ProfileParam::LinearSpeed,
        ),
        ControlDescriptor::slider(
            "turn",
            "Turn rate (deg/s)",
            (5.0, 500.0, 5.0),
            config.profile.yaw_rate,
            ProfileParam::YawRate,
        ),
    ];

    let movements = [
        ("forward", "Forward", AxisKey::Forward),
        ("back", "Back", AxisKey::Back),
        ("left", "Left", AxisKey::Left),
        ("right", "Right", AxisKey::Right),
        ("up", "Up", AxisKey::Up),
        ("down", "Down", AxisKey::Down),
        ("yaw_left", "Turn left", AxisKey::YawLeft),
        ("yaw_right", "Turn right", AxisKey::YawRight),
    ];
    controls.extend(movements.iter().map(|(id, label, key)| {
        ControlDescriptor::button(*id, *label, "Move briefly, then hover", Action::Pulse(*key))
    }));

    controls
}

/// Event reported by the panel front end
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    /// Button clicked
    Click {
        /// Widget id
        id: String,
    },
    /// Slider moved
    Change {
        /// Widget id
        id: String,
        /// New slider value
        value: f32,
    },
}

/// Panel [InputSource], dispatching widget events by id
#[derive(Debug, Clone)]
pub struct ControlPanel {
    descriptors: Vec<ControlDescriptor>,
    dispatch: HashMap<&'static str, usize>,
}

impl ControlPanel {
    /// Build the dispatch table
    ///
    /// Widget ids must be unique and slider bounds finite, with `min <= max` and a positive step.
    pub fn new(descriptors: Vec<ControlDescriptor>) -> Result<Self> {
        let mut dispatch = HashMap::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.iter().enumerate() {
            if let WidgetKind::Slider { min, max, step, .. } = descriptor.kind {
                if !(min.is_finite() && max.is_finite() && min <= max && step > 0.0) {
                    return Err(Error::ConfigError(format!(
                        "slider '{}' has invalid bounds {}..={} step {}",
                        descriptor.id, min, max, step
                    )));
                }
            }
            if dispatch.insert(descriptor.id, index).is_some() {
                return Err(Error::ConfigError(format!("duplicate widget id '{}'", descriptor.id)));
            }
        }
        Ok(Self { descriptors, dispatch })
    }

    /// Widgets in display order
    pub fn descriptors(&self) -> &[ControlDescriptor] {
        &self.descriptors
    }

    fn lookup(&self, id: &str) -> Option<&ControlDescriptor> {
        let descriptor = self.dispatch.get(id).map(|index| &self.descriptors[*index]);
        if descriptor.is_none() {
            debug!("Unknown widget '{}'", id);
        }
        descriptor
    }
}

impl InputSource for ControlPanel {
    type Raw = WidgetEvent;

    fn translate(&mut self, raw: WidgetEvent) -> Option<InputEvent> {
        match raw {
            WidgetEvent::Click { id } => match self.lookup(&id)?.handler {
                Handler::Action(action) => Some(InputEvent::Action(action)),
                Handler::Param(_) => None,
            },
            WidgetEvent::Change { id, value } => {
                let descriptor = self.lookup(&id)?;
                match (descriptor.handler, descriptor.kind) {
                    (Handler::Param(param), WidgetKind::Slider { min, max, .. }) if value.is_finite() => {
                        Some(InputEvent::Param {
                            param,
                            value: value.clamp(min, max),
                        })
                    }
                    _ => None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> ControlPanel {
        ControlPanel::new(default_controls(&PilotConfig::default())).unwrap()
    }

    fn click(id: &str) -> WidgetEvent {
        WidgetEvent::Click { id: id.to_owned() }
    }

    #[test]
    fn default_widget_set() {
        let panel = panel();
        let ids: Vec<&str> = panel.descriptors().iter().map(|d| d.id).collect();
        assert_eq!(&ids[..6], &["takeoff", "land", "emergency", "height", "speed", "turn"]);
        assert_eq!(ids.len(), 14);
        assert_eq!(
            panel.descriptors()[4].kind,
            WidgetKind::Slider {
                min: 0.05,
                max: 1.0,
                step: 0.05,
                initial: 0.35
            }
        );
    }

    #[test]
    fn buttons_fire_their_action() {
        let mut panel = panel();
        assert_eq!(panel.translate(click("takeoff")), Some(InputEvent::Action(Action::TakeOff)));
        assert_eq!(panel.translate(click("emergency")), Some(InputEvent::Action(Action::Emergency)));
        assert_eq!(
            panel.translate(click("yaw_left")),
            Some(InputEvent::Action(Action::Pulse(AxisKey::YawLeft)))
        );
    }

    #[test]
    fn sliders_are_clamped() {
        let mut panel = panel();
        let change = |id: &str, value| WidgetEvent::Change { id: id.to_owned(), value };
        assert_eq!(
            panel.translate(change("speed", 0.0)),
            Some(InputEvent::Param { param: ProfileParam::LinearSpeed, value: 0.05 })
        );
        assert_eq!(
            panel.translate(change("turn", 90.0)),
            Some(InputEvent::Param { param: ProfileParam::YawRate, value: 90.0 })
        );
        assert_eq!(panel.translate(change("turn", f32::NAN)), None);
    }

    #[test]
    fn unknown_or_mismatched_events_are_dropped() {
        let mut panel = panel();
        assert_eq!(panel.translate(click("barrel_roll")), None);
        assert_eq!(panel.translate(click("height")), None);
        assert_eq!(panel.translate(WidgetEvent::Change { id: "land".to_owned(), value: 1.0 }), None);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut controls = default_controls(&PilotConfig::default());
        controls.push(controls[0].clone());
        assert!(matches!(ControlPanel::new(controls), Err(Error::ConfigError(_))));
    }

    #[test]
    fn inverted_slider_is_rejected() {
        let mut controls = default_controls(&PilotConfig::default());
        controls[3].kind = WidgetKind::Slider {
            min: 3.0,
            max: 0.2,
            step: 0.1,
            initial: 0.5,
        };
        assert!(matches!(ControlPanel::new(controls), Err(Error::ConfigError(_))));

        let mut controls = default_controls(&PilotConfig::default());
        controls[4].kind = WidgetKind::Slider {
            min: 0.05,
            max: f32::NAN,
            step: 0.05,
            initial: 0.35,
        };
        assert!(matches!(ControlPanel::new(controls), Err(Error::ConfigError(_))));
    }
}
