//! # Keyboard input
//!
//! Held-key front end. Direction keys hold their axis for as long as they are down, the other keys fire one action
//! on press and ignore their release.
//!
//! | Key | Effect |
//! |-----|--------|
//! | `W` / `S` | forward / back |
//! | `A` / `D` | left / right |
//! | `Space` / `Ctrl` | up / down |
//! | `←` / `→` | yaw left / yaw right |
//! | `+` / `-` | speed up / speed down |
//! | `` ` `` | take-off / land |
//! | `Esc` | emergency stop |
//!
//! ```
//! use flowdeck_pilot::control::intent::AxisKey;
//! use flowdeck_pilot::input::keyboard::{Key, KeyEvent, KeyboardSource};
//! use flowdeck_pilot::input::{InputEvent, InputSource};
//!
//! let mut keyboard = KeyboardSource::default();
//! assert_eq!(
//!     keyboard.translate(KeyEvent::press(Key::Char('W'))),
//!     Some(InputEvent::Key { key: AxisKey::Forward, held: true })
//! );
//! assert_eq!(keyboard.translate(KeyEvent::release(Key::Char('+'))), None);
//! ```

use crate::control::intent::AxisKey;
use crate::input::{Action, InputEvent, InputSource};

/// Operator help printed by keyboard front ends
pub const CONTROLS_HELP: &str = "\
Flow deck keyboard control
  `        take off / land
  W / S    forward / back
  A / D    left / right
  Space    up
  Ctrl     down
  <- / ->  yaw left / yaw right
  + / -    speed up / speed down
  Esc      emergency stop";

/// Keys the front end can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Printable character
    Char(char),
    /// Space bar
    Space,
    /// Either control key
    Ctrl,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Escape
    Esc,
    /// Any other key
    Other,
}

/// A key press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Key
    pub key: Key,
    /// `true` on press, `false` on release
    pub pressed: bool,
}

impl KeyEvent {
    /// Key pressed
    pub fn press(key: Key) -> Self {
        Self { key, pressed: true }
    }

    /// Key released
    pub fn release(key: Key) -> Self {
        Self { key, pressed: false }
    }
}

/// Keyboard [InputSource]
#[derive(Debug, Default, Clone)]
pub struct KeyboardSource;

impl KeyboardSource {
    fn direction(key: Key) -> Option<AxisKey> {
        let direction = match key {
            Key::Char(c) => match c.to_ascii_lowercase() {
                'w' => AxisKey::Forward,
                's' => AxisKey::Back,
                'a' => AxisKey::Left,
                'd' => AxisKey::Right,
                _ => return None,
            },
            Key::Space => AxisKey::Up,
            Key::Ctrl => AxisKey::Down,
            Key::Left => AxisKey::YawLeft,
            Key::Right => AxisKey::YawRight,
            Key::Esc | Key::Other => return None,
        };
        Some(direction)
    }

    fn action(key: Key) -> Option<Action> {
        match key {
            Key::Char('+') => Some(Action::SpeedUp),
            Key::Char('-') => Some(Action::SpeedDown),
            Key::Char('`') => Some(Action::ToggleMotors),
            Key::Esc => Some(Action::Emergency),
            _ => None,
        }
    }
}

impl InputSource for KeyboardSource {
    type Raw = KeyEvent;

    fn translate(&mut self, raw: KeyEvent) -> Option<InputEvent> {
        if let Some(key) = Self::direction(raw.key) {
            return Some(InputEvent::Key {
                key,
                held: raw.pressed,
            });
        }
        if raw.pressed {
            Self::action(raw.key).map(InputEvent::Action)
        } else {
            None
        }
    }
}
