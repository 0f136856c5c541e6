//! # Control intent
//!
//! The canonical, input-source independent description of what the operator wants during one tick. Keyboard keys
//! and panel buttons are both reduced to [AxisKey]s; each pair of opposing keys folds into one axis value in
//! {-1, 0, +1}.
//!
//! Opposing keys cancel: holding both `Forward` and `Back` gives 0 whatever the press order.
//! ```
//! use flowdeck_pilot::control::intent::{Axis, AxisKey, ControlIntent, HeldKeys};
//!
//! let mut keys = HeldKeys::default();
//! keys.set(AxisKey::Back, true);
//! keys.set(AxisKey::Forward, true);
//! assert_eq!(ControlIntent::from_keys(&keys).axis(Axis::ForwardBack), 0);
//!
//! keys.set(AxisKey::Back, false);
//! assert_eq!(ControlIntent::from_keys(&keys).axis(Axis::ForwardBack), 1);
//! ```

/// One velocity axis of the setpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Body x, positive forward
    ForwardBack,
    /// Body y, positive left
    LeftRight,
    /// z, positive up
    UpDown,
    /// Yaw rate, positive clockwise (right)
    Yaw,
}

/// One direction of one axis, as held by a key or pulsed by a button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AxisKey {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    YawLeft,
    YawRight,
}

impl AxisKey {
    /// All directions, in [HeldKeys] storage order
    pub const ALL: [AxisKey; 8] = [
        AxisKey::Forward,
        AxisKey::Back,
        AxisKey::Left,
        AxisKey::Right,
        AxisKey::Up,
        AxisKey::Down,
        AxisKey::YawLeft,
        AxisKey::YawRight,
    ];

    /// Axis this direction acts on
    pub fn axis(self) -> Axis {
        match self {
            AxisKey::Forward | AxisKey::Back => Axis::ForwardBack,
            AxisKey::Left | AxisKey::Right => Axis::LeftRight,
            AxisKey::Up | AxisKey::Down => Axis::UpDown,
            AxisKey::YawLeft | AxisKey::YawRight => Axis::Yaw,
        }
    }

    /// Contribution of this direction to its axis
    pub fn sign(self) -> i8 {
        match self {
            AxisKey::Forward | AxisKey::Left | AxisKey::Up | AxisKey::YawRight => 1,
            AxisKey::Back | AxisKey::Right | AxisKey::Down | AxisKey::YawLeft => -1,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Held/not-held flag for every [AxisKey]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeldKeys {
    held: [bool; 8],
}

impl HeldKeys {
    /// Record a press (`held = true`) or release (`held = false`)
    pub fn set(&mut self, key: AxisKey, held: bool) {
        self.held[key.index()] = held;
    }

    /// Whether the key is currently held
    pub fn is_held(&self, key: AxisKey) -> bool {
        self.held[key.index()]
    }

    /// Release every key
    pub fn clear(&mut self) {
        self.held = [false; 8];
    }

    /// Folded value of an axis: +1, -1, or 0 when both or neither direction is held
    pub fn axis(&self, axis: Axis) -> i8 {
        AxisKey::ALL
            .iter()
            .filter(|key| key.axis() == axis && self.is_held(**key))
            .map(|key| key.sign())
            .sum()
    }
}

/// Operator intent for one tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlIntent {
    /// Forward (+1) / back (-1)
    pub forward_back: i8,
    /// Left (+1) / right (-1)
    pub left_right: i8,
    /// Up (+1) / down (-1)
    pub up_down: i8,
    /// Yaw right (+1) / yaw left (-1)
    pub yaw: i8,
    /// A motor toggle was applied during this tick
    pub toggle_motors: bool,
    /// An emergency was raised during this tick
    pub emergency: bool,
}

impl ControlIntent {
    /// Intent with every axis folded from the held keys
    pub fn from_keys(keys: &HeldKeys) -> Self {
        Self {
            forward_back: keys.axis(Axis::ForwardBack),
            left_right: keys.axis(Axis::LeftRight),
            up_down: keys.axis(Axis::UpDown),
            yaw: keys.axis(Axis::Yaw),
            ..Default::default()
        }
    }

    /// Intent holding a single direction, all other axes at zero
    pub fn single(key: AxisKey) -> Self {
        Self::default().holding(key)
    }

    /// Same intent with the axis of `key` forced to its direction, the other axes untouched
    pub fn holding(mut self, key: AxisKey) -> Self {
        *self.axis_mut(key.axis()) = key.sign();
        self
    }

    /// Value of one axis
    pub fn axis(&self, axis: Axis) -> i8 {
        match axis {
            Axis::ForwardBack => self.forward_back,
            Axis::LeftRight => self.left_right,
            Axis::UpDown => self.up_down,
            Axis::Yaw => self.yaw,
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut i8 {
        match axis {
            Axis::ForwardBack => &mut self.forward_back,
            Axis::LeftRight => &mut self.left_right,
            Axis::UpDown => &mut self.up_down,
            Axis::Yaw => &mut self.yaw,
        }
    }

    /// True when no axis is commanded
    pub fn is_neutral(&self) -> bool {
        self.forward_back == 0 && self.left_right == 0 && self.up_down == 0 && self.yaw == 0
    }
}
