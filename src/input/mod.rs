//! # Input sources
//!
//! Front ends translate their raw events into [InputEvent]s through the [InputSource] trait and hand them to the
//! control loop with a [ControlHandle]. Two sources are provided:
//!  - [keyboard::KeyboardSource]: held keys, an axis is active while its key is down,
//!  - [panel::ControlPanel]: web panel widgets, a button click produces a timed [Pulse] on one axis.
//!
//! The [listen] loop drives any source from an async stream of raw events. It may block between events for as long
//! as the front end wants, the control loop does not depend on it to tick.

use futures::{Stream, StreamExt};
use log::debug;
use tokio::time::Instant;

use crate::control::context::ControlHandle;
use crate::control::intent::AxisKey;
use crate::control::state::FlightState;
use crate::Result;

pub mod keyboard;
pub mod panel;

/// One-shot operator actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Take off if armed, land if flying
    ToggleMotors,
    /// Take off
    TakeOff,
    /// Land
    Land,
    /// Emergency stop, bypasses the event queue
    Emergency,
    /// One step up on both speed bounds
    SpeedUp,
    /// One step down on both speed bounds
    SpeedDown,
    /// Timed motion on one axis direction
    Pulse(AxisKey),
}

/// Parameters adjustable from a slider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileParam {
    /// Linear speed bound (m/s)
    LinearSpeed,
    /// Yaw rate bound (deg/s)
    YawRate,
    /// Take-off target height (m)
    TakeoffHeight,
}

/// Canonical input event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A direction key was pressed (`held = true`) or released
    Key {
        /// Direction
        key: AxisKey,
        /// New key state
        held: bool,
    },
    /// A one-shot action
    Action(Action),
    /// A parameter slider moved
    Param {
        /// Parameter
        param: ProfileParam,
        /// New value
        value: f32,
    },
}

/// A front end producing [InputEvent]s
pub trait InputSource {
    /// Raw event type of the front end
    type Raw;

    /// Translate one raw event, `None` if it has no meaning for the controller
    fn translate(&mut self, raw: Self::Raw) -> Option<InputEvent>;
}

/// Scoped, timed override of the intent produced by a button click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Pulsed direction
    pub key: AxisKey,
    /// Instant the pulse reverts to neutral
    pub until: Instant,
}

impl Pulse {
    /// Pulse starting at `now`
    pub fn start(key: AxisKey, now: Instant, duration: std::time::Duration) -> Self {
        Self {
            key,
            until: now + duration,
        }
    }

    /// The pulse holds while it has not elapsed and the vehicle is flying
    pub fn is_active(&self, now: Instant, state: FlightState) -> bool {
        now < self.until && state == FlightState::Flying
    }
}

/// Drive an input source until its raw stream ends or the controller halts
///
/// The listener is not required to drain events once a stop was requested.
pub async fn listen<S, R>(mut source: S, mut raw: R, handle: ControlHandle) -> Result<()>
where
    S: InputSource,
    R: Stream<Item = S::Raw> + Unpin,
{
    while let Some(event) = raw.next().await {
        if handle.halted() {
            debug!("Controller halted, input listener detached");
            break;
        }
        if let Some(event) = source.translate(event) {
            handle.dispatch(event).await?;
        }
    }
    Ok(())
}
