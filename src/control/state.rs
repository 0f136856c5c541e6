//! # Arming state machine
//!
//! Owns the vehicle lifecycle. Every change of [FlightState] goes through [ArmingStateMachine::request], which holds
//! the state mutex for the whole transition so that the input listener, the control loop and the supervisor can all
//! request transitions concurrently without ever observing or producing a half-applied one.
//!
//! ```text
//! Idle             --AwaitSensor-------> WaitingForSensor
//! WaitingForSensor --SensorConfirmed---> Armed            (arm)
//! WaitingForSensor --SensorTimeout-----> Disarmed
//! Armed            --TakeOff/Toggle----> Flying           (take-off)
//! Flying           --TakeOffFailed-----> Armed
//! Flying           --Land/Toggle-------> Landing          (land)
//! Landing          --LandingComplete---> Disarmed         (disarm)
//! Armed            --Disarm------------> Disarmed         (disarm)
//! *                --Emergency---------> Emergency        (land, if flying)
//! Emergency        --LandingComplete---> Disarmed         (disarm)
//! ```
//!
//! Requests the current state does not accept are ignored: concurrent event delivery makes late and duplicate
//! requests (a second toggle fired before the first was observed, a disarm after shutdown) expected. They are logged
//! at debug level and never surface as an error.
//!
//! Accepted transitions are broadcast to any [subscriber](ArmingStateMachine::subscribe) as [StateChange]s.

use std::sync::{Mutex, MutexGuard};

use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};
use log::{debug, info};

use crate::{Error, Result};

/// Capacity of the state change notification channel. Slow subscribers lose the oldest changes.
const NOTIFICATION_CAPACITY: usize = 32;

/// Vehicle lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightState {
    /// Connected, nothing requested yet
    Idle,
    /// Waiting for the flow deck confirmation
    WaitingForSensor,
    /// Motors armed, on the ground
    Armed,
    /// Airborne and accepting velocity setpoints
    Flying,
    /// Land command issued, waiting for touchdown
    Landing,
    /// Terminal state, motors disarmed
    Disarmed,
    /// Emergency raised, landing in progress
    Emergency,
}

impl FlightState {
    /// Whether the vehicle may be in the air
    pub fn is_airborne(self) -> bool {
        matches!(self, FlightState::Flying | FlightState::Landing | FlightState::Emergency)
    }
}

/// Transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    /// Start waiting for the flow deck
    AwaitSensor,
    /// Flow deck confirmed attached
    SensorConfirmed,
    /// Flow deck confirmation did not come in time
    SensorTimeout,
    /// Combined take-off/land key
    ToggleMotors,
    /// Explicit take-off
    TakeOff,
    /// Explicit land
    Land,
    /// The take-off command could not be delivered
    TakeOffFailed,
    /// The land command completed (or its bound elapsed)
    LandingComplete,
    /// Emergency stop from any source
    Emergency,
    /// Disarm a vehicle that is not airborne
    Disarm,
}

impl Request {
    fn reason(self) -> &'static str {
        match self {
            Request::AwaitSensor => "waiting for flow deck",
            Request::SensorConfirmed => "flow deck attached",
            Request::SensorTimeout => "no flow deck detected, startup aborted",
            Request::ToggleMotors => "motors toggled",
            Request::TakeOff => "take-off requested",
            Request::Land => "landing requested",
            Request::TakeOffFailed => "take-off command failed",
            Request::LandingComplete => "landing complete",
            Request::Emergency => "emergency stop",
            Request::Disarm => "disarm requested",
        }
    }
}

/// Command the caller of a transition must send to the flight sink, exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Arm the motors
    Arm,
    /// Take off to the configured height
    TakeOff,
    /// Land and wait for touchdown
    Land,
    /// Disarm the motors
    Disarm,
}

/// An applied transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// State before the transition
    pub from: FlightState,
    /// State after the transition
    pub to: FlightState,
    /// Request that caused it
    pub request: Request,
    /// Side effect owed to the flight sink
    pub command: Option<Command>,
    /// Operator readable description
    pub reason: &'static str,
}

/// Pure transition function
///
/// Returns the next state and the command to issue, or [Error::InvalidTransition] if `from` does not accept
/// `request`.
pub fn transition(from: FlightState, request: Request) -> Result<(FlightState, Option<Command>)> {
    use FlightState::*;

    let next = match (from, request) {
        (Idle, Request::AwaitSensor) => (WaitingForSensor, None),
        (WaitingForSensor, Request::SensorConfirmed) => (Armed, Some(Command::Arm)),
        (WaitingForSensor, Request::SensorTimeout) => (Disarmed, None),

        (Armed, Request::ToggleMotors) | (Armed, Request::TakeOff) => (Flying, Some(Command::TakeOff)),
        (Flying, Request::ToggleMotors) | (Flying, Request::Land) => (Landing, Some(Command::Land)),
        (Flying, Request::TakeOffFailed) => (Armed, None),
        (Landing, Request::LandingComplete) => (Disarmed, Some(Command::Disarm)),

        (Idle, Request::Disarm) | (WaitingForSensor, Request::Disarm) => (Disarmed, None),
        (Armed, Request::Disarm) => (Disarmed, Some(Command::Disarm)),

        // A landing already in progress is not issued a second time
        (Flying, Request::Emergency) => (Emergency, Some(Command::Land)),
        (Disarmed, Request::Emergency) | (Emergency, Request::Emergency) => {
            return Err(Error::InvalidTransition { from, request })
        }
        (_, Request::Emergency) => (Emergency, None),
        (Emergency, Request::LandingComplete) | (Emergency, Request::Disarm) => {
            (Disarmed, Some(Command::Disarm))
        }

        _ => return Err(Error::InvalidTransition { from, request }),
    };

    Ok(next)
}

/// # Arming state machine
///
/// Single owner of the [FlightState]. Shared between tasks behind an `Arc`, all methods take `&self`.
pub struct ArmingStateMachine {
    state: Mutex<FlightState>,
    notifier: Sender<StateChange>,
    // Keeps the notification channel open while nobody is subscribed
    inactive: InactiveReceiver<StateChange>,
}

impl Default for ArmingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ArmingStateMachine {
    /// New machine in [FlightState::Idle]
    pub fn new() -> Self {
        let (mut notifier, receiver): (Sender<StateChange>, Receiver<StateChange>) =
            broadcast(NOTIFICATION_CAPACITY);
        notifier.set_overflow(true);

        Self {
            state: Mutex::new(FlightState::Idle),
            notifier,
            inactive: receiver.deactivate(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlightState> {
        // The state is a plain enum, a panic elsewhere cannot leave it half written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state
    pub fn state(&self) -> FlightState {
        *self.lock()
    }

    /// Apply a request
    ///
    /// Returns the applied [StateChange], whose `command` the caller must forward to the flight sink, or `None` if
    /// the request was ignored.
    pub fn request(&self, request: Request) -> Option<StateChange> {
        let mut state = self.lock();
        let from = *state;

        match transition(from, request) {
            Ok((to, command)) => {
                *state = to;
                let change = StateChange {
                    from,
                    to,
                    request,
                    command,
                    reason: request.reason(),
                };
                info!("{:?} -> {:?}: {}", from, to, change.reason);
                // Nobody listening, or a lagging listener losing its oldest entry, is fine
                let _ = self.notifier.try_broadcast(change.clone());
                Some(change)
            }
            Err(e) => {
                debug!("Ignored transition request: {}", e);
                None
            }
        }
    }

    /// Subscribe to applied transitions
    pub fn subscribe(&self) -> Receiver<StateChange> {
        self.inactive.activate_cloned()
    }
}
