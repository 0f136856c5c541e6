//! # Control context
//!
//! All the state shared between the input listeners and the control loop lives behind one object. Listeners only
//! get a [ControlHandle]: they enqueue [InputEvent]s on a bounded queue, raise the emergency and stop flags, and read
//! [ControlSnapshot]s. The [ControlContext] itself is owned by the control loop, which drains the queue once per tick
//! and then publishes one consistent snapshot of the intent and the speed profile.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex, MutexGuard};

use async_broadcast::Receiver;
use flume::{Receiver as EventReceiver, Sender as EventSender};
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::config::{PilotConfig, MAX_TAKEOFF_HEIGHT, MIN_TAKEOFF_HEIGHT};
use crate::control::intent::{AxisKey, ControlIntent, HeldKeys};
use crate::control::profile::SpeedProfile;
use crate::control::state::{ArmingStateMachine, FlightState, Request, StateChange};
use crate::input::{Action, InputEvent, ProfileParam, Pulse};
use crate::Result;

/// Intent and profile as seen by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSnapshot {
    /// Operator intent
    pub intent: ControlIntent,
    /// Speed bounds
    pub profile: SpeedProfile,
    /// Take-off target height (m)
    pub takeoff_height: f32,
}

/// Flags observed by the control loop at every tick
#[derive(Debug, Default)]
pub(crate) struct Signals {
    emergency: AtomicBool,
    stop: AtomicBool,
}

impl Signals {
    pub(crate) fn raise_emergency(&self) {
        self.emergency.store(true, SeqCst);
    }

    pub(crate) fn emergency(&self) -> bool {
        self.emergency.load(SeqCst)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, SeqCst);
    }

    pub(crate) fn stop(&self) -> bool {
        self.stop.load(SeqCst)
    }
}

struct Shared {
    snapshot: Mutex<ControlSnapshot>,
    signals: Arc<Signals>,
}

impl Shared {
    fn snapshot(&self) -> MutexGuard<'_, ControlSnapshot> {
        self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable access to the controller for input listeners and front ends
#[derive(Clone)]
pub struct ControlHandle {
    events: EventSender<InputEvent>,
    shared: Arc<Shared>,
    machine: Arc<ArmingStateMachine>,
}

impl ControlHandle {
    /// Deliver an event, waiting for room in the queue
    ///
    /// [Action::Emergency] skips the queue and raises the emergency flag immediately.
    pub async fn dispatch(&self, event: InputEvent) -> Result<()> {
        if event == InputEvent::Action(Action::Emergency) {
            self.emergency();
            return Ok(());
        }
        self.events.send_async(event).await?;
        Ok(())
    }

    /// Blocking version of [dispatch](Self::dispatch), for listeners running on their own thread
    pub fn dispatch_blocking(&self, event: InputEvent) -> Result<()> {
        if event == InputEvent::Action(Action::Emergency) {
            self.emergency();
            return Ok(());
        }
        self.events.send(event)?;
        Ok(())
    }

    /// Raise the emergency stop, observed by the control loop within one tick
    pub fn emergency(&self) {
        warn!("Emergency stop!");
        self.shared.signals.raise_emergency();
    }

    /// Request a normal shutdown
    pub fn request_stop(&self) {
        self.shared.signals.request_stop();
    }

    /// Whether a shutdown was requested
    pub fn stop_requested(&self) -> bool {
        self.shared.signals.stop()
    }

    /// Whether the emergency stop was raised
    pub fn emergency_raised(&self) -> bool {
        self.shared.signals.emergency()
    }

    /// Whether a shutdown or an emergency halted the controller
    pub fn halted(&self) -> bool {
        self.stop_requested() || self.emergency_raised()
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> ControlSnapshot {
        *self.shared.snapshot()
    }

    /// Current flight state
    pub fn state(&self) -> FlightState {
        self.machine.state()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> Receiver<StateChange> {
        self.machine.subscribe()
    }
}

/// Loop-owned side of the control context
pub struct ControlContext {
    events: EventReceiver<InputEvent>,
    shared: Arc<Shared>,
    keys: HeldKeys,
    pulse: Option<Pulse>,
    profile: SpeedProfile,
    takeoff_height: f32,
    pulse_duration: std::time::Duration,
}

impl ControlContext {
    /// Create the context and the handle given to input listeners
    pub(crate) fn new(
        config: &PilotConfig,
        machine: Arc<ArmingStateMachine>,
        signals: Arc<Signals>,
    ) -> (Self, ControlHandle) {
        let (tx, rx) = flume::bounded(config.event_queue_capacity);
        let profile = config.speed_profile();
        let shared = Arc::new(Shared {
            snapshot: Mutex::new(ControlSnapshot {
                intent: ControlIntent::default(),
                profile,
                takeoff_height: config.takeoff_height,
            }),
            signals,
        });

        let handle = ControlHandle {
            events: tx,
            shared: shared.clone(),
            machine,
        };
        let context = Self {
            events: rx,
            shared,
            keys: HeldKeys::default(),
            pulse: None,
            profile,
            takeoff_height: config.takeoff_height,
            pulse_duration: config.pulse_duration(),
        };
        (context, handle)
    }

    /// Take-off height currently selected
    pub fn takeoff_height(&self) -> f32 {
        self.takeoff_height
    }

    /// Apply every queued event
    ///
    /// Key, parameter and pulse events update the context directly. Motor actions are returned as transition
    /// requests; only the first one of a tick is kept, the others are dropped as duplicates.
    pub fn drain(&mut self, now: Instant, state: FlightState) -> Option<Request> {
        let mut motor_request = None;
        let pending: Vec<InputEvent> = self.events.try_iter().collect();

        for event in pending {
            match event {
                InputEvent::Key { key, held } => self.keys.set(key, held),
                InputEvent::Param { param, value } => self.apply_param(param, value),
                InputEvent::Action(action) => {
                    let request = match action {
                        Action::ToggleMotors => Some(Request::ToggleMotors),
                        Action::TakeOff => Some(Request::TakeOff),
                        Action::Land => Some(Request::Land),
                        Action::Emergency => {
                            self.shared.signals.raise_emergency();
                            None
                        }
                        Action::SpeedUp | Action::SpeedDown => {
                            if action == Action::SpeedUp {
                                self.profile.increase();
                            } else {
                                self.profile.decrease();
                            }
                            info!(
                                "Speed adjusted: {:.2} m/s, turn rate {:.0} deg/s",
                                self.profile.linear_speed(),
                                self.profile.yaw_rate()
                            );
                            None
                        }
                        Action::Pulse(key) => {
                            self.start_pulse(key, now, state);
                            None
                        }
                    };
                    if let Some(request) = request {
                        if motor_request.is_none() {
                            motor_request = Some(request);
                        } else {
                            debug!("Dropped duplicate motor request {:?}", request);
                        }
                    }
                }
            }
        }

        motor_request
    }

    fn apply_param(&mut self, param: ProfileParam, value: f32) {
        match param {
            ProfileParam::LinearSpeed => self.profile.set_linear_speed(value),
            ProfileParam::YawRate => self.profile.set_yaw_rate(value),
            ProfileParam::TakeoffHeight => {
                if value.is_finite() {
                    self.takeoff_height = value.clamp(MIN_TAKEOFF_HEIGHT, MAX_TAKEOFF_HEIGHT);
                }
            }
        }
    }

    fn start_pulse(&mut self, key: AxisKey, now: Instant, state: FlightState) {
        if state != FlightState::Flying {
            debug!("Ignored {:?} pulse while {:?}", key, state);
            return;
        }
        match self.pulse {
            Some(active) if active.is_active(now, state) => {
                debug!("Ignored {:?} pulse, {:?} pulse still active", key, active.key);
            }
            _ => self.pulse = Some(Pulse::start(key, now, self.pulse_duration)),
        }
    }

    /// Compute and publish the snapshot for this tick
    ///
    /// An active pulse overrides the held keys on its own axis only. The pulse is re-evaluated against `now` and `state` here, every
    /// tick, so that it reverts as soon as it elapses or the vehicle stops flying.
    pub fn publish(&mut self, now: Instant, state: FlightState, toggled: bool) -> ControlSnapshot {
        if let Some(pulse) = self.pulse {
            if !pulse.is_active(now, state) {
                self.pulse = None;
            }
        }

        let mut intent = ControlIntent::from_keys(&self.keys);
        if let Some(pulse) = self.pulse {
            intent = intent.holding(pulse.key);
        }
        intent.toggle_motors = toggled;
        intent.emergency = self.shared.signals.emergency();

        let snapshot = ControlSnapshot {
            intent,
            profile: self.profile,
            takeoff_height: self.takeoff_height,
        };
        *self.shared.snapshot() = snapshot;
        snapshot
    }

    /// Whether a pulse currently overrides the keys
    pub fn pulse_active(&self) -> bool {
        self.pulse.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context() -> (ControlContext, ControlHandle) {
        ControlContext::new(
            &PilotConfig::default(),
            Arc::new(ArmingStateMachine::new()),
            Arc::new(Signals::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn keys_fold_into_snapshot() {
        let (mut context, handle) = context();
        let now = Instant::now();
        handle.dispatch(InputEvent::Key { key: AxisKey::Forward, held: true }).await.unwrap();
        handle.dispatch(InputEvent::Key { key: AxisKey::Back, held: true }).await.unwrap();
        handle.dispatch(InputEvent::Key { key: AxisKey::Up, held: true }).await.unwrap();

        assert_eq!(context.drain(now, FlightState::Flying), None);
        let snapshot = context.publish(now, FlightState::Flying, false);
        assert_eq!(snapshot.intent.forward_back, 0);
        assert_eq!(snapshot.intent.up_down, 1);
        assert_eq!(handle.snapshot(), snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn only_first_motor_request_per_tick() {
        let (mut context, handle) = context();
        for _ in 0..3 {
            handle.dispatch(InputEvent::Action(Action::ToggleMotors)).await.unwrap();
        }
        assert_eq!(context.drain(Instant::now(), FlightState::Armed), Some(Request::ToggleMotors));
        assert_eq!(context.drain(Instant::now(), FlightState::Flying), None);
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_skips_the_queue() {
        let (_context, handle) = context();
        handle.dispatch(InputEvent::Action(Action::Emergency)).await.unwrap();
        assert!(handle.emergency_raised());
        assert!(!handle.stop_requested());
        assert!(handle.halted());
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_overrides_then_reverts() {
        let (mut context, handle) = context();
        let start = Instant::now();
        handle.dispatch(InputEvent::Key { key: AxisKey::Left, held: true }).await.unwrap();
        handle.dispatch(InputEvent::Action(Action::Pulse(AxisKey::Forward))).await.unwrap();
        context.drain(start, FlightState::Flying);

        let during = context.publish(start + Duration::from_millis(100), FlightState::Flying, false);
        assert_eq!(during.intent.forward_back, 1);
        assert_eq!(during.intent.left_right, 1);

        let after = context.publish(start + Duration::from_millis(500), FlightState::Flying, false);
        assert_eq!(after.intent.forward_back, 0);
        assert_eq!(after.intent.left_right, 1);
        assert!(!context.pulse_active());
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_replaces_held_key_on_its_axis() {
        let (mut context, handle) = context();
        let start = Instant::now();
        handle.dispatch(InputEvent::Key { key: AxisKey::YawLeft, held: true }).await.unwrap();
        handle.dispatch(InputEvent::Key { key: AxisKey::Up, held: true }).await.unwrap();
        handle.dispatch(InputEvent::Action(Action::Pulse(AxisKey::YawRight))).await.unwrap();
        context.drain(start, FlightState::Flying);

        let snapshot = context.publish(start + Duration::from_millis(10), FlightState::Flying, false);
        assert_eq!(snapshot.intent.yaw, 1);
        assert_eq!(snapshot.intent.up_down, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_emergency_are_told_apart() {
        let (_context, handle) = context();
        handle.request_stop();
        assert!(handle.stop_requested());
        assert!(!handle.emergency_raised());
        assert!(handle.halted());
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_reverts_when_leaving_flying() {
        let (mut context, handle) = context();
        let start = Instant::now();
        handle.dispatch(InputEvent::Action(Action::Pulse(AxisKey::YawLeft))).await.unwrap();
        context.drain(start, FlightState::Flying);
        let snapshot = context.publish(start + Duration::from_millis(10), FlightState::Landing, false);
        assert!(snapshot.intent.is_neutral());
        assert!(!context.pulse_active());
    }

    #[tokio::test(start_paused = true)]
    async fn pulses_do_not_stack_and_need_flight() {
        let (mut context, handle) = context();
        let start = Instant::now();

        handle.dispatch(InputEvent::Action(Action::Pulse(AxisKey::Up))).await.unwrap();
        context.drain(start, FlightState::Armed);
        assert!(!context.pulse_active());

        handle.dispatch(InputEvent::Action(Action::Pulse(AxisKey::Up))).await.unwrap();
        handle.dispatch(InputEvent::Action(Action::Pulse(AxisKey::Down))).await.unwrap();
        context.drain(start, FlightState::Flying);
        let snapshot = context.publish(start + Duration::from_millis(20), FlightState::Flying, false);
        assert_eq!(snapshot.intent.up_down, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sliders_and_speed_steps() {
        let (mut context, handle) = context();
        handle.dispatch(InputEvent::Param { param: ProfileParam::LinearSpeed, value: 0.6 }).await.unwrap();
        handle.dispatch(InputEvent::Action(Action::SpeedDown)).await.unwrap();
        handle.dispatch(InputEvent::Param { param: ProfileParam::TakeoffHeight, value: 9.0 }).await.unwrap();
        context.drain(Instant::now(), FlightState::Armed);

        let snapshot = context.publish(Instant::now(), FlightState::Armed, false);
        assert!((snapshot.profile.linear_speed() - 0.55).abs() < 1e-5);
        assert_eq!(snapshot.takeoff_height, MAX_TAKEOFF_HEIGHT);
    }
}
