//! # Setpoint generator
//!
//! Turns the per-tick [ControlIntent] and [SpeedProfile] snapshot into a [VelocitySetpoint] and forwards it to the
//! flight sink while the vehicle is flying.
//!
//! Since every intent axis is in {-1, 0, +1} and is scaled by the profile value, the setpoint can never exceed the
//! profile bound. Failed forwards are counted here: a success resets the count, reaching the configured limit of
//! consecutive failures is reported as [Forwarded::Fatal] and the control loop escalates to an emergency.

use std::time::Duration;

use log::{debug, warn};
use tokio::time::timeout;

use crate::control::intent::ControlIntent;
use crate::control::profile::SpeedProfile;
use crate::control::state::FlightState;
use crate::sink::FlightCommander;
use crate::{Error, Result};

/// Velocity command for one tick
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct VelocitySetpoint {
    /// Forward velocity (m/s, body frame)
    pub vx: f32,
    /// Left velocity (m/s, body frame)
    pub vy: f32,
    /// Upward velocity (m/s)
    pub vz: f32,
    /// Yaw rate (deg/s)
    pub yaw_rate: f32,
    /// Tick that produced this setpoint
    pub tick_id: u64,
}

impl VelocitySetpoint {
    /// All-zero setpoint
    pub fn zero(tick_id: u64) -> Self {
        Self {
            tick_id,
            ..Default::default()
        }
    }

    /// Whether every component is zero
    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.vz == 0.0 && self.yaw_rate == 0.0
    }
}

/// Outcome of one forwarding attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    /// Not flying, nothing sent
    Skipped,
    /// Sent and acknowledged by the sink
    Sent,
    /// Failed, will retry next tick. Holds the consecutive failure count.
    Failed(u32),
    /// Consecutive failure limit reached
    Fatal,
}

/// Setpoint generator and sink failure counter
#[derive(Debug)]
pub struct SetpointGenerator {
    consecutive_failures: u32,
    max_failures: u32,
    command_timeout: Duration,
}

impl SetpointGenerator {
    /// Create a generator escalating after `max_failures` consecutive failed forwards
    pub fn new(max_failures: u32, command_timeout: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            max_failures,
            command_timeout,
        }
    }

    /// Compute the setpoint for a tick
    ///
    /// Anything but [FlightState::Flying] yields the zero setpoint.
    pub fn generate(
        intent: &ControlIntent,
        profile: &SpeedProfile,
        state: FlightState,
        tick_id: u64,
    ) -> VelocitySetpoint {
        if state != FlightState::Flying {
            return VelocitySetpoint::zero(tick_id);
        }

        let linear = profile.linear_speed();
        VelocitySetpoint {
            vx: f32::from(intent.forward_back) * linear,
            vy: f32::from(intent.left_right) * linear,
            vz: f32::from(intent.up_down) * linear,
            yaw_rate: f32::from(intent.yaw) * profile.yaw_rate(),
            tick_id,
        }
    }

    /// Consecutive failures so far
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Account for the result of one sink call
    pub fn record(&mut self, result: Result<()>) -> Forwarded {
        match result {
            Ok(()) => {
                self.consecutive_failures = 0;
                Forwarded::Sent
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Setpoint not delivered ({}/{}): {}",
                    self.consecutive_failures, self.max_failures, e
                );
                if self.consecutive_failures >= self.max_failures {
                    Forwarded::Fatal
                } else {
                    Forwarded::Failed(self.consecutive_failures)
                }
            }
        }
    }

    /// Send a setpoint to the sink, bounded by the command timeout
    pub async fn forward(
        &mut self,
        sink: &dyn FlightCommander,
        state: FlightState,
        setpoint: &VelocitySetpoint,
    ) -> Forwarded {
        if state != FlightState::Flying {
            return Forwarded::Skipped;
        }

        let result = match timeout(self.command_timeout, sink.set_velocity(setpoint)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandFailure(format!(
                "set_velocity timed out after {:?}",
                self.command_timeout
            ))),
        };
        if result.is_ok() && self.consecutive_failures > 0 {
            debug!("Setpoint delivery recovered at tick {}", setpoint.tick_id);
        }
        self.record(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::intent::{AxisKey, HeldKeys};

    #[test]
    fn forward_at_base_speed() {
        let profile = SpeedProfile::default();
        let intent = ControlIntent::single(AxisKey::Forward);
        let setpoint = SetpointGenerator::generate(&intent, &profile, FlightState::Flying, 7);
        assert_eq!(
            setpoint,
            VelocitySetpoint {
                vx: 0.35,
                vy: 0.0,
                vz: 0.0,
                yaw_rate: 0.0,
                tick_id: 7
            }
        );
    }

    #[test]
    fn zero_unless_flying() {
        let profile = SpeedProfile::default();
        let intent = ControlIntent::single(AxisKey::Up);
        for state in [
            FlightState::Idle,
            FlightState::WaitingForSensor,
            FlightState::Armed,
            FlightState::Landing,
            FlightState::Disarmed,
            FlightState::Emergency,
        ]
        .iter()
        {
            assert!(SetpointGenerator::generate(&intent, &profile, *state, 1).is_zero());
        }
    }

    #[test]
    fn every_intent_respects_profile_bounds() {
        let mut profile = SpeedProfile::default();
        profile.increase();
        profile.increase();
        // Every combination of held keys
        for mask in 0u16..256 {
            let mut keys = HeldKeys::default();
            for (bit, key) in AxisKey::ALL.iter().enumerate() {
                keys.set(*key, mask & (1 << bit) != 0);
            }
            let intent = ControlIntent::from_keys(&keys);
            let sp = SetpointGenerator::generate(&intent, &profile, FlightState::Flying, 0);
            assert!(sp.vx.abs() <= profile.linear_speed());
            assert!(sp.vy.abs() <= profile.linear_speed());
            assert!(sp.vz.abs() <= profile.linear_speed());
            assert!(sp.yaw_rate.abs() <= profile.yaw_rate());
        }
    }

    #[test]
    fn yaw_uses_yaw_rate() {
        let profile = SpeedProfile::default();
        let intent = ControlIntent::single(AxisKey::YawLeft);
        let sp = SetpointGenerator::generate(&intent, &profile, FlightState::Flying, 0);
        assert_eq!(sp.yaw_rate, -500.0);
        assert_eq!(sp.vx, 0.0);
    }

    #[test]
    fn failures_escalate_at_limit_and_reset_on_success() {
        let mut generator = SetpointGenerator::new(3, Duration::from_millis(5));
        let fail = || Err(Error::CommandFailure("radio".to_owned()));

        assert_eq!(generator.record(fail()), Forwarded::Failed(1));
        assert_eq!(generator.record(fail()), Forwarded::Failed(2));
        assert_eq!(generator.record(Ok(())), Forwarded::Sent);
        assert_eq!(generator.consecutive_failures(), 0);

        assert_eq!(generator.record(fail()), Forwarded::Failed(1));
        assert_eq!(generator.record(fail()), Forwarded::Failed(2));
        assert_eq!(generator.record(fail()), Forwarded::Fatal);
    }
}
