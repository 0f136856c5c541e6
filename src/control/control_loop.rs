//! # Control loop
//!
//! Fixed-period task driving the vehicle. Each tick:
//!  1. the emergency flag is checked first, before any queued event, then the stop flag,
//!  2. a land running in the background is polled, its completion ends the flight. A land that timed out stops the
//!     loop with [Error::ShutdownTimeout] and leaves the vehicle in `Landing`,
//!  3. queued input events are drained and the motor request of the tick, if any, is applied,
//!  4. the intent and profile snapshot is published and turned into a velocity setpoint,
//!  5. the emergency flag is checked again, then the setpoint is forwarded to the sink.
//!
//! Nothing in a tick waits longer than the command timeout. Ticks missed because of a slow tick are skipped, not
//! replayed in a burst.

use std::time::Duration;

use log::{debug, error, info};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::PilotConfig;
use crate::control::context::ControlContext;
use crate::control::setpoint::{Forwarded, SetpointGenerator};
use crate::control::state::{FlightState, Request};
use crate::control::vehicle::Vehicle;
use crate::supervisor::SafetySupervisor;
use crate::{Error, Result};

/// Why the control loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The vehicle landed and was disarmed
    Landed,
    /// An emergency stop brought the vehicle down
    Emergency,
    /// A shutdown was requested, the vehicle is on the ground
    Shutdown,
}

pub(crate) struct ControlLoop {
    context: ControlContext,
    vehicle: Vehicle,
    supervisor: SafetySupervisor,
    generator: SetpointGenerator,
    tick_period: Duration,
    tick_id: u64,
}

impl ControlLoop {
    pub(crate) fn new(
        config: &PilotConfig,
        context: ControlContext,
        vehicle: Vehicle,
        supervisor: SafetySupervisor,
    ) -> Self {
        Self {
            context,
            vehicle,
            supervisor,
            generator: SetpointGenerator::new(config.max_command_failures, config.command_timeout()),
            tick_period: config.tick_period(),
            tick_id: 0,
        }
    }

    /// Tick until the flight ends
    pub(crate) async fn run(mut self) -> Result<LoopExit> {
        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Control loop started, {:?} period", self.tick_period);

        loop {
            ticker.tick().await;
            if let Some(exit) = self.tick().await? {
                info!("Control loop ended after {} ticks: {:?}", self.tick_id, exit);
                return Ok(exit);
            }
        }
    }

    async fn tick(&mut self) -> Result<Option<LoopExit>> {
        let now = Instant::now();

        if self.supervisor.emergency_raised() {
            return self.emergency().await;
        }
        if self.supervisor.stop_requested() {
            self.supervisor.run_shutdown(&mut self.vehicle).await?;
            return Ok(Some(LoopExit::Shutdown));
        }

        if let Some(landed) = self.vehicle.poll_landing() {
            match landed {
                Err(Error::ShutdownTimeout) => {
                    error!("Landing not confirmed, motors left to the firmware land");
                    return Err(Error::ShutdownTimeout);
                }
                Err(e) => error!("Land command reported: {}", e),
                Ok(()) => (),
            }
            self.vehicle
                .request(Request::LandingComplete, self.context.takeoff_height())
                .await;
        }
        if self.vehicle.state() == FlightState::Disarmed {
            return Ok(Some(LoopExit::Landed));
        }

        let motor_request = self.context.drain(now, self.vehicle.state());
        if self.supervisor.emergency_raised() {
            return self.emergency().await;
        }
        let toggled = motor_request == Some(Request::ToggleMotors);
        if let Some(request) = motor_request {
            self.vehicle.request(request, self.context.takeoff_height()).await;
        }

        let state = self.vehicle.state();
        let snapshot = self.context.publish(now, state, toggled);
        let setpoint = SetpointGenerator::generate(&snapshot.intent, &snapshot.profile, state, self.tick_id);
        self.tick_id += 1;

        if self.supervisor.emergency_raised() {
            return self.emergency().await;
        }
        if self.generator.forward(self.vehicle.sink(), state, &setpoint).await == Forwarded::Fatal {
            error!(
                "{} consecutive setpoint failures, forcing emergency",
                self.generator.consecutive_failures()
            );
            self.supervisor.trigger_emergency();
            return self.emergency().await;
        }

        Ok(None)
    }

    async fn emergency(&mut self) -> Result<Option<LoopExit>> {
        debug!("Emergency observed at tick {}", self.tick_id);
        self.supervisor.run_emergency(&mut self.vehicle).await?;
        Ok(Some(LoopExit::Emergency))
    }
}
