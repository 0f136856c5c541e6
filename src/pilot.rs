//! # Pilot
//!
//! Top-level object of a flight. [Pilot::start] validates the configuration, waits for the flow deck, arms and spawns
//! the control loop. Input listeners are then given the [ControlHandle] from [Pilot::handle], and the host either
//! waits for the flight to end or asks for a shutdown.
//!
//! ``` no_run
//! # async fn fly(connection: crazyflie_link::Connection) -> flowdeck_pilot::Result<()> {
//! use std::sync::Arc;
//! use flowdeck_pilot::link::{param::confirm_flow_deck, CrazyflieLink};
//! use flowdeck_pilot::sink::crtp::CrtpConfig;
//! use flowdeck_pilot::supervisor::sensor_channel;
//! use flowdeck_pilot::{Pilot, PilotConfig};
//!
//! let mut link = CrazyflieLink::connect(connection);
//! let (sensor, monitor) = sensor_channel();
//! confirm_flow_deck(&link.param().await?, &sensor).await?;
//!
//! let commander = link.commander(CrtpConfig::default());
//! let pilot = Pilot::start(PilotConfig::default(), Arc::new(commander), monitor).await?;
//! // Hand pilot.handle() to the input listeners here
//! let exit = pilot
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! println!("Flight ended: {:?}", exit);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use log::info;
use tokio::task::JoinHandle;

use crate::config::PilotConfig;
use crate::control::context::{ControlContext, ControlHandle, Signals};
use crate::control::control_loop::{ControlLoop, LoopExit};
use crate::control::state::ArmingStateMachine;
use crate::control::vehicle::Vehicle;
use crate::sink::FlightCommander;
use crate::supervisor::{SafetySupervisor, SensorMonitor};
use crate::{Error, Result};

/// A running flight
pub struct Pilot {
    handle: ControlHandle,
    control_loop: JoinHandle<Result<LoopExit>>,
}

impl Pilot {
    /// Wait for the flow deck, arm, and start the control loop
    ///
    /// Fails with [Error::SensorTimeout] if the deck is not confirmed in time, in which case nothing was sent to
    /// `sink`.
    pub async fn start(
        config: PilotConfig,
        sink: Arc<dyn FlightCommander>,
        sensor: SensorMonitor,
    ) -> Result<Self> {
        config.validate()?;

        let machine = Arc::new(ArmingStateMachine::new());
        let signals = Arc::new(Signals::default());
        let (context, handle) = ControlContext::new(&config, machine.clone(), signals.clone());
        let mut vehicle = Vehicle::new(machine, sink, config.command_timeout(), config.land_timeout());
        let mut supervisor = SafetySupervisor::new(&config, signals, sensor);

        supervisor.startup(&mut vehicle).await?;
        info!("Armed, press take-off to fly");

        let control_loop = tokio::spawn(ControlLoop::new(&config, context, vehicle, supervisor).run());
        Ok(Self { handle, control_loop })
    }

    /// Handle for the input listeners
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Wait for the flight to end on its own
    pub async fn wait(self) -> Result<LoopExit> {
        Self::joined(self.control_loop.await)
    }

    /// Land if needed and stop the control loop
    pub async fn shutdown(self) -> Result<LoopExit> {
        self.handle.request_stop();
        self.wait().await
    }

    /// Wait for the flight to end, or shut down as soon as `termination` completes
    pub async fn run_until<F>(mut self, termination: F) -> Result<LoopExit>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            finished = &mut self.control_loop => return Self::joined(finished),
            _ = termination => info!("Termination requested"),
        }
        self.shutdown().await
    }

    fn joined(finished: std::result::Result<Result<LoopExit>, tokio::task::JoinError>) -> Result<LoopExit> {
        finished.map_err(|e| Error::CommandFailure(format!("control loop: {}", e)))?
    }
}
