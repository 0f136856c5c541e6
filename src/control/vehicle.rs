//! Applies state machine transitions and sends the resulting command to the flight sink.
//!
//! Land commands can take seconds; they run in their own task and the control loop polls for their completion at
//! every tick instead of waiting on them. A land that outlasts its bound ends with [Error::ShutdownTimeout]: the
//! vehicle may still be descending, so that outcome never counts as a touchdown.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{error, warn};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::control::state::{ArmingStateMachine, Command, FlightState, Request, StateChange};
use crate::sink::FlightCommander;
use crate::{Error, Result};

pub(crate) struct Vehicle {
    machine: Arc<ArmingStateMachine>,
    sink: Arc<dyn FlightCommander>,
    command_timeout: Duration,
    land_timeout: Duration,
    landing: Option<JoinHandle<Result<()>>>,
}

impl Vehicle {
    pub(crate) fn new(
        machine: Arc<ArmingStateMachine>,
        sink: Arc<dyn FlightCommander>,
        command_timeout: Duration,
        land_timeout: Duration,
    ) -> Self {
        Self {
            machine,
            sink,
            command_timeout,
            land_timeout,
            landing: None,
        }
    }

    pub(crate) fn state(&self) -> FlightState {
        self.machine.state()
    }

    pub(crate) fn sink(&self) -> &dyn FlightCommander {
        &*self.sink
    }

    /// Request a transition and carry out its command
    ///
    /// Command failures are logged here. The only one with a consequence on the state is a failed take-off,
    /// which rolls the vehicle back to `Armed`. Returns the applied change.
    pub(crate) async fn request(&mut self, request: Request, takeoff_height: f32) -> Option<StateChange> {
        let change = self.machine.request(request)?;

        match change.command {
            Some(Command::Arm) => {
                if let Err(e) = self.bounded(self.sink.arm()).await {
                    error!("Arming failed: {}", e);
                }
            }
            Some(Command::TakeOff) => {
                if let Err(e) = self.bounded(self.sink.take_off(takeoff_height)).await {
                    error!("Take-off failed: {}", e);
                    self.machine.request(Request::TakeOffFailed);
                }
            }
            Some(Command::Land) => self.start_landing(),
            Some(Command::Disarm) => {
                if let Err(e) = self.bounded(self.sink.disarm()).await {
                    warn!("Disarm failed: {}", e);
                }
            }
            None => (),
        }

        Some(change)
    }

    /// Arm the vehicle, returning the sink error if the command failed
    pub(crate) async fn arm(&mut self) -> Result<()> {
        match self.machine.request(Request::SensorConfirmed) {
            Some(change) if change.command == Some(Command::Arm) => self.bounded(self.sink.arm()).await,
            _ => Err(Error::CommandFailure("vehicle not waiting to be armed".to_owned())),
        }
    }

    async fn bounded<F>(&self, command: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        timeout(self.command_timeout, command).await?
    }

    fn start_landing(&mut self) {
        if self.landing.is_some() {
            warn!("Land already in progress");
            return;
        }
        let sink = self.sink.clone();
        let bound = self.land_timeout;
        self.landing = Some(tokio::spawn(async move {
            match timeout(bound, sink.land()).await {
                Ok(result) => result,
                Err(_) => {
                    error!("Land not completed after {:?}", bound);
                    Err(Error::ShutdownTimeout)
                }
            }
        }));
    }

    /// Result of the land command if it finished since the last call
    pub(crate) fn poll_landing(&mut self) -> Option<Result<()>> {
        let finished = self.landing.as_mut()?.now_or_never()?;
        self.landing = None;
        Some(Self::joined(finished))
    }

    /// Wait for the land command in progress, if any, for at most `bound`
    pub(crate) async fn wait_landing(&mut self, bound: Duration) -> Result<()> {
        let mut landing = match self.landing.take() {
            Some(landing) => landing,
            None => return Ok(()),
        };
        match timeout(bound, &mut landing).await {
            Ok(finished) => Self::joined(finished),
            Err(_) => {
                landing.abort();
                Err(Error::ShutdownTimeout)
            }
        }
    }

    fn joined(finished: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
        finished.map_err(|e| Error::CommandFailure(format!("land task: {}", e)))?
    }
}
