//! # Safety supervisor
//!
//! The supervisor gates the first arm on the flow deck presence, and owns the two ways a flight can end early:
//!  - the emergency stop, raised from any input listener or by the control loop after repeated sink failures,
//!  - the shutdown requested by the operator or the host application.
//!
//! ## Flow deck confirmation
//!
//! The link side reports the deck presence through a [SensorLink], once per connection:
//! ``` no_run
//! # async fn connected(deck_present: bool) {
//! let (link, monitor) = flowdeck_pilot::supervisor::sensor_channel();
//!
//! // From the link callback
//! link.confirm_sensor(deck_present);
//!
//! // On reconnect, the previous confirmation no longer holds
//! link.reset();
//! # }
//! ```
//! The [SensorMonitor] is handed to [Pilot::start](crate::Pilot::start), which waits for `attached = true` before
//! arming. A report of `attached = false` is logged and the wait goes on until the sensor timeout.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use flume::{Receiver, Sender};
use log::{error, info, warn};
use tokio::time::{timeout_at, Instant};

use crate::config::PilotConfig;
use crate::control::context::Signals;
use crate::control::state::{FlightState, Request};
use crate::control::vehicle::Vehicle;
use crate::{Error, Result};

/// Last flow deck report
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SensorStatus {
    /// The deck was reported attached
    pub attached: bool,
    /// When the deck was last confirmed attached
    pub confirmed_at: Option<std::time::Instant>,
}

/// Create the flow deck confirmation channel
pub fn sensor_channel() -> (SensorLink, SensorMonitor) {
    let (tx, rx) = flume::unbounded();
    let status = Arc::new(Mutex::new(SensorStatus::default()));

    let link = SensorLink {
        confirmations: tx,
        status: status.clone(),
    };
    let monitor = SensorMonitor {
        confirmations: rx,
        status,
    };
    (link, monitor)
}

fn lock(status: &Mutex<SensorStatus>) -> MutexGuard<'_, SensorStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reporting side of the flow deck confirmation, held by the link wiring
#[derive(Debug, Clone)]
pub struct SensorLink {
    confirmations: Sender<bool>,
    status: Arc<Mutex<SensorStatus>>,
}

impl SensorLink {
    /// Report the flow deck presence
    pub fn confirm_sensor(&self, attached: bool) {
        {
            let mut status = lock(&self.status);
            status.attached = attached;
            status.confirmed_at = if attached { Some(std::time::Instant::now()) } else { None };
        }
        // The supervisor is gone once startup is over, later reports only update the status
        let _ = self.confirmations.send(attached);
    }

    /// Last reported status
    pub fn status(&self) -> SensorStatus {
        *lock(&self.status)
    }

    /// Forget the last report, to be called on reconnect
    pub fn reset(&self) {
        *lock(&self.status) = SensorStatus::default();
    }
}

/// Receiving side of the flow deck confirmation, consumed by the supervisor
#[derive(Debug)]
pub struct SensorMonitor {
    confirmations: Receiver<bool>,
    status: Arc<Mutex<SensorStatus>>,
}

impl SensorMonitor {
    /// Last reported status
    pub fn status(&self) -> SensorStatus {
        *lock(&self.status)
    }
}

pub(crate) struct SafetySupervisor {
    signals: Arc<Signals>,
    monitor: SensorMonitor,
    sensor_timeout: Duration,
    shutdown_timeout: Duration,
    takeoff_height: f32,
}

impl SafetySupervisor {
    pub(crate) fn new(config: &PilotConfig, signals: Arc<Signals>, monitor: SensorMonitor) -> Self {
        Self {
            signals,
            monitor,
            sensor_timeout: config.sensor_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
            takeoff_height: config.takeoff_height,
        }
    }

    /// Wait for the flow deck and arm
    ///
    /// Nothing is sent to the sink unless the deck is confirmed within the sensor timeout.
    pub(crate) async fn startup(&mut self, vehicle: &mut Vehicle) -> Result<()> {
        vehicle.request(Request::AwaitSensor, self.takeoff_height).await;

        if !self.wait_for_sensor().await {
            vehicle.request(Request::SensorTimeout, self.takeoff_height).await;
            return Err(Error::SensorTimeout);
        }

        if let Err(e) = vehicle.arm().await {
            error!("Could not arm: {}", e);
            vehicle.request(Request::Disarm, self.takeoff_height).await;
            return Err(e);
        }
        Ok(())
    }

    async fn wait_for_sensor(&self) -> bool {
        let deadline = Instant::now() + self.sensor_timeout;
        info!("Waiting for the flow deck ({:?})", self.sensor_timeout);

        loop {
            match timeout_at(deadline, self.monitor.confirmations.recv_async()).await {
                Ok(Ok(true)) => return true,
                Ok(Ok(false)) => warn!("Flow deck not attached, check the deck is mounted"),
                Ok(Err(_)) => {
                    warn!("Flow deck confirmation channel closed");
                    return false;
                }
                Err(_) => {
                    error!("No flow deck detected after {:?}", self.sensor_timeout);
                    return false;
                }
            }
        }
    }

    pub(crate) fn trigger_emergency(&self) {
        self.signals.raise_emergency();
    }

    pub(crate) fn emergency_raised(&self) -> bool {
        self.signals.emergency()
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.signals.stop()
    }

    /// Force the emergency state and bring the vehicle down
    ///
    /// A land is issued only if the vehicle was flying; a land already in progress is awaited instead.
    pub(crate) async fn run_emergency(&mut self, vehicle: &mut Vehicle) -> Result<()> {
        vehicle.request(Request::Emergency, self.takeoff_height).await;
        if vehicle.state() != FlightState::Emergency {
            return Ok(());
        }
        self.finish_landing(vehicle).await
    }

    /// Leave the vehicle on the ground, whatever its state
    pub(crate) async fn run_shutdown(&mut self, vehicle: &mut Vehicle) -> Result<()> {
        match vehicle.state() {
            FlightState::Flying => {
                info!("Shutdown requested while flying, landing");
                vehicle.request(Request::Land, self.takeoff_height).await;
                self.finish_landing(vehicle).await
            }
            FlightState::Landing | FlightState::Emergency => self.finish_landing(vehicle).await,
            FlightState::Idle | FlightState::WaitingForSensor | FlightState::Armed => {
                vehicle.request(Request::Disarm, self.takeoff_height).await;
                Ok(())
            }
            FlightState::Disarmed => Ok(()),
        }
    }

    /// Wait for the land in progress, then record the touchdown
    ///
    /// An emergency raised meanwhile is recorded as a `Landing -> Emergency` change; the land in progress stands.
    async fn finish_landing(&mut self, vehicle: &mut Vehicle) -> Result<()> {
        let landed = vehicle.wait_landing(self.shutdown_timeout).await;
        if self.signals.emergency() && vehicle.state() == FlightState::Landing {
            warn!("Emergency raised while landing, keeping the land in progress");
            vehicle.request(Request::Emergency, self.takeoff_height).await;
        }
        match landed {
            Err(Error::ShutdownTimeout) => {
                // Still possibly airborne, the motors are left to the firmware land
                error!("Landing not confirmed, vehicle left in {:?}", vehicle.state());
                return Err(Error::ShutdownTimeout);
            }
            Err(e) => warn!("Land command reported: {}", e),
            Ok(()) => (),
        }
        vehicle.request(Request::LandingComplete, self.takeoff_height).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_tracks_last_report() {
        let (link, monitor) = sensor_channel();
        assert_eq!(link.status(), SensorStatus::default());

        link.confirm_sensor(true);
        assert!(monitor.status().attached);
        assert!(monitor.status().confirmed_at.is_some());

        link.reset();
        assert_eq!(monitor.status(), SensorStatus::default());
    }

    #[test]
    fn reports_survive_a_dropped_monitor() {
        let (link, monitor) = sensor_channel();
        drop(monitor);
        link.confirm_sensor(false);
        assert!(!link.status().attached);
    }
}
