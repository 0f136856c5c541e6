//! # CRTP flight commander
//!
//! [FlightCommander] implementation for the Crazyflie. Commands are encoded as CRTP packets and pushed into an uplink
//! queue; the queue is either consumed by a [CrazyflieLink](crate::link::CrazyflieLink), which forwards it to an open
//! `crazyflie_link::Connection`, or by any other owner of the receiving end.
//!
//! The mapping follows how a motion commander flies a Flow deck equipped Crazyflie:
//!  - arm/disarm use the supervisor arming request,
//!  - take-off and land use the high-level commander, with a duration derived from the climb/descent velocity,
//!  - velocity setpoints are sent as *hover* setpoints: body frame vx/vy, yaw rate and an absolute height above the
//!    ground. The vertical velocity is integrated into that height between setpoints, the height stays between 0
//!    and [MAX_TAKEOFF_HEIGHT], so a land never lasts longer than `MAX_TAKEOFF_HEIGHT / land_velocity`.
//!  - before landing, the low-level setpoints are released with a *notify setpoint stop* so that the high-level
//!    commander is allowed to take over again.
//!
//! ``` no_run
//! # async fn fly(connection: crazyflie_link::Connection) -> flowdeck_pilot::Result<()> {
//! use flowdeck_pilot::link::CrazyflieLink;
//! use flowdeck_pilot::sink::{crtp::CrtpConfig, FlightCommander};
//!
//! let link = CrazyflieLink::connect(connection);
//! let commander = link.commander(CrtpConfig::default());
//! commander.arm().await?;
//! commander.take_off(0.5).await?;
//! commander.land().await?;
//! commander.disarm().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use crazyflie_link::Packet;
use flume::Sender;
use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tokio::time::{sleep, Instant};

use crate::config::MAX_TAKEOFF_HEIGHT;
use crate::control::setpoint::VelocitySetpoint;
use crate::sink::FlightCommander;
use crate::{Error, Result};

/// CRTP ports used by the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CrtpPort {
    /// Parameters
    Param = 2,
    /// Log blocks
    Log = 5,
    /// Generic setpoints and commander meta commands
    GenericSetpoint = 7,
    /// High-level commander (take-off, land)
    HighLevelCommander = 8,
    /// Supervisor (arming)
    Supervisor = 9,
}

// Generic setpoint channels
const GENERIC_SETPOINT_CHANNEL: u8 = 0;
const GENERIC_CMD_CHANNEL: u8 = 1;

// Setpoint type identifiers
const TYPE_HOVER: u8 = 10;
const TYPE_META_COMMAND_NOTIFY_SETPOINT_STOP: u8 = 0;

// High-level commander
const HL_CHANNEL: u8 = 0;
const COMMAND_TAKEOFF_2: u8 = 7;
const COMMAND_LAND_2: u8 = 8;
const ALL_GROUPS: u8 = 0;

// Supervisor
const SUPERVISOR_CH_COMMAND: u8 = 1;
const CMD_ARM_SYSTEM: u8 = 0x01;

/// Longest interval integrated into the hover height, larger gaps are treated as a restart
const MAX_INTEGRATION_STEP: Duration = Duration::from_millis(100);

/// Tuning of the CRTP commander
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrtpConfig {
    /// Climb velocity used to compute the take-off duration (m/s)
    pub takeoff_velocity: f32,
    /// Descent velocity used to compute the landing duration (m/s)
    pub land_velocity: f32,
}

impl Default for CrtpConfig {
    fn default() -> Self {
        Self {
            takeoff_velocity: 0.2,
            land_velocity: 0.2,
        }
    }
}

#[derive(Debug, Default)]
struct HoverTarget {
    height: f32,
    last_update: Option<Instant>,
}

/// # Crazyflie flight commander
///
/// See the [module documentation](crate::sink::crtp) for the command mapping.
#[derive(Debug)]
pub struct CrtpCommander {
    uplink: Sender<Packet>,
    config: CrtpConfig,
    hover: Mutex<HoverTarget>,
}

impl CrtpCommander {
    /// Create a commander pushing packets into `uplink`
    pub fn new(uplink: Sender<Packet>, config: CrtpConfig) -> Self {
        Self {
            uplink,
            config,
            hover: Mutex::new(HoverTarget::default()),
        }
    }

    /// Longest land this commander can issue, from the height ceiling
    pub fn max_land_duration(&self) -> Duration {
        Duration::from_secs_f32(Self::movement_duration(MAX_TAKEOFF_HEIGHT, self.config.land_velocity))
    }

    /// Height the hover setpoints currently hold (m)
    pub fn target_height(&self) -> f32 {
        self.hover_target().height
    }

    fn hover_target(&self) -> std::sync::MutexGuard<'_, HoverTarget> {
        self.hover.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn send(&self, pk: Packet) -> Result<()> {
        self.uplink
            .send_async(pk)
            .await
            .map_err(|_| Error::Disconnected)
    }

    async fn send_arming_request(&self, do_arm: bool) -> Result<()> {
        let pk = Packet::new(
            CrtpPort::Supervisor.into(),
            SUPERVISOR_CH_COMMAND,
            vec![CMD_ARM_SYSTEM, do_arm as u8],
        );
        self.send(pk).await
    }

    async fn send_hl_command(&self, command: u8, height: f32, duration: f32) -> Result<()> {
        let mut payload = Vec::with_capacity(3 + 3 * 4);
        payload.push(command);
        payload.push(ALL_GROUPS);
        payload.extend_from_slice(&height.to_le_bytes());
        payload.extend_from_slice(&0.0f32.to_le_bytes());
        // Keep the current yaw
        payload.push(1);
        payload.extend_from_slice(&duration.to_le_bytes());

        let pk = Packet::new(CrtpPort::HighLevelCommander.into(), HL_CHANNEL, payload);
        self.send(pk).await
    }

    async fn notify_setpoint_stop(&self, remain_valid_milliseconds: u32) -> Result<()> {
        let mut payload = Vec::with_capacity(1 + 4);
        payload.push(TYPE_META_COMMAND_NOTIFY_SETPOINT_STOP);
        payload.extend_from_slice(&remain_valid_milliseconds.to_le_bytes());
        let pk = Packet::new(CrtpPort::GenericSetpoint.into(), GENERIC_CMD_CHANNEL, payload);
        self.send(pk).await
    }

    fn integrate_height(&self, vz: f32) -> f32 {
        let now = Instant::now();
        let mut hover = self.hover_target();
        if let Some(last) = hover.last_update {
            let dt = now.duration_since(last);
            if dt <= MAX_INTEGRATION_STEP {
                hover.height = (hover.height + vz * dt.as_secs_f32()).clamp(0.0, MAX_TAKEOFF_HEIGHT);
            }
        }
        hover.last_update = Some(now);
        hover.height
    }

    fn movement_duration(distance: f32, velocity: f32) -> f32 {
        if velocity > 0.0 {
            distance.abs() / velocity
        } else {
            0.0
        }
    }
}

#[async_trait]
impl FlightCommander for CrtpCommander {
    async fn arm(&self) -> Result<()> {
        self.send_arming_request(true).await
    }

    async fn take_off(&self, height: f32) -> Result<()> {
        let height = height.clamp(0.0, MAX_TAKEOFF_HEIGHT);
        let duration = Self::movement_duration(height, self.config.takeoff_velocity);
        {
            let mut hover = self.hover_target();
            hover.height = height;
            hover.last_update = None;
        }
        debug!("Take-off to {:.2} m over {:.1} s", height, duration);
        self.send_hl_command(COMMAND_TAKEOFF_2, height, duration).await
    }

    async fn set_velocity(&self, setpoint: &VelocitySetpoint) -> Result<()> {
        let height = self.integrate_height(setpoint.vz);

        let mut payload = Vec::with_capacity(1 + 4 * 4);
        payload.push(TYPE_HOVER);
        payload.extend_from_slice(&setpoint.vx.to_le_bytes());
        payload.extend_from_slice(&setpoint.vy.to_le_bytes());
        payload.extend_from_slice(&setpoint.yaw_rate.to_le_bytes());
        payload.extend_from_slice(&height.to_le_bytes());
        let pk = Packet::new(CrtpPort::GenericSetpoint.into(), GENERIC_SETPOINT_CHANNEL, payload);
        self.send(pk).await
    }

    async fn land(&self) -> Result<()> {
        let height = self.target_height();
        let duration = Self::movement_duration(height, self.config.land_velocity);

        self.notify_setpoint_stop(0).await?;
        self.send_hl_command(COMMAND_LAND_2, 0.0, duration).await?;
        debug!("Landing from {:.2} m over {:.1} s", height, duration);

        // The high-level commander does not report touchdown, wait out the descent
        sleep(Duration::from_secs_f32(duration)).await;

        let mut hover = self.hover_target();
        hover.height = 0.0;
        hover.last_update = None;
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        self.send_arming_request(false).await
    }
}
