//! # Flight command sink
//!
//! The radio link and the flight firmware are a black box to the controller: they accept arm/disarm, take-off,
//! velocity and land commands through the [FlightCommander] trait and report the flow deck presence back through a
//! [SensorLink](crate::supervisor::SensorLink).
//!
//! [crtp::CrtpCommander] implements the trait for a Crazyflie by encoding the commands as CRTP packets.

use std::sync::Arc;

use async_trait::async_trait;

use crate::control::setpoint::VelocitySetpoint;
use crate::Result;

pub mod crtp;

/// Commands accepted by the vehicle
///
/// Every method reports failure through its [Result]. The control loop bounds the time it waits on each call, so an
/// implementation may block (e.g. `land()` returns once touchdown is expected) but should not hang forever.
#[async_trait]
pub trait FlightCommander: Send + Sync {
    /// Arm the motors
    async fn arm(&self) -> Result<()>;

    /// Take off to `height` meters
    async fn take_off(&self, height: f32) -> Result<()>;

    /// Send one velocity setpoint
    async fn set_velocity(&self, setpoint: &VelocitySetpoint) -> Result<()>;

    /// Land, returning once the vehicle is expected on the ground
    async fn land(&self) -> Result<()>;

    /// Disarm the motors
    async fn disarm(&self) -> Result<()>;
}

#[async_trait]
impl<T: FlightCommander + ?Sized> FlightCommander for Arc<T> {
    async fn arm(&self) -> Result<()> {
        (**self).arm().await
    }

    async fn take_off(&self, height: f32) -> Result<()> {
        (**self).take_off(height).await
    }

    async fn set_velocity(&self, setpoint: &VelocitySetpoint) -> Result<()> {
        (**self).set_velocity(setpoint).await
    }

    async fn land(&self) -> Result<()> {
        (**self).land().await
    }

    async fn disarm(&self) -> Result<()> {
        (**self).disarm().await
    }
}
