//! # Pilot configuration
//!
//! Every tunable of the controller lives in [PilotConfig]. The defaults match the keyboard controller flown
//! with a Flow deck V2: 10 ms ticks, a 5 s wait for the deck, 0.35 m/s base speed and 500 deg/s yaw rate.
//!
//! The configuration can be loaded from JSON. Missing fields fall back to their default:
//! ```
//! let config = flowdeck_pilot::PilotConfig::from_json(r#"{ "takeoff_height": 0.8 }"#).unwrap();
//! assert_eq!(config.takeoff_height, 0.8);
//! assert_eq!(config.tick_period_ms, 10);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::control::profile::SpeedProfile;
use crate::{Error, Result};

/// Lowest take-off height the flow sensor can hold (meters)
pub const MIN_TAKEOFF_HEIGHT: f32 = 0.2;
/// Highest take-off height before the flow sensor becomes unreliable (meters)
pub const MAX_TAKEOFF_HEIGHT: f32 = 3.0;

/// Speed profile section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Initial linear speed (m/s)
    pub linear_speed: f32,
    /// Initial yaw rate (deg/s)
    pub yaw_rate: f32,
    /// Linear speed increment per speed-up event (m/s)
    pub linear_step: f32,
    /// Yaw rate increment per speed-up event (deg/s)
    pub yaw_step: f32,
    /// Linear speed never drops below this value (m/s)
    pub linear_floor: f32,
    /// Yaw rate never drops below this value (deg/s)
    pub yaw_floor: f32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            linear_speed: 0.35,
            yaw_rate: 500.0,
            linear_step: 0.05,
            yaw_step: 5.0,
            linear_floor: 0.05,
            yaw_floor: 5.0,
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// Control loop period (ms)
    pub tick_period_ms: u64,
    /// Time allowed for the flow deck confirmation (ms)
    pub sensor_timeout_ms: u64,
    /// Time allowed for a single non-landing sink command (ms)
    pub command_timeout_ms: u64,
    /// Consecutive velocity failures tolerated before forcing an emergency
    pub max_command_failures: u32,
    /// Duration of a panel button pulse (ms)
    pub pulse_duration_ms: u64,
    /// Time allowed for a land command to complete (ms)
    ///
    /// A land that outlasts it is reported, never treated as a touchdown. The default covers a CRTP land from
    /// [MAX_TAKEOFF_HEIGHT] at 0.2 m/s.
    pub land_timeout_ms: u64,
    /// Time allowed for the landing performed on shutdown (ms)
    pub shutdown_timeout_ms: u64,
    /// Take-off target height (m)
    pub takeoff_height: f32,
    /// Capacity of the input event queue
    pub event_queue_capacity: usize,
    /// Initial speed profile
    pub profile: ProfileConfig,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 10,
            sensor_timeout_ms: 5_000,
            command_timeout_ms: 5,
            max_command_failures: 3,
            pulse_duration_ms: 500,
            land_timeout_ms: 20_000,
            shutdown_timeout_ms: 20_000,
            takeoff_height: 0.5,
            event_queue_capacity: 64,
            profile: ProfileConfig::default(),
        }
    }
}

impl PilotConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PilotConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the values are usable by the control loop
    pub fn validate(&self) -> Result<()> {
        if self.tick_period_ms == 0 {
            return Err(Error::ConfigError("tick period must be non-zero".to_owned()));
        }
        if self.max_command_failures == 0 {
            return Err(Error::ConfigError("failure limit must be non-zero".to_owned()));
        }
        if self.event_queue_capacity == 0 {
            return Err(Error::ConfigError("event queue needs capacity".to_owned()));
        }
        if self.land_timeout_ms == 0 || self.shutdown_timeout_ms == 0 {
            return Err(Error::ConfigError("land and shutdown bounds must be non-zero".to_owned()));
        }
        if !(MIN_TAKEOFF_HEIGHT..=MAX_TAKEOFF_HEIGHT).contains(&self.takeoff_height) {
            return Err(Error::ConfigError(format!(
                "take-off height {} outside {}..={} m",
                self.takeoff_height, MIN_TAKEOFF_HEIGHT, MAX_TAKEOFF_HEIGHT
            )));
        }
        let p = &self.profile;
        if p.linear_floor <= 0.0 || p.yaw_floor <= 0.0 {
            return Err(Error::ConfigError("profile floors must be positive".to_owned()));
        }
        if p.linear_speed < p.linear_floor || p.yaw_rate < p.yaw_floor {
            return Err(Error::ConfigError("initial speeds below their floor".to_owned()));
        }
        Ok(())
    }

    /// Control loop period
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Flow deck confirmation bound
    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    /// Bound on a single sink command
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Panel pulse length
    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_duration_ms)
    }

    /// Bound on a land command
    pub fn land_timeout(&self) -> Duration {
        Duration::from_millis(self.land_timeout_ms)
    }

    /// Bound on the shutdown landing
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Speed profile built from the `profile` section
    pub fn speed_profile(&self) -> SpeedProfile {
        SpeedProfile::from_config(&self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PilotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_period(), Duration::from_millis(10));
        assert_eq!(config.sensor_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_command_failures, 3);
        // A land from the height ceiling at 0.2 m/s fits in the bound
        assert!(config.land_timeout() > Duration::from_secs_f32(MAX_TAKEOFF_HEIGHT / 0.2));
    }

    #[test]
    fn rejects_zero_land_bound() {
        let err = PilotConfig::from_json(r#"{ "land_timeout_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PilotConfig::from_json(r#"{ "profile": { "linear_speed": 0.5 } }"#).unwrap();
        assert_eq!(config.profile.linear_speed, 0.5);
        assert_eq!(config.profile.yaw_rate, 500.0);
        assert_eq!(config.pulse_duration_ms, 500);
    }

    #[test]
    fn rejects_out_of_range_height() {
        let err = PilotConfig::from_json(r#"{ "takeoff_height": 5.0 }"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn rejects_speed_below_floor() {
        let err = PilotConfig::from_json(r#"{ "profile": { "linear_speed": 0.01 } }"#).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(PilotConfig::from_json("{"), Err(Error::ConfigError(_))));
    }
}
