//! # Speed profile
//!
//! Operator tunable bounds for the generated setpoints. The profile fields are private, they only change through
//! the step operations (keyboard `+`/`-`) and the slider setters (web panel), all of which clamp at the configured
//! floor. No ceiling is enforced here: the profile value *is* the bound used by the setpoint generator.

use crate::config::ProfileConfig;

/// Linear speed and yaw rate bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    linear_speed: f32,
    yaw_rate: f32,
    linear_step: f32,
    yaw_step: f32,
    linear_floor: f32,
    yaw_floor: f32,
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self::from_config(&ProfileConfig::default())
    }
}

impl SpeedProfile {
    /// Create a profile, raising the initial speeds to their floor if needed
    pub fn new(
        linear_speed: f32,
        yaw_rate: f32,
        linear_step: f32,
        yaw_step: f32,
        linear_floor: f32,
        yaw_floor: f32,
    ) -> Self {
        Self {
            linear_speed: linear_speed.max(linear_floor),
            yaw_rate: yaw_rate.max(yaw_floor),
            linear_step,
            yaw_step,
            linear_floor,
            yaw_floor,
        }
    }

    pub(crate) fn from_config(config: &ProfileConfig) -> Self {
        Self::new(
            config.linear_speed,
            config.yaw_rate,
            config.linear_step,
            config.yaw_step,
            config.linear_floor,
            config.yaw_floor,
        )
    }

    /// Current linear speed bound (m/s)
    pub fn linear_speed(&self) -> f32 {
        self.linear_speed
    }

    /// Current yaw rate bound (deg/s)
    pub fn yaw_rate(&self) -> f32 {
        self.yaw_rate
    }

    /// Linear speed floor (m/s)
    pub fn linear_floor(&self) -> f32 {
        self.linear_floor
    }

    /// Yaw rate floor (deg/s)
    pub fn yaw_floor(&self) -> f32 {
        self.yaw_floor
    }

    /// One linear step up
    pub fn increase_linear(&mut self) {
        self.linear_speed += self.linear_step;
    }

    /// One linear step down, clamped at the floor
    pub fn decrease_linear(&mut self) {
        self.linear_speed = (self.linear_speed - self.linear_step).max(self.linear_floor);
    }

    /// One yaw step up
    pub fn increase_yaw(&mut self) {
        self.yaw_rate += self.yaw_step;
    }

    /// One yaw step down, clamped at the floor
    pub fn decrease_yaw(&mut self) {
        self.yaw_rate = (self.yaw_rate - self.yaw_step).max(self.yaw_floor);
    }

    /// Speed-up event: both rates move one step up
    pub fn increase(&mut self) {
        self.increase_linear();
        self.increase_yaw();
    }

    /// Speed-down event: both rates move one step down, clamped at their floor
    pub fn decrease(&mut self) {
        self.decrease_linear();
        self.decrease_yaw();
    }

    /// Slider update of the linear speed, clamped at the floor
    pub fn set_linear_speed(&mut self, value: f32) {
        if value.is_finite() {
            self.linear_speed = value.max(self.linear_floor);
        }
    }

    /// Slider update of the yaw rate, clamped at the floor
    pub fn set_yaw_rate(&mut self, value: f32) {
        if value.is_finite() {
            self.yaw_rate = value.max(self.yaw_floor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn increment_then_decrement_round_trips() {
        let mut profile = SpeedProfile::default();
        let start = profile.linear_speed();
        profile.increase_linear();
        assert!(close(profile.linear_speed(), start + 0.05));
        profile.decrease_linear();
        assert!(close(profile.linear_speed(), start));
    }

    #[test]
    fn decrement_clamps_at_floor() {
        let mut profile = SpeedProfile::new(0.07, 7.0, 0.05, 5.0, 0.05, 5.0);
        profile.decrease();
        assert_eq!(profile.linear_speed(), 0.05);
        assert_eq!(profile.yaw_rate(), 5.0);
        profile.decrease();
        assert_eq!(profile.linear_speed(), 0.05);
        assert_eq!(profile.yaw_rate(), 5.0);
    }

    #[test]
    fn speed_events_move_both_rates() {
        let mut profile = SpeedProfile::default();
        profile.increase();
        assert!(close(profile.linear_speed(), 0.40));
        assert!(close(profile.yaw_rate(), 505.0));
    }

    #[test]
    fn no_ceiling_on_increase() {
        let mut profile = SpeedProfile::default();
        for _ in 0..100 {
            profile.increase_linear();
        }
        assert!(profile.linear_speed() > 5.0);
    }

    #[test]
    fn slider_values_respect_floor() {
        let mut profile = SpeedProfile::default();
        profile.set_linear_speed(0.0);
        assert_eq!(profile.linear_speed(), profile.linear_floor());
        profile.set_yaw_rate(90.0);
        assert_eq!(profile.yaw_rate(), 90.0);
        profile.set_yaw_rate(f32::NAN);
        assert_eq!(profile.yaw_rate(), 90.0);
    }

    #[test]
    fn new_raises_initial_values_to_floor() {
        let profile = SpeedProfile::new(0.0, 0.0, 0.05, 5.0, 0.05, 5.0);
        assert_eq!(profile.linear_speed(), 0.05);
        assert_eq!(profile.yaw_rate(), 5.0);
    }
}
