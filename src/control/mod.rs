//! # Control core
//!
//! Everything that runs inside the fixed-period control loop: operator intent, speed bounds, the arming state
//! machine, setpoint generation and the shared context the input listeners write into.

pub mod context;
pub(crate) mod control_loop;
pub mod intent;
pub mod profile;
pub mod setpoint;
pub mod state;
pub(crate) mod vehicle;
