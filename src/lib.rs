//! # Flow deck pilot
//!
//! This crate flies a Crazyflie equipped with a Flow deck by hand: an operator holds keyboard keys or clicks panel
//! buttons, and a fixed-period control loop turns that intent into velocity setpoints for the vehicle. The link and
//! the flight firmware are reached through the [FlightCommander] trait; [sink::crtp::CrtpCommander] implements it on
//! top of a [crazyflie-link] connection.
//!
//! ## Structure
//!
//! | Module | Role |
//! |--------|------|
//! | [input] | Keyboard and panel front ends, translated to canonical input events |
//! | [control] | Intent, speed profile, arming state machine and setpoint generation |
//! | [supervisor] | Flow deck gating, emergency stop and shutdown sequences |
//! | [sink] | Flight command sink trait and its CRTP implementation |
//! | [link] | Crazyflie connection: uplink and dispatch tasks, flow deck parameter, position log block |
//! | [telemetry] | Position feed and trajectory trail for visualization |
//! | [config] | Tunables, loadable from JSON |
//!
//! ## Usage
//!
//! The basic procedure is:
//!  - Connect to the Crazyflie and create a [FlightCommander] for it, for example with [link::CrazyflieLink]
//!  - Create the flow deck confirmation channel with [supervisor::sensor_channel] and report the deck presence on it,
//!    [link::param::confirm_flow_deck] reads it from the Crazyflie
//!  - Start a [Pilot]: it waits for the deck, arms, and spawns the control loop
//!  - Feed input events through the [ControlHandle] returned by [Pilot::handle], for example with [input::listen]
//!  - Wait for the flight to end, or call [Pilot::shutdown] to land and stop
//!
//! All [ControlHandle] methods take `&self` and the handle is cheap to clone, so any number of input listeners can
//! drive the same flight. An emergency stop from any of them is observed by the control loop within one tick.
//!
//! For example, with the keyboard front end:
//! ``` no_run
//! # async fn fly(
//! #     sink: std::sync::Arc<dyn flowdeck_pilot::FlightCommander>,
//! #     keys: impl futures::Stream<Item = flowdeck_pilot::input::keyboard::KeyEvent> + Unpin + Send + 'static,
//! #     deck_present: bool,
//! # ) -> flowdeck_pilot::Result<()> {
//! use flowdeck_pilot::input::{keyboard::KeyboardSource, listen};
//! use flowdeck_pilot::{Pilot, PilotConfig};
//!
//! let (sensor, monitor) = flowdeck_pilot::supervisor::sensor_channel();
//! sensor.confirm_sensor(deck_present);
//!
//! let pilot = Pilot::start(PilotConfig::default(), sink, monitor).await?;
//! tokio::spawn(listen(KeyboardSource::default(), keys, pilot.handle()));
//!
//! let exit = pilot.wait().await?;
//! println!("Flight ended: {:?}", exit);
//! # Ok(())
//! # }
//! ```
//!
//! [crazyflie-link]: https://crates.io/crates/crazyflie-link

#![warn(missing_docs)]

pub mod config;
pub mod control;
mod error;
pub mod input;
pub mod link;
mod pilot;
pub mod sink;
pub mod supervisor;
pub mod telemetry;

pub use crate::config::PilotConfig;
pub use crate::control::context::{ControlHandle, ControlSnapshot};
pub use crate::control::control_loop::LoopExit;
pub use crate::control::state::{FlightState, StateChange};
pub use crate::error::{Error, Result};
pub use crate::pilot::Pilot;
pub use crate::sink::FlightCommander;
