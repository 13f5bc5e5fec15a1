//! Rover - on-board vehicle process
//!
//! The vehicle serves two operator channels and drives the motor controller:
//! commands arrive on one TCP connection, telemetry leaves on another, and a
//! fixed-rate actuation loop turns the latest command into hardware packets.

pub mod actuation;
pub mod actuator;
pub mod cancel;
pub mod command_channel;
pub mod config;
pub mod endpoint;
pub mod mailbox;
pub mod sensors;
pub mod telemetry_channel;
pub mod vehicle;

pub use actuation::*;
pub use actuator::*;
pub use cancel::*;
pub use command_channel::*;
pub use config::*;
pub use endpoint::*;
pub use mailbox::*;
pub use sensors::*;
pub use telemetry_channel::*;
pub use vehicle::*;
