//! Rover Ground/Vehicle Library (rovlibgv)
//!
//! This library contains definitions shared between the ground portion of the
//! software (rovlib) and the vehicle portion (rover).

pub mod types;
pub mod commands;
pub mod telemetry;
pub mod protocol;
pub mod config;
pub mod error;

pub use types::*;
pub use commands::*;
pub use telemetry::*;
pub use protocol::*;
pub use config::*;
pub use error::*;
