//! Rover Ground Software Library (rovlib)
//!
//! This library provides the operator-side connections to the vehicle: a
//! command connection that streams actuation targets and a telemetry
//! connection that receives sensor snapshots.

pub mod client;
pub mod connection;

pub use client::*;
pub use connection::*;
pub use rovlibgv::*;
