//! Vehicle lifecycle
//!
//! Wires the three roles together and runs each on its own thread:
//!
//! - command channel: operator frames into the mailbox
//! - actuation loop: mailbox to the actuator at a fixed rate
//! - telemetry channel: sensor snapshots to the operator
//!
//! The roles share one cancellation token. A role that fails cancels it, so
//! the vehicle comes down as a whole and the actuation loop leaves the
//! hardware stopped.

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use log::{error, info};
use rovlibgv::{Actuation, ChannelStatistics, LoopStatistics, RovError, RovResult, VehicleConfig};

use crate::actuation::ActuationLoop;
use crate::actuator::{create_actuator, ActuatorSink};
use crate::cancel::CancelToken;
use crate::command_channel::CommandChannel;
use crate::mailbox::mailbox;
use crate::sensors::{create_source, TelemetrySource};
use crate::telemetry_channel::TelemetryChannel;

/// Statistics from a completed run
#[derive(Debug, Clone, Copy)]
pub struct VehicleReport {
    pub command: ChannelStatistics,
    pub telemetry: ChannelStatistics,
    pub actuation: LoopStatistics,
}

/// A bound but not yet running vehicle
pub struct Vehicle {
    command: CommandChannel,
    telemetry: TelemetryChannel,
    actuation: ActuationLoop,
}

impl Vehicle {
    /// Open the configured actuator and telemetry source and bind both channels
    pub fn bind(config: VehicleConfig) -> RovResult<Self> {
        let sink = create_actuator(&config.actuator.endpoint)?;
        let source = create_source(config.telemetry.source);
        Self::with_parts(config, sink, source)
    }

    /// Bind both channels around an already opened actuator and source
    pub fn with_parts(
        config: VehicleConfig,
        sink: Box<dyn ActuatorSink>,
        source: Box<dyn TelemetrySource>,
    ) -> RovResult<Self> {
        // Nothing moves until an operator says so
        let (writer, reader) = mailbox(Actuation::HardStop);

        let actuation = ActuationLoop::new(&config.actuator, sink, reader);
        let command = CommandChannel::bind(config.command, writer)?;
        let telemetry = TelemetryChannel::bind(config.telemetry, source)?;

        Ok(Self {
            command,
            telemetry,
            actuation,
        })
    }

    pub fn command_addr(&self) -> RovResult<SocketAddr> {
        self.command.local_addr()
    }

    pub fn telemetry_addr(&self) -> RovResult<SocketAddr> {
        self.telemetry.local_addr()
    }

    /// Run every role until `token` is cancelled or one of them fails.
    ///
    /// Returns the first role error, if any, after all threads have exited.
    pub fn run(self, token: &CancelToken) -> RovResult<VehicleReport> {
        let Vehicle {
            mut command,
            mut telemetry,
            actuation,
        } = self;

        let actuation_handle = spawn_role("actuation", token, move |t| actuation.run(t))?;

        let command_handle = match spawn_role("command", token, move |t| {
            command.run(t).map(|_| command.statistics())
        }) {
            Ok(handle) => handle,
            Err(e) => {
                token.cancel();
                join_role("actuation", actuation_handle).ok();
                return Err(e);
            }
        };

        let telemetry_handle = match spawn_role("telemetry", token, move |t| {
            telemetry.run(t).map(|_| telemetry.statistics())
        }) {
            Ok(handle) => handle,
            Err(e) => {
                token.cancel();
                join_role("command", command_handle).ok();
                join_role("actuation", actuation_handle).ok();
                return Err(e);
            }
        };

        info!("Vehicle running");

        // Join everything before reporting so the actuator is always released
        let command = join_role("command", command_handle);
        let telemetry = join_role("telemetry", telemetry_handle);
        let actuation = join_role("actuation", actuation_handle);

        let report = VehicleReport {
            command: command?,
            telemetry: telemetry?,
            actuation: actuation?,
        };
        info!("Vehicle stopped");
        Ok(report)
    }
}

fn spawn_role<T, F>(name: &str, token: &CancelToken, role: F) -> RovResult<JoinHandle<RovResult<T>>>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> RovResult<T> + Send + 'static,
{
    let token = token.clone();
    let role_name = name.to_string();

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = role(&token);
            if let Err(e) = &result {
                error!("{} failed: {}", role_name, e);
                token.cancel();
            }
            result
        })
        .map_err(|e| RovError::Thread(format!("cannot start {} thread: {}", name, e)))
}

fn join_role<T>(name: &str, handle: JoinHandle<RovResult<T>>) -> RovResult<T> {
    handle
        .join()
        .map_err(|_| RovError::Thread(format!("{} thread panicked", name)))?
}
