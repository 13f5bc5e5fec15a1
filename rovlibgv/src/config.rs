//! Configuration file types for the vehicle process
//!
//! The JSON file is read into the `*Json` structs, which accept missing
//! fields, and then validated into the typed configuration.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default command channel port
pub const DEFAULT_COMMAND_PORT: u16 = 5000;

/// Default telemetry channel port
pub const DEFAULT_TELEMETRY_PORT: u16 = 6000;

/// Default actuation frequency in Hz
pub const DEFAULT_ACTUATION_HZ: f64 = 60.0;

/// Lowest accepted actuation or command rate in Hz (one cycle per 1000 s)
pub const MIN_ACTUATION_HZ: f64 = 0.001;

/// Default actuator device
pub const DEFAULT_ACTUATOR_PATH: &str = "/dev/ttyS8";

/// Default bound on blocking accept/read calls in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default bound on telemetry sends in milliseconds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2000;

/// What the command channel does with a frame it cannot decode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MalformedFramePolicy {
    /// Publish a hard stop and terminate the receive loop
    #[default]
    FailStop,
    /// Publish a hard stop, drop the connection and keep serving
    SubstituteStop,
}

/// Where rendered actuator packets go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorEndpoint {
    /// Character device such as a serial port
    Device(String),
    /// Log packets instead of writing them
    DryRun,
}

/// Where telemetry snapshots come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySourceKind {
    #[default]
    Simulated,
}

/// Command channel configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CommandChannelConfig {
    pub listen_addr: SocketAddr,
    pub malformed_frame: MalformedFramePolicy,
    pub poll_interval: Duration,
}

/// Telemetry channel configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryChannelConfig {
    pub listen_addr: SocketAddr,
    /// Time between snapshots; `None` sends as fast as snapshots are produced
    pub interval: Option<Duration>,
    pub write_timeout: Duration,
    pub poll_interval: Duration,
    pub source: TelemetrySourceKind,
}

/// Actuation loop configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorConfig {
    pub endpoint: ActuatorEndpoint,
    pub frequency_hz: f64,
    /// Stop after this many cycles; `None` runs until cancelled
    pub max_cycles: Option<u64>,
}

impl ActuatorConfig {
    /// Cycle period for the configured frequency
    ///
    /// Frequencies below `MIN_ACTUATION_HZ`, or not numbers at all, are
    /// treated as `MIN_ACTUATION_HZ`.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz.max(MIN_ACTUATION_HZ))
    }
}

/// Complete vehicle configuration
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleConfig {
    pub command: CommandChannelConfig,
    pub telemetry: TelemetryChannelConfig,
    pub actuator: ActuatorConfig,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        let poll_interval = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);
        Self {
            command: CommandChannelConfig {
                listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_COMMAND_PORT)),
                malformed_frame: MalformedFramePolicy::default(),
                poll_interval,
            },
            telemetry: TelemetryChannelConfig {
                listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_TELEMETRY_PORT)),
                interval: None,
                write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
                poll_interval,
                source: TelemetrySourceKind::default(),
            },
            actuator: ActuatorConfig {
                endpoint: ActuatorEndpoint::Device(DEFAULT_ACTUATOR_PATH.to_string()),
                frequency_hz: DEFAULT_ACTUATION_HZ,
                max_cycles: None,
            },
        }
    }
}

/// Vehicle configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfigJson {
    pub version: String,
    pub description: String,
    pub command: CommandChannelJson,
    pub telemetry: TelemetryChannelJson,
    pub actuator: ActuatorJson,
    pub poll_interval_ms: Option<u64>,
}

/// JSON representation of the command channel config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandChannelJson {
    pub address: String,
    pub port: u16,
    pub malformed_frame: MalformedFramePolicy,
}

impl Default for CommandChannelJson {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_COMMAND_PORT,
            malformed_frame: MalformedFramePolicy::default(),
        }
    }
}

/// JSON representation of the telemetry channel config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryChannelJson {
    pub address: String,
    pub port: u16,
    pub interval_ms: Option<u64>,
    pub write_timeout_ms: u64,
    pub source: TelemetrySourceKind,
}

impl Default for TelemetryChannelJson {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_TELEMETRY_PORT,
            interval_ms: None,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            source: TelemetrySourceKind::default(),
        }
    }
}

/// JSON representation of the actuator config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorJson {
    pub path: String,
    pub dry_run: bool,
    pub frequency_hz: f64,
    pub max_cycles: Option<u64>,
}

impl Default for ActuatorJson {
    fn default() -> Self {
        Self {
            path: DEFAULT_ACTUATOR_PATH.to_string(),
            dry_run: false,
            frequency_hz: DEFAULT_ACTUATION_HZ,
            max_cycles: None,
        }
    }
}

impl VehicleConfigJson {
    pub fn to_vehicle_config(&self) -> Result<VehicleConfig, String> {
        let poll_interval = Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS));
        if poll_interval.is_zero() {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }

        let command = CommandChannelConfig {
            listen_addr: resolve(&self.command.address, self.command.port)?,
            malformed_frame: self.command.malformed_frame,
            poll_interval,
        };

        if self.telemetry.write_timeout_ms == 0 {
            return Err("telemetry write_timeout_ms must be greater than zero".to_string());
        }
        let telemetry = TelemetryChannelConfig {
            listen_addr: resolve(&self.telemetry.address, self.telemetry.port)?,
            interval: self.telemetry.interval_ms.map(Duration::from_millis),
            write_timeout: Duration::from_millis(self.telemetry.write_timeout_ms),
            poll_interval,
            source: self.telemetry.source,
        };

        let frequency_hz = self.actuator.frequency_hz;
        if !frequency_hz.is_finite() || frequency_hz < MIN_ACTUATION_HZ {
            return Err(format!(
                "Invalid actuation frequency: {} (minimum {} Hz)",
                frequency_hz, MIN_ACTUATION_HZ
            ));
        }
        let endpoint = if self.actuator.dry_run {
            ActuatorEndpoint::DryRun
        } else if self.actuator.path.is_empty() {
            return Err("Missing actuator path".to_string());
        } else {
            ActuatorEndpoint::Device(self.actuator.path.clone())
        };
        let actuator = ActuatorConfig {
            endpoint,
            frequency_hz,
            max_cycles: self.actuator.max_cycles,
        };

        Ok(VehicleConfig {
            command,
            telemetry,
            actuator,
        })
    }
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr, String> {
    (address, port)
        .to_socket_addrs()
        .map_err(|e| format!("Invalid address {}:{}: {}", address, port, e))?
        .next()
        .ok_or_else(|| format!("Address {}:{} did not resolve", address, port))
}
