//! Configuration loading for the vehicle process

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rovlibgv::{RovError, RovResult, VehicleConfig, VehicleConfigJson};

/// Load vehicle configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> RovResult<VehicleConfig> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let raw: VehicleConfigJson = serde_json::from_reader(reader)?;

    raw.to_vehicle_config().map_err(RovError::Config)
}

/// Configuration constants
pub mod constants {
    /// One operator per channel
    pub const LISTEN_BACKLOG: i32 = 1;

    /// Steering bit set in a hard-stop packet to request an active recenter
    pub const RECENTER_MASK: u8 = 0b1000_0000;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlibgv::{ActuatorEndpoint, MalformedFramePolicy};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let config_json = r#"{
            "version": "1.0",
            "description": "Test vehicle",
            "command": {
                "address": "127.0.0.1",
                "port": 5000,
                "malformed_frame": "fail_stop"
            },
            "telemetry": {
                "address": "127.0.0.1",
                "port": 6000,
                "interval_ms": 100
            },
            "actuator": {
                "path": "/dev/ttyS8",
                "frequency_hz": 60
            },
            "poll_interval_ms": 50
        }"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_json.as_bytes()).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.command.listen_addr.port(), 5000);
        assert_eq!(config.command.malformed_frame, MalformedFramePolicy::FailStop);
        assert_eq!(config.command.poll_interval, Duration::from_millis(50));
        assert_eq!(config.telemetry.interval, Some(Duration::from_millis(100)));
        assert_eq!(config.actuator.endpoint, ActuatorEndpoint::Device("/dev/ttyS8".to_string()));
    }

    #[test]
    fn test_load_invalid_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(br#"{ "actuator": { "frequency_hz": -1 } }"#)
            .unwrap();

        assert!(matches!(load_config(temp_file.path()), Err(RovError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(load_config("/nonexistent/rover.json"), Err(RovError::Io(_))));
    }
}
