//! Rover main entry point
//!
//! Loads the configuration, binds both channels and runs until interrupted.

use std::env;
use std::process;

use log::{error, info};
use rover_lib::{config::load_config, CancelToken, Vehicle};
use rovlibgv::VehicleConfig;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Config file from the command line, built-in defaults otherwise
    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            match load_config(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Error loading configuration: {}", e);
                    process::exit(1);
                }
            }
        }
        None => {
            info!("No configuration file given, using defaults");
            VehicleConfig::default()
        }
    };

    info!(
        "Command channel {}, telemetry channel {}, actuator {:?} at {} Hz",
        config.command.listen_addr,
        config.telemetry.listen_addr,
        config.actuator.endpoint,
        config.actuator.frequency_hz
    );

    let token = CancelToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        handler_token.cancel();
    }) {
        error!("Error installing signal handler: {}", e);
        process::exit(1);
    }

    let vehicle = match Vehicle::bind(config) {
        Ok(vehicle) => vehicle,
        Err(e) => {
            error!("Error starting vehicle: {}", e);
            process::exit(1);
        }
    };

    match vehicle.run(&token) {
        Ok(report) => {
            info!(
                "Rover shutdown complete: {} commands, {} telemetry frames, {} actuation cycles ({} overruns)",
                report.command.frames_received,
                report.telemetry.frames_sent,
                report.actuation.cycles,
                report.actuation.overruns
            );
        }
        Err(e) => {
            error!("Rover stopped on error: {}", e);
            process::exit(1);
        }
    }
}
