//! Telemetry sources
//!
//! Sensor acquisition itself lives outside this crate; a source only has to
//! hand back a snapshot each time it is polled.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rovlibgv::{RovResult, TelemetrySnapshot, TelemetrySourceKind};

pub const TEMPERATURE: &str = "Temperature [*C]";
pub const HUMIDITY: &str = "Humidity [%]";
pub const PRESSURE: &str = "Pressure [hPa]";
pub const UV_INDEX: &str = "UV Index";
pub const AMBIENT_LIGHT: &str = "Ambient Light [lux]";
pub const BATTERY: &str = "Battery [%]";

/// Produces a telemetry snapshot on demand
pub trait TelemetrySource: Send {
    fn poll(&mut self) -> RovResult<TelemetrySnapshot>;
}

/// Environmental readings that wander slowly around plausible values
pub struct SimulatedSensors {
    rng: StdRng,
    temperature: f64,
    humidity: f64,
    pressure: f64,
    light: f64,
    battery: f64,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible readings
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            temperature: 21.0,
            humidity: 45.0,
            pressure: 1013.25,
            light: 300.0,
            battery: 100.0,
        }
    }

    fn wander(&mut self, value: f64, step: f64, min: f64, max: f64) -> f64 {
        (value + self.rng.gen_range(-step..=step)).clamp(min, max)
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl TelemetrySource for SimulatedSensors {
    fn poll(&mut self) -> RovResult<TelemetrySnapshot> {
        self.temperature = self.wander(self.temperature, 0.05, -20.0, 60.0);
        self.humidity = self.wander(self.humidity, 0.2, 0.0, 100.0);
        self.pressure = self.wander(self.pressure, 0.1, 900.0, 1100.0);
        self.light = self.wander(self.light, 5.0, 0.0, 100_000.0);
        self.battery = (self.battery - self.rng.gen_range(0.0..0.01)).max(0.0);

        let uv_index = round2(self.light / 1000.0);

        // The battery gauge reports text
        let snapshot = TelemetrySnapshot::new()
            .with(TEMPERATURE, round2(self.temperature))
            .with(HUMIDITY, round2(self.humidity))
            .with(PRESSURE, round2(self.pressure))
            .with(UV_INDEX, uv_index)
            .with(AMBIENT_LIGHT, self.light.round())
            .with(BATTERY, format!("{:.0}", self.battery));

        Ok(snapshot)
    }
}

/// Returns the same snapshot on every poll
pub struct StaticSource {
    snapshot: TelemetrySnapshot,
}

impl StaticSource {
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        Self { snapshot }
    }
}

impl TelemetrySource for StaticSource {
    fn poll(&mut self) -> RovResult<TelemetrySnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Create the configured source
pub fn create_source(kind: TelemetrySourceKind) -> Box<dyn TelemetrySource> {
    match kind {
        TelemetrySourceKind::Simulated => Box::new(SimulatedSensors::new()),
    }
}
