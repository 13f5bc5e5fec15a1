//! Actuator packets and sinks
//!
//! The motor controller takes a 3-byte packet: a direction byte that ORs the
//! steering and throttle bitmasks, then the raw steering and throttle
//! magnitudes.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use rovlibgv::{Actuation, ActuatorEndpoint, RovError, RovResult, SteerDirection, ThrottleDirection};

use crate::config::constants::RECENTER_MASK;

/// One packet for the motor controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwarePacket {
    pub direction: u8,
    pub steer: u8,
    pub throttle: u8,
}

/// Recenter the steering and stop the motor
pub const HARD_STOP_PACKET: HardwarePacket = HardwarePacket {
    direction: RECENTER_MASK,
    steer: 0,
    throttle: 0,
};

fn steer_mask(direction: SteerDirection) -> u8 {
    match direction {
        SteerDirection::Center => 0b0000_0000,
        SteerDirection::Left => 0b0000_1000,
        SteerDirection::Right => 0b0000_0100,
    }
}

fn throttle_mask(direction: ThrottleDirection) -> u8 {
    match direction {
        ThrottleDirection::Stop => 0b0000_0000,
        ThrottleDirection::Forward => 0b0000_0010,
        ThrottleDirection::Reverse => 0b0000_0001,
    }
}

fn magnitude_byte(value: u16, field: &str) -> RovResult<u8> {
    u8::try_from(value).map_err(|_| {
        RovError::validation(format!("{} magnitude {} exceeds the packet range", field, value))
    })
}

impl HardwarePacket {
    /// Render a mailbox value.
    ///
    /// Center and Stop force their magnitude to zero. Magnitudes that do not
    /// fit in a byte are rejected rather than truncated.
    pub fn render(actuation: &Actuation) -> RovResult<Self> {
        let target = match actuation {
            Actuation::HardStop => return Ok(HARD_STOP_PACKET),
            Actuation::Drive(target) => target,
        };

        let steer = match target.steer_direction {
            SteerDirection::Center => 0,
            _ => magnitude_byte(target.steer_magnitude, "steer")?,
        };
        let throttle = match target.throttle_direction {
            ThrottleDirection::Stop => 0,
            _ => magnitude_byte(target.throttle_magnitude, "throttle")?,
        };

        Ok(Self {
            direction: steer_mask(target.steer_direction) | throttle_mask(target.throttle_direction),
            steer,
            throttle,
        })
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.direction, self.steer, self.throttle]
    }

    pub fn is_hard_stop(&self) -> bool {
        *self == HARD_STOP_PACKET
    }
}

/// Hardware interface consuming rendered packets
pub trait ActuatorSink: Send {
    /// Write one packet. Failures are hardware errors.
    fn write(&mut self, packet: &HardwarePacket) -> RovResult<()>;

    /// Release the hardware
    fn close(&mut self) -> RovResult<()> {
        Ok(())
    }
}

/// Motor controller on a serial character device
///
/// Line settings (baud rate and so on) are left to the host, as for any tty.
pub struct SerialActuator {
    path: String,
    device: Option<File>,
}

impl SerialActuator {
    pub fn open(path: &str) -> RovResult<Self> {
        let device = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| RovError::hardware(format!("cannot open actuator {}: {}", path, e)))?;
        info!("Actuator opened on {}", path);

        Ok(Self {
            path: path.to_string(),
            device: Some(device),
        })
    }
}

impl ActuatorSink for SerialActuator {
    fn write(&mut self, packet: &HardwarePacket) -> RovResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| RovError::hardware(format!("actuator {} is closed", self.path)))?;

        device
            .write_all(&packet.to_bytes())
            .and_then(|_| device.flush())
            .map_err(|e| RovError::hardware(format!("write to {} failed: {}", self.path, e)))
    }

    fn close(&mut self) -> RovResult<()> {
        // Every write is flushed, so dropping the handle is enough
        if self.device.take().is_some() {
            info!("Actuator {} released", self.path);
        }
        Ok(())
    }
}

/// Logs packets instead of driving hardware
#[derive(Default)]
pub struct DryRunActuator {
    last: Option<HardwarePacket>,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActuatorSink for DryRunActuator {
    fn write(&mut self, packet: &HardwarePacket) -> RovResult<()> {
        if self.last != Some(*packet) {
            debug!("dry run actuator packet {:02x?}", packet.to_bytes());
            self.last = Some(*packet);
        }
        Ok(())
    }
}

/// Keeps every packet written, for inspection from another handle
#[derive(Clone, Default)]
pub struct RecordingActuator {
    packets: Arc<Mutex<Vec<HardwarePacket>>>,
    closed: Arc<Mutex<bool>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> Vec<HardwarePacket> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<HardwarePacket> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner).last().copied()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActuatorSink for RecordingActuator {
    fn write(&mut self, packet: &HardwarePacket) -> RovResult<()> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner).push(*packet);
        Ok(())
    }

    fn close(&mut self) -> RovResult<()> {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }
}

/// Open the configured actuator
pub fn create_actuator(endpoint: &ActuatorEndpoint) -> RovResult<Box<dyn ActuatorSink>> {
    match endpoint {
        ActuatorEndpoint::Device(path) => Ok(Box::new(SerialActuator::open(path)?)),
        ActuatorEndpoint::DryRun => {
            info!("Actuator in dry run mode");
            Ok(Box::new(DryRunActuator::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rovlibgv::ActuationTarget;
    use std::io::Read;

    fn drive(s: SteerDirection, sm: u16, t: ThrottleDirection, tm: u16) -> Actuation {
        Actuation::Drive(ActuationTarget::new(s, sm, t, tm))
    }

    #[test]
    fn test_render_left_forward() {
        let packet = HardwarePacket::render(&drive(SteerDirection::Left, 50, ThrottleDirection::Forward, 75)).unwrap();
        assert_eq!(packet.to_bytes(), [0b0000_1010, 50, 75]);
    }

    #[test]
    fn test_render_right_reverse() {
        let packet = HardwarePacket::render(&drive(SteerDirection::Right, 5, ThrottleDirection::Reverse, 100)).unwrap();
        assert_eq!(packet.to_bytes(), [0b0000_0101, 5, 100]);
    }

    #[test]
    fn test_render_zeroes_center_and_stop() {
        let packet = HardwarePacket::render(&drive(SteerDirection::Center, 40, ThrottleDirection::Stop, 90)).unwrap();
        assert_eq!(packet.to_bytes(), [0, 0, 0]);
        assert!(!packet.is_hard_stop());
    }

    #[test]
    fn test_render_hard_stop() {
        let packet = HardwarePacket::render(&Actuation::HardStop).unwrap();
        assert_eq!(packet.to_bytes(), [0x80, 0, 0]);
        assert!(packet.is_hard_stop());
    }

    #[test]
    fn test_render_rejects_wide_magnitude() {
        let err = HardwarePacket::render(&drive(SteerDirection::Left, 256, ThrottleDirection::Stop, 0)).unwrap_err();
        assert!(matches!(err, RovError::Validation(_)));

        // 255 still fits
        let packet = HardwarePacket::render(&drive(SteerDirection::Left, 255, ThrottleDirection::Forward, 255)).unwrap();
        assert_eq!(packet.to_bytes(), [0b0000_1010, 255, 255]);

        // ignored magnitude is not validated
        assert!(HardwarePacket::render(&drive(SteerDirection::Center, 999, ThrottleDirection::Stop, 999)).is_ok());
    }

    #[test]
    fn test_serial_actuator_writes_packets() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut actuator = SerialActuator::open(&path).unwrap();
        actuator.write(&HardwarePacket { direction: 0x0a, steer: 1, throttle: 2 }).unwrap();
        actuator.write(&HARD_STOP_PACKET).unwrap();
        actuator.close().unwrap();

        let mut written = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut written).unwrap();
        assert_eq!(written, vec![0x0a, 1, 2, 0x80, 0, 0]);

        assert!(matches!(actuator.write(&HARD_STOP_PACKET), Err(RovError::Hardware(_))));
    }

    #[test]
    fn test_serial_actuator_missing_device() {
        let err = SerialActuator::open("/nonexistent/ttyS99").err().unwrap();
        assert!(matches!(err, RovError::Hardware(_)));
    }
}
