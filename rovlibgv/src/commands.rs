//! Command frame definitions for Rover
//!
//! Commands are sent from ground to vehicle as exactly 8 ASCII bytes:
//!
//! | bytes | field              | alphabet                 |
//! |-------|--------------------|--------------------------|
//! | 0     | steer direction    | `c`, `l`, `r`            |
//! | 1     | throttle direction | `s`, `f`, `r`            |
//! | 2-4   | steer magnitude    | zero-padded decimal      |
//! | 5-7   | throttle magnitude | zero-padded decimal      |
//!
//! Closing the connection is the implicit hard-stop command; it has no frame.

use std::fmt;

use log::debug;

use crate::error::{RovError, RovResult};
use crate::protocol::{
    encode_decimal_field, parse_decimal_field, COMMAND_FRAME_LEN, MAGNITUDE_FIELD_LEN,
    MAX_COMMAND_MAGNITUDE, MAX_WIRE_MAGNITUDE,
};
use crate::types::{ActuationTarget, SteerDirection, ThrottleDirection};

const STEER_DIR_POS: usize = 0;
const THROTTLE_DIR_POS: usize = 1;
const STEER_MAG_POS: usize = 2;
const THROTTLE_MAG_POS: usize = STEER_MAG_POS + MAGNITUDE_FIELD_LEN;

/// One command frame as it appears on the wire
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame(pub [u8; COMMAND_FRAME_LEN]);

impl CommandFrame {
    /// Encode a target. Magnitudes that need more than three digits are rejected.
    pub fn encode(target: &ActuationTarget) -> RovResult<Self> {
        let mut bytes = [0u8; COMMAND_FRAME_LEN];
        bytes[STEER_DIR_POS] = target.steer_direction.to_symbol();
        bytes[THROTTLE_DIR_POS] = target.throttle_direction.to_symbol();
        bytes[STEER_MAG_POS..THROTTLE_MAG_POS]
            .copy_from_slice(&encode_magnitude(target.steer_magnitude, "steer")?);
        bytes[THROTTLE_MAG_POS..].copy_from_slice(&encode_magnitude(target.throttle_magnitude, "throttle")?);
        Ok(Self(bytes))
    }

    /// Decode a frame into a target.
    ///
    /// Each direction byte is matched only against the alphabet of its own
    /// position. Magnitudes above the operator range are clamped.
    pub fn decode(&self) -> RovResult<ActuationTarget> {
        let bytes = &self.0;

        let steer_direction = SteerDirection::from_symbol(bytes[STEER_DIR_POS]).ok_or_else(|| {
            RovError::protocol(format!("unknown steer direction 0x{:02x}", bytes[STEER_DIR_POS]))
        })?;
        let throttle_direction = ThrottleDirection::from_symbol(bytes[THROTTLE_DIR_POS]).ok_or_else(|| {
            RovError::protocol(format!(
                "unknown throttle direction 0x{:02x}",
                bytes[THROTTLE_DIR_POS]
            ))
        })?;

        let steer_magnitude = decode_magnitude(&bytes[STEER_MAG_POS..THROTTLE_MAG_POS], "steer")?;
        let throttle_magnitude = decode_magnitude(&bytes[THROTTLE_MAG_POS..], "throttle")?;

        Ok(ActuationTarget::new(
            steer_direction,
            steer_magnitude,
            throttle_direction,
            throttle_magnitude,
        ))
    }

    pub fn as_bytes(&self) -> &[u8; COMMAND_FRAME_LEN] {
        &self.0
    }
}

impl From<[u8; COMMAND_FRAME_LEN]> for CommandFrame {
    fn from(bytes: [u8; COMMAND_FRAME_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame({:?})", String::from_utf8_lossy(&self.0))
    }
}

fn encode_magnitude(value: u16, field: &str) -> RovResult<Vec<u8>> {
    if value > MAX_WIRE_MAGNITUDE {
        return Err(RovError::validation(format!(
            "{} magnitude {} does not fit the command frame",
            field, value
        )));
    }
    encode_decimal_field(usize::from(value), MAGNITUDE_FIELD_LEN)
}

fn decode_magnitude(digits: &[u8], field: &str) -> RovResult<u16> {
    let raw = parse_decimal_field(digits)? as u16;
    if raw > MAX_COMMAND_MAGNITUDE {
        debug!("clamping {} magnitude {} to {}", field, raw, MAX_COMMAND_MAGNITUDE);
        return Ok(MAX_COMMAND_MAGNITUDE);
    }
    Ok(raw)
}
