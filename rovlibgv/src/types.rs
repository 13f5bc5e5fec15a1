//! Type definitions shared between ground and vehicle software

use serde::{Deserialize, Serialize};

use crate::protocol::MAX_COMMAND_MAGNITUDE;

/// Steering direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SteerDirection {
    Left,
    Center,
    Right,
}

impl SteerDirection {
    pub const ALL: [SteerDirection; 3] = [SteerDirection::Left, SteerDirection::Center, SteerDirection::Right];

    /// Wire symbol in the steer position (byte 0) of a command frame
    pub fn to_symbol(&self) -> u8 {
        match self {
            SteerDirection::Center => b'c',
            SteerDirection::Left => b'l',
            SteerDirection::Right => b'r',
        }
    }

    /// Decode a byte found in the steer position. Only the steer alphabet is
    /// consulted; throttle symbols are not valid here.
    pub fn from_symbol(symbol: u8) -> Option<Self> {
        match symbol {
            b'c' => Some(SteerDirection::Center),
            b'l' => Some(SteerDirection::Left),
            b'r' => Some(SteerDirection::Right),
            _ => None,
        }
    }
}

/// Throttle direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ThrottleDirection {
    Forward,
    Reverse,
    Stop,
}

impl ThrottleDirection {
    pub const ALL: [ThrottleDirection; 3] =
        [ThrottleDirection::Forward, ThrottleDirection::Reverse, ThrottleDirection::Stop];

    /// Wire symbol in the throttle position (byte 1) of a command frame
    pub fn to_symbol(&self) -> u8 {
        match self {
            ThrottleDirection::Stop => b's',
            ThrottleDirection::Forward => b'f',
            ThrottleDirection::Reverse => b'r',
        }
    }

    /// Decode a byte found in the throttle position. `r` here means reverse,
    /// not right.
    pub fn from_symbol(symbol: u8) -> Option<Self> {
        match symbol {
            b's' => Some(ThrottleDirection::Stop),
            b'f' => Some(ThrottleDirection::Forward),
            b'r' => Some(ThrottleDirection::Reverse),
            _ => None,
        }
    }
}

/// Decoded desired steering/throttle state
///
/// Magnitudes are kept as decoded. A Center or Stop direction zeroes its paired
/// magnitude only when the hardware packet is rendered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActuationTarget {
    pub steer_direction: SteerDirection,
    pub steer_magnitude: u16,
    pub throttle_direction: ThrottleDirection,
    pub throttle_magnitude: u16,
}

impl ActuationTarget {
    pub fn new(
        steer_direction: SteerDirection,
        steer_magnitude: u16,
        throttle_direction: ThrottleDirection,
        throttle_magnitude: u16,
    ) -> Self {
        Self {
            steer_direction,
            steer_magnitude,
            throttle_direction,
            throttle_magnitude,
        }
    }

    /// Centered wheels, no throttle. This is an ordinary command, not a hard stop.
    pub fn neutral() -> Self {
        Self::new(SteerDirection::Center, 0, ThrottleDirection::Stop, 0)
    }

    /// Build a target from signed joystick axes.
    ///
    /// Negative steer turns left, negative throttle reverses. Magnitudes are
    /// clamped to the operator range.
    pub fn from_axes(steer: i32, throttle: i32) -> Self {
        let steer_direction = match steer.signum() {
            -1 => SteerDirection::Left,
            1 => SteerDirection::Right,
            _ => SteerDirection::Center,
        };
        let throttle_direction = match throttle.signum() {
            -1 => ThrottleDirection::Reverse,
            1 => ThrottleDirection::Forward,
            _ => ThrottleDirection::Stop,
        };

        Self::new(
            steer_direction,
            clamp_axis(steer),
            throttle_direction,
            clamp_axis(throttle),
        )
    }
}

impl Default for ActuationTarget {
    fn default() -> Self {
        Self::neutral()
    }
}

fn clamp_axis(value: i32) -> u16 {
    value.unsigned_abs().min(u32::from(MAX_COMMAND_MAGNITUDE)) as u16
}

/// Value held in the actuation mailbox
///
/// `HardStop` is the fail-safe issued on disconnect or shutdown. It is kept
/// distinct from a neutral `Drive` target because the hardware recenters the
/// steering actively on a hard stop instead of holding it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Actuation {
    Drive(ActuationTarget),
    HardStop,
}

impl Actuation {
    pub fn is_hard_stop(&self) -> bool {
        matches!(self, Actuation::HardStop)
    }
}

impl Default for Actuation {
    fn default() -> Self {
        Actuation::HardStop
    }
}

impl From<ActuationTarget> for Actuation {
    fn from(target: ActuationTarget) -> Self {
        Actuation::Drive(target)
    }
}

/// Connection state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Listening,
    Connected,
    Closed,
}

/// Per-channel statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelStatistics {
    /// Number of operator connections accepted
    pub connections: u64,
    /// Number of frames received
    pub frames_received: u64,
    /// Number of frames sent
    pub frames_sent: u64,
    /// Number of bytes received
    pub bytes_received: u64,
    /// Number of bytes sent
    pub bytes_sent: u64,
    /// Frames rejected as malformed or oversized
    pub frames_rejected: u64,
}

impl ChannelStatistics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Actuation loop statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopStatistics {
    /// Completed cycles
    pub cycles: u64,
    /// Cycles whose write took longer than the period
    pub overruns: u64,
    /// Targets rejected by validation and replaced with a hard stop
    pub rejected: u64,
    /// Packets accepted by the actuator
    pub hardware_writes: u64,
}

impl LoopStatistics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_positional() {
        // 'r' is legal in both positions with different meanings
        assert_eq!(SteerDirection::from_symbol(b'r'), Some(SteerDirection::Right));
        assert_eq!(ThrottleDirection::from_symbol(b'r'), Some(ThrottleDirection::Reverse));

        assert_eq!(SteerDirection::from_symbol(b'f'), None);
        assert_eq!(SteerDirection::from_symbol(b's'), None);
        assert_eq!(ThrottleDirection::from_symbol(b'l'), None);
        assert_eq!(ThrottleDirection::from_symbol(b'c'), None);
    }

    #[test]
    fn test_symbol_roundtrip() {
        for dir in SteerDirection::ALL {
            assert_eq!(SteerDirection::from_symbol(dir.to_symbol()), Some(dir));
        }
        for dir in ThrottleDirection::ALL {
            assert_eq!(ThrottleDirection::from_symbol(dir.to_symbol()), Some(dir));
        }
    }

    #[test]
    fn test_from_axes() {
        let t = ActuationTarget::from_axes(-30, 75);
        assert_eq!(t, ActuationTarget::new(SteerDirection::Left, 30, ThrottleDirection::Forward, 75));

        let t = ActuationTarget::from_axes(0, -250);
        assert_eq!(t, ActuationTarget::new(SteerDirection::Center, 0, ThrottleDirection::Reverse, 100));

        assert_eq!(ActuationTarget::from_axes(0, 0), ActuationTarget::neutral());
    }

    #[test]
    fn test_hard_stop_is_not_neutral() {
        assert_ne!(Actuation::HardStop, Actuation::Drive(ActuationTarget::neutral()));
        assert!(Actuation::default().is_hard_stop());
    }
}
