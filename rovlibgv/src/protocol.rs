//! Protocol definitions for Rover
//!
//! Both channels use fixed-width or length-prefixed ASCII framing. The receiver
//! always knows how many bytes to read next, so there is no delimiter scanning
//! and no version negotiation: any change to a field width below is a breaking
//! protocol change.

use crate::error::{RovError, RovResult};

/// Length of a command frame in bytes
pub const COMMAND_FRAME_LEN: usize = 8;

/// Width of each magnitude field in a command frame
pub const MAGNITUDE_FIELD_LEN: usize = 3;

/// Largest magnitude accepted from the operator; larger wire values are clamped
pub const MAX_COMMAND_MAGNITUDE: u16 = 100;

/// Largest value the 3-digit magnitude field can carry
pub const MAX_WIRE_MAGNITUDE: u16 = 999;

/// Length of the telemetry frame length header in bytes
pub const TELEMETRY_HEADER_LEN: usize = 5;

/// Largest telemetry payload the 5-digit header can describe
pub const MAX_TELEMETRY_PAYLOAD: usize = 99_999;

/// Format `value` as a zero-padded decimal field of exactly `width` digits.
///
/// Fails if the value needs more digits than the field has.
pub fn encode_decimal_field(value: usize, width: usize) -> RovResult<Vec<u8>> {
    let text = format!("{:0width$}", value, width = width);
    if text.len() != width {
        return Err(RovError::Encoding(format!(
            "value {} does not fit in {} decimal digits",
            value, width
        )));
    }
    Ok(text.into_bytes())
}

/// Parse a zero-padded decimal field. Every byte must be an ASCII digit.
pub fn parse_decimal_field(field: &[u8]) -> RovResult<usize> {
    if field.is_empty() {
        return Err(RovError::protocol("empty decimal field"));
    }

    field.iter().try_fold(0usize, |acc, &b| {
        if b.is_ascii_digit() {
            Ok(acc * 10 + usize::from(b - b'0'))
        } else {
            Err(RovError::protocol(format!(
                "non-digit byte 0x{:02x} in decimal field {:?}",
                b,
                String::from_utf8_lossy(field)
            )))
        }
    })
}

/// Build the 5-byte length header for a telemetry payload of `len` bytes
pub fn encode_length_header(len: usize) -> RovResult<[u8; TELEMETRY_HEADER_LEN]> {
    if len > MAX_TELEMETRY_PAYLOAD {
        return Err(RovError::Encoding(format!(
            "telemetry payload of {} bytes exceeds the {} byte frame limit",
            len, MAX_TELEMETRY_PAYLOAD
        )));
    }

    let digits = encode_decimal_field(len, TELEMETRY_HEADER_LEN)?;
    let mut header = [0u8; TELEMETRY_HEADER_LEN];
    header.copy_from_slice(&digits);
    Ok(header)
}

/// Parse a telemetry length header
pub fn parse_length_header(header: &[u8; TELEMETRY_HEADER_LEN]) -> RovResult<usize> {
    parse_decimal_field(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decimal_field() {
        assert_eq!(encode_decimal_field(7, 3).unwrap(), b"007");
        assert_eq!(encode_decimal_field(100, 3).unwrap(), b"100");
        assert!(encode_decimal_field(1000, 3).is_err());
    }

    #[test]
    fn test_parse_decimal_field() {
        assert_eq!(parse_decimal_field(b"050").unwrap(), 50);
        assert_eq!(parse_decimal_field(b"999").unwrap(), 999);
        assert!(matches!(parse_decimal_field(b"0a0"), Err(RovError::Protocol(_))));
        assert!(matches!(parse_decimal_field(b" 12"), Err(RovError::Protocol(_))));
        assert!(parse_decimal_field(b"").is_err());
    }

    #[test]
    fn test_length_header() {
        assert_eq!(&encode_length_header(19).unwrap(), b"00019");
        assert_eq!(&encode_length_header(MAX_TELEMETRY_PAYLOAD).unwrap(), b"99999");
        assert_eq!(parse_length_header(b"00019").unwrap(), 19);
    }

    #[test]
    fn test_length_header_too_large() {
        let err = encode_length_header(MAX_TELEMETRY_PAYLOAD + 1).unwrap_err();
        assert!(matches!(err, RovError::Encoding(_)));
    }
}
