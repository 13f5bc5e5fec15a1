//! Telemetry definitions for Rover
//!
//! Telemetry is sent from vehicle to ground as a length-prefixed frame: a
//! 5-digit zero-padded ASCII length followed by a JSON object payload.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{RovError, RovResult};
use crate::protocol::{encode_length_header, parse_length_header, TELEMETRY_HEADER_LEN};

/// One reading value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValue {
    Number(f64),
    Text(String),
}

impl TelemetryValue {
    /// JSON has no NaN or infinity, so those readings cannot be sent as numbers
    pub fn is_encodable(&self) -> bool {
        match self {
            TelemetryValue::Number(v) => v.is_finite(),
            TelemetryValue::Text(_) => true,
        }
    }
}

/// Non-finite readings become text such as `"NaN"` or `"inf"`
impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            TelemetryValue::Number(v)
        } else {
            TelemetryValue::Text(v.to_string())
        }
    }
}

impl From<&str> for TelemetryValue {
    fn from(v: &str) -> Self {
        TelemetryValue::Text(v.to_string())
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        TelemetryValue::Text(v)
    }
}

/// Readings produced by one poll of the telemetry source, keyed by reading
/// name and kept in the order the source produced them
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TelemetrySnapshot {
    readings: IndexMap<String, TelemetryValue>,
}

impl TelemetrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a reading
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TelemetryValue>) {
        self.readings.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<TelemetryValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TelemetryValue> {
        self.readings.get(name)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TelemetryValue)> {
        self.readings.iter()
    }

    /// Serialize to the JSON payload carried in a telemetry frame.
    ///
    /// A non-finite number would be written as `null` and could not be read
    /// back, so it fails with an encoding error instead.
    pub fn to_payload(&self) -> RovResult<Vec<u8>> {
        if let Some((name, _)) = self.readings.iter().find(|(_, v)| !v.is_encodable()) {
            return Err(RovError::Encoding(format!("reading {:?} is not a finite number", name)));
        }
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a telemetry frame payload
    pub fn from_payload(payload: &[u8]) -> RovResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// A telemetry frame ready to send: header and payload are written as two
/// sequential sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub header: [u8; TELEMETRY_HEADER_LEN],
    pub payload: Vec<u8>,
}

impl TelemetryFrame {
    /// Frame an already serialized payload.
    ///
    /// Fails with an encoding error when the payload is too large for the
    /// length header, so nothing is sent for it.
    pub fn from_payload(payload: Vec<u8>) -> RovResult<Self> {
        let header = encode_length_header(payload.len())?;
        Ok(Self { header, payload })
    }

    /// Serialize and frame a snapshot
    pub fn encode(snapshot: &TelemetrySnapshot) -> RovResult<Self> {
        Self::from_payload(snapshot.to_payload()?)
    }

    /// Payload length declared by a received header
    pub fn declared_len(header: &[u8; TELEMETRY_HEADER_LEN]) -> RovResult<usize> {
        parse_length_header(header)
    }

    /// Parse the payload of a received frame
    pub fn decode(&self) -> RovResult<TelemetrySnapshot> {
        let declared = parse_length_header(&self.header)?;
        if declared != self.payload.len() {
            return Err(RovError::protocol(format!(
                "telemetry header declares {} bytes, payload has {}",
                declared,
                self.payload.len()
            )));
        }
        TelemetrySnapshot::from_payload(&self.payload)
    }

    /// Header followed by payload, as one buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(TELEMETRY_HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_TELEMETRY_PAYLOAD;

    #[test]
    fn test_nineteen_byte_payload() {
        let payload = b"{\"UV Index\":\"0.25\"}".to_vec();
        assert_eq!(payload.len(), 19);

        let frame = TelemetryFrame::from_payload(payload.clone()).unwrap();
        assert_eq!(&frame.header, b"00019");

        let bytes = frame.to_bytes();
        assert_eq!(&bytes[..5], b"00019");
        assert_eq!(&bytes[5..], &payload[..]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = TelemetrySnapshot::new()
            .with("Temperature [*C]", 21.37)
            .with("Humidity [%]", 40.0)
            .with("Battery [%]", "87");

        let frame = TelemetryFrame::encode(&snapshot).unwrap();
        assert_eq!(frame.decode().unwrap(), snapshot);
    }

    #[test]
    fn test_oversized_payload() {
        let big = "x".repeat(MAX_TELEMETRY_PAYLOAD);
        let snapshot = TelemetrySnapshot::new().with("blob", big);
        let err = TelemetryFrame::encode(&snapshot).unwrap_err();
        assert!(matches!(err, RovError::Encoding(_)));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let frame = TelemetryFrame {
            header: *b"00010",
            payload: b"{}".to_vec(),
        };
        assert!(matches!(frame.decode(), Err(RovError::Protocol(_))));
    }

    #[test]
    fn test_payload_keeps_source_order() {
        let snapshot = TelemetrySnapshot::new()
            .with("Temperature [*C]", 21.5)
            .with("Battery [%]", "87")
            .with("Ambient Light [lux]", 300.0);

        let payload = snapshot.to_payload().unwrap();
        assert_eq!(
            payload,
            br#"{"Temperature [*C]":21.5,"Battery [%]":"87","Ambient Light [lux]":300.0}"#.to_vec()
        );

        let decoded = TelemetrySnapshot::from_payload(&payload).unwrap();
        let names: Vec<&str> = decoded.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["Temperature [*C]", "Battery [%]", "Ambient Light [lux]"]);
    }

    #[test]
    fn test_non_finite_readings() {
        let snapshot = TelemetrySnapshot::new()
            .with("Pressure [hPa]", f64::NAN)
            .with("Ambient Light [lux]", f64::INFINITY);
        assert_eq!(snapshot.get("Pressure [hPa]"), Some(&TelemetryValue::Text("NaN".to_string())));
        assert_eq!(snapshot.get("Ambient Light [lux]"), Some(&TelemetryValue::Text("inf".to_string())));

        let frame = TelemetryFrame::encode(&snapshot).unwrap();
        assert_eq!(frame.decode().unwrap(), snapshot);

        // a number placed directly is refused before anything is framed
        let mut raw = TelemetrySnapshot::new();
        raw.insert("Humidity [%]", TelemetryValue::Number(f64::NEG_INFINITY));
        assert!(matches!(TelemetryFrame::encode(&raw), Err(RovError::Encoding(_))));
    }

    #[test]
    fn test_value_forms() {
        let snapshot = TelemetrySnapshot::from_payload(br#"{"a": 3, "b": "on"}"#).unwrap();
        assert_eq!(snapshot.get("a"), Some(&TelemetryValue::Number(3.0)));
        assert_eq!(snapshot.get("b"), Some(&TelemetryValue::Text("on".to_string())));
    }
}
