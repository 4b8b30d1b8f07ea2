//! Telemetry records: thruster commands and sensor snapshots.
//!
//! On the wire a telemetry body is a single JSON object encoded as UTF-8
//! text. [`TelemetryRecord`] is the open wire-level view; [`ThrusterCommand`]
//! and [`SensorFrame`] are the typed shapes the relay actually exchanges,
//! serialized into a record with their historical key spellings.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A telemetry body: one JSON object of key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryRecord(pub Map<String, Value>);

impl TelemetryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes the record to UTF-8 JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Parses a record from UTF-8 JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        let map: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self(map))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Thruster setpoints sent from the console to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrusterCommand {
    /// Horizontal thruster setpoints, -1.0..=1.0 each.
    #[serde(rename = "horizontal_motors")]
    pub horizontal: [f32; 4],
    /// Vertical thruster setpoints, -1.0..=1.0 each.
    #[serde(rename = "vertical_motors")]
    pub vertical: [f32; 2],
    /// Master enable; thrusters are cut when false.
    pub enabled: bool,
}

impl Default for ThrusterCommand {
    fn default() -> Self {
        Self::stopped()
    }
}

impl ThrusterCommand {
    /// All setpoints zero, thrusters disabled.
    pub fn stopped() -> Self {
        Self {
            horizontal: [0.0; 4],
            vertical: [0.0; 2],
            enabled: false,
        }
    }

    pub fn to_record(&self) -> Result<TelemetryRecord, ProtocolError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(TelemetryRecord(map)),
            _ => Err(ProtocolError::MissingField("horizontal_motors")),
        }
    }

    pub fn from_record(record: &TelemetryRecord) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(Value::Object(record.0.clone()))?)
    }
}

/// Sensor snapshot sent from the vehicle to the console.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Latest IMU reading as [roll, pitch, yaw] in radians.
    #[serde(rename = "IMU")]
    pub imu: [f32; 3],
}

impl SensorFrame {
    pub fn to_record(&self) -> Result<TelemetryRecord, ProtocolError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(TelemetryRecord(map)),
            _ => Err(ProtocolError::MissingField("IMU")),
        }
    }

    pub fn from_record(record: &TelemetryRecord) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(Value::Object(record.0.clone()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_record_roundtrip() {
        let mut record = TelemetryRecord::new();
        record.insert("enabled", Value::Bool(true));
        record.insert("depth_m", serde_json::json!(12.5));
        record.insert("label", Value::String("dive-3".to_string()));

        let bytes = record.to_bytes().unwrap();
        let parsed = TelemetryRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_thruster_command_wire_keys() {
        let cmd = ThrusterCommand {
            horizontal: [0.5, 0.5, -0.5, -0.5],
            vertical: [0.25, 0.25],
            enabled: true,
        };
        let record = cmd.to_record().unwrap();
        assert!(record.get("horizontal_motors").is_some());
        assert!(record.get("vertical_motors").is_some());
        assert_eq!(record.get("enabled"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_sensor_frame_wire_key() {
        let frame = SensorFrame {
            imu: [0.1, -0.2, 3.0],
        };
        let record = frame.to_record().unwrap();
        assert!(record.get("IMU").is_some());
        assert!(record.get("imu").is_none());
    }

    #[test]
    fn test_thruster_roundtrip_through_record() {
        let cmd = ThrusterCommand {
            horizontal: [1.0, -1.0, 0.125, 0.0],
            vertical: [-0.75, 0.5],
            enabled: true,
        };
        let bytes = cmd.to_record().unwrap().to_bytes().unwrap();
        let parsed = ThrusterCommand::from_record(&TelemetryRecord::from_bytes(&bytes).unwrap())
            .unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn test_stopped_command() {
        let cmd = ThrusterCommand::stopped();
        assert!(!cmd.enabled);
        assert_eq!(cmd.horizontal, [0.0; 4]);
        assert_eq!(cmd.vertical, [0.0; 2]);
        assert_eq!(ThrusterCommand::default(), cmd);
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        let result = TelemetryRecord::from_bytes(&[0xFF, 0xFE]);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_from_bytes_rejects_bad_json() {
        let result = TelemetryRecord::from_bytes(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_from_record_rejects_missing_keys() {
        let record = TelemetryRecord::new();
        assert!(ThrusterCommand::from_record(&record).is_err());
        assert!(SensorFrame::from_record(&record).is_err());
    }

    fn setpoint() -> impl Strategy<Value = f32> {
        -1.0f32..=1.0f32
    }

    fn finite_f32() -> impl Strategy<Value = f32> {
        any::<f32>().prop_filter("finite", |f| f.is_finite())
    }

    fn record_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| Value::Number(n.into())),
            "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn prop_open_record_roundtrip(
            entries in proptest::collection::hash_map("[a-z_]{1,12}", record_value(), 0..8),
        ) {
            let mut record = TelemetryRecord::new();
            for (key, value) in entries {
                record.insert(key, value);
            }
            let bytes = record.to_bytes().unwrap();
            prop_assert_eq!(TelemetryRecord::from_bytes(&bytes).unwrap(), record);
        }

        #[test]
        fn prop_thruster_command_roundtrip(
            horizontal in proptest::array::uniform4(setpoint()),
            vertical in proptest::array::uniform2(setpoint()),
            enabled in any::<bool>(),
        ) {
            let cmd = ThrusterCommand { horizontal, vertical, enabled };
            let bytes = cmd.to_record().unwrap().to_bytes().unwrap();
            let record = TelemetryRecord::from_bytes(&bytes).unwrap();
            prop_assert_eq!(ThrusterCommand::from_record(&record).unwrap(), cmd);
        }

        #[test]
        fn prop_sensor_frame_roundtrip(imu in proptest::array::uniform3(finite_f32())) {
            let frame = SensorFrame { imu };
            let bytes = frame.to_record().unwrap().to_bytes().unwrap();
            let record = TelemetryRecord::from_bytes(&bytes).unwrap();
            prop_assert_eq!(SensorFrame::from_record(&record).unwrap(), frame);
        }
    }
}
