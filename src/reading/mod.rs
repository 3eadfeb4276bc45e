//! The `reading` module defines the record the producer hands to the
//! transmitter, and how it is laid out on the wire.
//!
//! A `Reading` is immutable once built: fields are private and only exposed
//! through accessors. Ownership moves into the transmitter on submission.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Spatial tag of the sensor that produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One timestamped sensor measurement.
///
/// Deserializes from either the nested form
/// (`"position": {"x": .., "y": .., "z": ..}`) or the collector's flat row
/// form (`"x_position"`, `"y_position"`, `"z_position"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ReadingRecord")]
pub struct Reading {
    timestamp: String,
    sensor_type: String,
    measurement_type: String,
    value: f64,
    position: Position,
}

impl Reading {
    pub fn new(
        timestamp: impl Into<String>,
        sensor_type: impl Into<String>,
        measurement_type: impl Into<String>,
        value: f64,
        position: Position,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            sensor_type: sensor_type.into(),
            measurement_type: measurement_type.into(),
            value,
            position,
        }
    }

    /// Build a reading stamped with the current UTC time (RFC 3339).
    pub fn now(
        sensor_type: impl Into<String>,
        measurement_type: impl Into<String>,
        value: f64,
        position: Position,
    ) -> Self {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Self::new(timestamp, sensor_type, measurement_type, value, position)
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub fn measurement_type(&self) -> &str {
        &self.measurement_type
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Topic this reading is published under:
    /// `{base_topic}/{device_id}/{sensor_type}/{measurement_type}`.
    ///
    /// Segments are not escaped.
    pub fn topic(&self, base_topic: &str, device_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            base_topic, device_id, self.sensor_type, self.measurement_type
        )
    }

    /// The message body published for this reading.
    pub fn payload<'a>(&'a self, device_id: &'a str) -> ReadingPayload<'a> {
        ReadingPayload {
            timestamp: &self.timestamp,
            value: self.value,
            position: self.position,
            device_id,
            sensor_type: &self.sensor_type,
            measurement_type: &self.measurement_type,
        }
    }
}

/// Wire body of a published reading.
#[derive(Debug, Serialize)]
pub struct ReadingPayload<'a> {
    pub timestamp: &'a str,
    pub value: f64,
    pub position: Position,
    pub device_id: &'a str,
    pub sensor_type: &'a str,
    pub measurement_type: &'a str,
}

impl ReadingPayload<'_> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Accepts both layouts a producer may emit.
#[derive(Deserialize)]
struct ReadingRecord {
    timestamp: String,
    sensor_type: String,
    measurement_type: String,
    value: f64,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    x_position: f64,
    #[serde(default)]
    y_position: f64,
    #[serde(default)]
    z_position: f64,
}

impl From<ReadingRecord> for Reading {
    fn from(record: ReadingRecord) -> Self {
        let position = record.position.unwrap_or(Position {
            x: record.x_position,
            y: record.y_position,
            z: record.z_position,
        });
        Reading {
            timestamp: record.timestamp,
            sensor_type: record.sensor_type,
            measurement_type: record.measurement_type,
            value: record.value,
            position,
        }
    }
}
