//! The validated weather reading record and its identity key.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single validated weather observation from one station.
///
/// Two readings with the same `(station_id, timestamp)` describe the same
/// observation. Everything downstream of validation (the broker, the
/// pipeline, the store) treats that pair as the record's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Station that produced the observation.
    pub station_id: String,
    /// Observation time in UTC.
    pub timestamp: DateTime<Utc>,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Wind speed in meters per second.
    pub wind_speed: f64,
}

impl Reading {
    /// The identity of this reading, used for dedup and storage conflict
    /// resolution.
    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            station_id: self.station_id.clone(),
            timestamp_ms: self.timestamp_ms(),
        }
    }

    /// Observation time as milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Serialize to the JSON wire format used on broker topics.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a reading from its JSON wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Identity of a reading: station plus observation time in epoch
/// milliseconds.
///
/// Millisecond precision matches what the store persists, so a key built
/// from a decoded reading always equals the key of the row it would
/// insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadingKey {
    pub station_id: String,
    pub timestamp_ms: i64,
}

impl std::fmt::Display for ReadingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.station_id, self.timestamp_ms)
    }
}
