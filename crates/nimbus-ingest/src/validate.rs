//! Validation of raw station submissions.
//!
//! Stations submit loosely typed payloads: a string timestamp and
//! unchecked floats. [`Validator::validate`] is the single gate between
//! that input and the well-typed [`Reading`] the rest of the pipeline
//! trusts; nothing downstream re-checks these rules.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nimbus_core::Reading;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A reading as submitted by a station, before validation.
///
/// Field types are deliberately loose. The only way to turn one of these
/// into a [`Reading`] is through a [`Validator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub station_id: String,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Wind speed in meters per second.
    pub wind_speed: f64,
    /// Observation time as an RFC 3339 string, e.g. `2025-06-01T12:00:00Z`.
    pub timestamp: String,
}

/// Why a raw reading was rejected.
///
/// Each variant names the offending field and the constraint it broke, so
/// the string form is usable as a per-record failure reason in batch
/// reports.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Station id is empty")]
    EmptyStationId,

    #[error("Non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} out of range: {value} not in {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} below minimum: {value} < {min}")]
    BelowMinimum {
        field: &'static str,
        value: f64,
        min: f64,
    },

    #[error("Invalid timestamp {raw:?}: {source}")]
    InvalidTimestamp {
        raw: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Timestamp {timestamp} is {ahead_secs}s in the future (allowed skew {max_skew_secs}s)")]
    FutureTimestamp {
        timestamp: DateTime<Utc>,
        ahead_secs: i64,
        max_skew_secs: i64,
    },
}

/// Physical bounds and clock tolerance applied during validation.
///
/// Defaults cover the full range of plausible surface weather; tighten
/// them per deployment when a site's sensors have a narrower envelope.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Lowest accepted temperature in degrees Celsius (default: -100).
    pub min_temperature: f64,

    /// Highest accepted temperature in degrees Celsius (default: 60).
    pub max_temperature: f64,

    /// Lowest accepted relative humidity in percent (default: 0).
    pub min_humidity: f64,

    /// Highest accepted relative humidity in percent (default: 100).
    pub max_humidity: f64,

    /// Lowest accepted wind speed in meters per second (default: 0).
    /// There is no upper bound; gusts beyond any fixed cap have been
    /// observed.
    pub min_wind_speed: f64,

    /// How far ahead of the ingest clock a timestamp may be before it is
    /// rejected (default: 5 minutes). Covers ordinary clock drift on
    /// station hardware without admitting nonsense.
    pub max_future_skew: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_temperature: -100.0,
            max_temperature: 60.0,
            min_humidity: 0.0,
            max_humidity: 100.0,
            min_wind_speed: 0.0,
            max_future_skew: Duration::from_secs(300),
        }
    }
}

/// Turns raw submissions into well-typed readings.
///
/// Stateless apart from its config; one instance serves the single-record
/// and batch entry points alike.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Check one raw submission against every rule.
    ///
    /// Rules run in a fixed order (station id, finiteness, bounds,
    /// timestamp) and the first violation wins, so resubmitting the same
    /// bad record always reports the same reason.
    ///
    /// The station id is trimmed; surrounding whitespace is a transport
    /// artifact, not part of the identity.
    pub fn validate(&self, raw: &RawReading) -> Result<Reading, ValidationError> {
        let station_id = raw.station_id.trim();
        if station_id.is_empty() {
            return Err(ValidationError::EmptyStationId);
        }

        check_finite("temperature", raw.temperature)?;
        check_finite("humidity", raw.humidity)?;
        check_finite("wind_speed", raw.wind_speed)?;

        check_range(
            "temperature",
            raw.temperature,
            self.config.min_temperature,
            self.config.max_temperature,
        )?;
        check_range(
            "humidity",
            raw.humidity,
            self.config.min_humidity,
            self.config.max_humidity,
        )?;
        if raw.wind_speed < self.config.min_wind_speed {
            return Err(ValidationError::BelowMinimum {
                field: "wind_speed",
                value: raw.wind_speed,
                min: self.config.min_wind_speed,
            });
        }

        let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
            .map_err(|source| ValidationError::InvalidTimestamp {
                raw: raw.timestamp.clone(),
                source,
            })?
            .with_timezone(&Utc);

        let ahead_ms = timestamp.timestamp_millis() - Utc::now().timestamp_millis();
        if ahead_ms > self.config.max_future_skew.as_millis() as i64 {
            return Err(ValidationError::FutureTimestamp {
                timestamp,
                ahead_secs: ahead_ms / 1000,
                max_skew_secs: self.config.max_future_skew.as_secs() as i64,
            });
        }

        Ok(Reading {
            station_id: station_id.to_string(),
            timestamp,
            temperature: raw.temperature,
            humidity: raw.humidity,
            wind_speed: raw.wind_speed,
        })
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field, value })
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
