//! Query Parameter and Result Types
//!
//! Shapes exchanged with the reading store: the time range that scopes
//! every query, the insert summary, and the aggregate/bucket results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive UTC time range scoping a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// A range whose start lies after its end never matches anything and
    /// is rejected as a request error before it reaches the store.
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }
}

/// Outcome of a batch insert.
///
/// `inserted` rows are new; `ignored` rows already existed under the
/// same (station, timestamp) key and were left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub ignored: usize,
}

impl InsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.ignored
    }
}

/// Min/max/avg of a single measurement over a query range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Aggregate statistics for one station over a time range.
///
/// Only produced when at least one reading matched; an empty range yields
/// no summary rather than a summary full of fabricated zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub station_id: String,
    pub reading_count: u64,
    pub temperature: MeasurementStats,
    pub humidity: MeasurementStats,
    pub wind_speed: MeasurementStats,
}

/// Averages for one fixed-width window of a bucketed query.
///
/// Buckets are aligned to the epoch: a reading at time `t` falls in the
/// bucket starting at `t - (t % width)`. Windows with no readings are
/// omitted from results entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub bucket_start: DateTime<Utc>,
    pub reading_count: u64,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    pub avg_wind_speed: f64,
}
