//! Nimbus Store
//!
//! Durable, idempotent persistence for weather readings plus the read
//! queries the query engine is built on.
//!
//! ## Idempotent Writes
//!
//! The store is the pipeline's authoritative dedup point. Every reading
//! is inserted with conflict-ignore semantics on its (station, timestamp)
//! key, so redelivered messages and requeued batches can be written again
//! without producing duplicate rows. The pipeline's in-memory dedup
//! window is purely an optimization in front of this guarantee.
//!
//! ## Reads
//!
//! Three query shapes cover the API surface:
//! - raw readings for a station within a range, newest first
//! - min/max/avg per measurement over a range
//! - fixed-width time buckets with per-bucket averages
//!
//! ## Usage
//!
//! ```ignore
//! use nimbus_store::{ReadingStore, SqliteReadingStore, TimeRange};
//!
//! let store = SqliteReadingStore::new("readings.db").await?;
//! let summary = store.insert_readings(&batch).await?;
//! let rows = store.raw_range("station-3", &range).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::Reading;

pub mod error;
pub mod sqlite;
pub mod types;

pub use error::{Result, StoreError};
pub use sqlite::SqliteReadingStore;
pub use types::{AggregateSummary, InsertSummary, MeasurementStats, TimeBucket, TimeRange};

/// Persistence operations for weather readings.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Insert a batch of readings, ignoring any whose (station, timestamp)
    /// key is already present.
    ///
    /// The whole batch is written in one transaction: after a crash either
    /// every new row is durable or none is, so a restarted consumer can
    /// simply write the batch again.
    async fn insert_readings(&self, readings: &[Reading]) -> Result<InsertSummary>;

    /// All readings for a station within the range, newest first.
    ///
    /// An unknown station yields an empty vec, not an error.
    async fn raw_range(&self, station_id: &str, range: &TimeRange) -> Result<Vec<Reading>>;

    /// Min/max/avg for each measurement over the range, or `None` when no
    /// readings matched.
    async fn aggregate(&self, station_id: &str, range: &TimeRange)
        -> Result<Option<AggregateSummary>>;

    /// Per-bucket averages over the range, oldest bucket first.
    ///
    /// Buckets are aligned to the epoch and empty buckets are omitted.
    /// `bucket_width` must be non-zero; the query engine rejects zero
    /// widths before they reach the store.
    async fn time_buckets(
        &self,
        station_id: &str,
        range: &TimeRange,
        bucket_width: Duration,
    ) -> Result<Vec<TimeBucket>>;
}
