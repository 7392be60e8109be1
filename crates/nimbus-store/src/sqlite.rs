//! SQLite Reading Store Implementation
//!
//! This module implements the ReadingStore trait using SQLite as the
//! backend.
//!
//! ## Why SQLite?
//!
//! For a single-node pipeline, SQLite is ideal:
//! - **Zero configuration**: Embedded database, no separate server
//! - **ACID transactions**: A batch insert is all-or-nothing
//! - **Low latency**: < 1ms for indexed queries
//! - **Easy migration**: Can switch to Postgres later with minimal changes
//!
//! ## Usage
//!
//! ### File-Based (Production)
//! ```ignore
//! use nimbus_store::{SqliteReadingStore, ReadingStore};
//!
//! // Creates readings.db file (or opens if exists)
//! let store = SqliteReadingStore::new("readings.db").await?;
//! ```
//!
//! ### In-Memory (Testing)
//! ```ignore
//! // Fast, isolated tests
//! let store = SqliteReadingStore::new_in_memory().await?;
//! ```
//!
//! ## Implementation Details
//!
//! ### Migrations
//! - Run automatically on startup via sqlx::migrate!
//! - Create schema if database is new
//!
//! ### Idempotent Inserts
//! - `INSERT ... ON CONFLICT DO NOTHING` on the (station_id, timestamp_ms)
//!   primary key
//! - `rows_affected() == 0` distinguishes an ignored duplicate from a new
//!   row, which is how the insert summary is assembled
//!
//! ## Thread Safety
//!
//! - SqliteReadingStore is Send + Sync
//! - Can be safely shared via Arc<SqliteReadingStore>
//! - Connection pool handles concurrent access

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::debug;

use nimbus_core::{ms_to_datetime, Reading};

use crate::error::Result;
use crate::types::{AggregateSummary, InsertSummary, MeasurementStats, TimeBucket, TimeRange};
use crate::ReadingStore;

/// SQLite-based reading store implementation
pub struct SqliteReadingStore {
    pool: SqlitePool,
}

impl SqliteReadingStore {
    /// Create a new SQLite reading store
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create in-memory database (for testing)
    pub async fn new_in_memory() -> Result<Self> {
        // A single connection keeps every handle on the same database;
        // each additional ":memory:" connection would open a fresh empty one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ReadingStore for SqliteReadingStore {
    async fn insert_readings(&self, readings: &[Reading]) -> Result<InsertSummary> {
        if readings.is_empty() {
            return Ok(InsertSummary::default());
        }

        let mut tx = self.pool.begin().await?;
        let mut summary = InsertSummary::default();

        for reading in readings {
            let result = sqlx::query(
                "INSERT INTO readings (station_id, timestamp_ms, temperature, humidity, wind_speed)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (station_id, timestamp_ms) DO NOTHING",
            )
            .bind(&reading.station_id)
            .bind(reading.timestamp_ms())
            .bind(reading.temperature)
            .bind(reading.humidity)
            .bind(reading.wind_speed)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                summary.ignored += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit().await?;

        debug!(
            inserted = summary.inserted,
            ignored = summary.ignored,
            "Reading batch persisted"
        );

        Ok(summary)
    }

    async fn raw_range(&self, station_id: &str, range: &TimeRange) -> Result<Vec<Reading>> {
        let rows = sqlx::query(
            "SELECT station_id, timestamp_ms, temperature, humidity, wind_speed
             FROM readings
             WHERE station_id = ? AND timestamp_ms >= ? AND timestamp_ms <= ?
             ORDER BY timestamp_ms DESC",
        )
        .bind(station_id)
        .bind(range.start_ms())
        .bind(range.end_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Reading {
                station_id: r.get("station_id"),
                timestamp: ms_to_datetime(r.get::<i64, _>("timestamp_ms")),
                temperature: r.get("temperature"),
                humidity: r.get("humidity"),
                wind_speed: r.get("wind_speed"),
            })
            .collect())
    }

    async fn aggregate(
        &self,
        station_id: &str,
        range: &TimeRange,
    ) -> Result<Option<AggregateSummary>> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS reading_count,
                    MIN(temperature) AS min_temperature,
                    MAX(temperature) AS max_temperature,
                    AVG(temperature) AS avg_temperature,
                    MIN(humidity) AS min_humidity,
                    MAX(humidity) AS max_humidity,
                    AVG(humidity) AS avg_humidity,
                    MIN(wind_speed) AS min_wind_speed,
                    MAX(wind_speed) AS max_wind_speed,
                    AVG(wind_speed) AS avg_wind_speed
             FROM readings
             WHERE station_id = ? AND timestamp_ms >= ? AND timestamp_ms <= ?",
        )
        .bind(station_id)
        .bind(range.start_ms())
        .bind(range.end_ms())
        .fetch_one(&self.pool)
        .await?;

        let reading_count = row.get::<i64, _>("reading_count");
        if reading_count == 0 {
            // No matching readings: the MIN/MAX/AVG columns are all NULL.
            return Ok(None);
        }

        Ok(Some(AggregateSummary {
            station_id: station_id.to_string(),
            reading_count: reading_count as u64,
            temperature: MeasurementStats {
                min: row.get("min_temperature"),
                max: row.get("max_temperature"),
                avg: row.get("avg_temperature"),
            },
            humidity: MeasurementStats {
                min: row.get("min_humidity"),
                max: row.get("max_humidity"),
                avg: row.get("avg_humidity"),
            },
            wind_speed: MeasurementStats {
                min: row.get("min_wind_speed"),
                max: row.get("max_wind_speed"),
                avg: row.get("avg_wind_speed"),
            },
        }))
    }

    async fn time_buckets(
        &self,
        station_id: &str,
        range: &TimeRange,
        bucket_width: Duration,
    ) -> Result<Vec<TimeBucket>> {
        let width_ms = bucket_width.as_millis() as i64;

        let rows = sqlx::query(
            "SELECT (timestamp_ms / ?) * ? AS bucket_ms,
                    COUNT(*) AS reading_count,
                    AVG(temperature) AS avg_temperature,
                    AVG(humidity) AS avg_humidity,
                    AVG(wind_speed) AS avg_wind_speed
             FROM readings
             WHERE station_id = ? AND timestamp_ms >= ? AND timestamp_ms <= ?
             GROUP BY bucket_ms
             ORDER BY bucket_ms ASC",
        )
        .bind(width_ms)
        .bind(width_ms)
        .bind(station_id)
        .bind(range.start_ms())
        .bind(range.end_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TimeBucket {
                bucket_start: ms_to_datetime(r.get::<i64, _>("bucket_ms")),
                reading_count: r.get::<i64, _>("reading_count") as u64,
                avg_temperature: r.get("avg_temperature"),
                avg_humidity: r.get("avg_humidity"),
                avg_wind_speed: r.get("avg_wind_speed"),
            })
            .collect())
    }
}
