//! Query Engine
//!
//! The read-side entry point: validates query parameters, then serves
//! results through per-shape TTL caches backed by the reading store.
//!
//! ## Cache Keys
//!
//! A query is identified by exactly the parameters that determine its
//! result: station, range bounds in milliseconds, and (for buckets) the
//! bucket width. Two calls with the same parameters hit the same entry;
//! any difference misses. Each query shape has its own cache so a raw
//! result can never be confused with an aggregate for the same range.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use nimbus_core::Reading;
use nimbus_store::{AggregateSummary, ReadingStore, TimeBucket, TimeRange};

use crate::cache::{CacheMetrics, TtlCache};
use crate::error::{QueryError, Result};

/// Default freshness window for cached results.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default per-cache entry capacity.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Cache key for raw-range and aggregate queries.
#[derive(Clone, PartialEq, Eq, Hash)]
struct RangeKey {
    station_id: String,
    start_ms: i64,
    end_ms: i64,
}

impl RangeKey {
    fn new(station_id: &str, range: &TimeRange) -> Self {
        Self {
            station_id: station_id.to_string(),
            start_ms: range.start_ms(),
            end_ms: range.end_ms(),
        }
    }
}

/// Cache key for bucketed queries; the width is part of the identity.
#[derive(Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    station_id: String,
    start_ms: i64,
    end_ms: i64,
    width_ms: i64,
}

/// Read-side query API over the reading store.
pub struct QueryEngine {
    store: Arc<dyn ReadingStore>,
    ttl: Duration,
    raw_cache: TtlCache<RangeKey, Vec<Reading>>,
    aggregate_cache: TtlCache<RangeKey, Option<AggregateSummary>>,
    bucket_cache: TtlCache<BucketKey, Vec<TimeBucket>>,
}

impl QueryEngine {
    /// An engine with the default TTL and cache capacity.
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self::builder(store).build()
    }

    /// Start configuring an engine.
    pub fn builder(store: Arc<dyn ReadingStore>) -> QueryEngineBuilder {
        QueryEngineBuilder {
            store,
            ttl: DEFAULT_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// All readings for a station in the range, newest first.
    pub async fn raw_range(&self, station_id: &str, range: &TimeRange) -> Result<Vec<Reading>> {
        validate_range(range)?;

        let key = RangeKey::new(station_id, range);
        let store = self.store.clone();
        let station = station_id.to_string();
        let range = range.clone();

        self.raw_cache
            .get_or_compute(key, self.ttl, || async move {
                let readings = store.raw_range(&station, &range).await?;
                debug!(
                    station = %station,
                    count = readings.len(),
                    "Raw range served from store"
                );
                Ok(readings)
            })
            .await
    }

    /// Min/max/avg per measurement over the range, or `None` when the
    /// range holds no readings. The absence is cached like any result.
    pub async fn aggregate(
        &self,
        station_id: &str,
        range: &TimeRange,
    ) -> Result<Option<AggregateSummary>> {
        validate_range(range)?;

        let key = RangeKey::new(station_id, range);
        let store = self.store.clone();
        let station = station_id.to_string();
        let range = range.clone();

        self.aggregate_cache
            .get_or_compute(key, self.ttl, || async move {
                let summary = store.aggregate(&station, &range).await?;
                debug!(
                    station = %station,
                    found = summary.is_some(),
                    "Aggregate served from store"
                );
                Ok(summary)
            })
            .await
    }

    /// Epoch-aligned fixed-width buckets over the range, oldest first.
    /// Buckets with no readings are omitted.
    pub async fn time_buckets(
        &self,
        station_id: &str,
        range: &TimeRange,
        bucket_width: Duration,
    ) -> Result<Vec<TimeBucket>> {
        validate_range(range)?;
        if bucket_width.is_zero() {
            return Err(QueryError::InvalidBucketWidth);
        }

        let key = BucketKey {
            station_id: station_id.to_string(),
            start_ms: range.start_ms(),
            end_ms: range.end_ms(),
            width_ms: bucket_width.as_millis() as i64,
        };
        let store = self.store.clone();
        let station = station_id.to_string();
        let range = range.clone();

        self.bucket_cache
            .get_or_compute(key, self.ttl, || async move {
                let buckets = store.time_buckets(&station, &range, bucket_width).await?;
                debug!(
                    station = %station,
                    buckets = buckets.len(),
                    "Time buckets served from store"
                );
                Ok(buckets)
            })
            .await
    }

    /// Metrics for the raw-range cache
    pub fn raw_cache_metrics(&self) -> &CacheMetrics {
        self.raw_cache.metrics()
    }

    /// Metrics for the aggregate cache
    pub fn aggregate_cache_metrics(&self) -> &CacheMetrics {
        self.aggregate_cache.metrics()
    }

    /// Metrics for the bucket cache
    pub fn bucket_cache_metrics(&self) -> &CacheMetrics {
        self.bucket_cache.metrics()
    }

    /// Drop every cached result (useful for testing).
    pub async fn clear_cache(&self) {
        self.raw_cache.clear().await;
        self.aggregate_cache.clear().await;
        self.bucket_cache.clear().await;
    }
}

fn validate_range(range: &TimeRange) -> Result<()> {
    if range.is_inverted() {
        return Err(QueryError::InvalidRange {
            start: range.start,
            end: range.end,
        });
    }
    Ok(())
}

/// Builder for [`QueryEngine`].
pub struct QueryEngineBuilder {
    store: Arc<dyn ReadingStore>,
    ttl: Duration,
    cache_capacity: usize,
}

impl QueryEngineBuilder {
    /// How long a cached result stays fresh (default: 5 minutes).
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Entry capacity of each per-shape cache (default: 1024).
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> QueryEngine {
        QueryEngine {
            store: self.store,
            ttl: self.ttl,
            raw_cache: TtlCache::new(self.cache_capacity),
            aggregate_cache: TtlCache::new(self.cache_capacity),
            bucket_cache: TtlCache::new(self.cache_capacity),
        }
    }
}
