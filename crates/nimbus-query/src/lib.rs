//! Nimbus Query
//!
//! Read-side API for persisted weather readings: raw ranges, aggregate
//! statistics and time-bucketed averages, all served through TTL-bounded
//! result caches.
//!
//! ```ignore
//! use nimbus_query::QueryEngine;
//! use nimbus_store::TimeRange;
//! use std::time::Duration;
//!
//! let engine = QueryEngine::builder(store)
//!     .ttl(Duration::from_secs(60))
//!     .build();
//!
//! let summary = engine.aggregate("station-3", &range).await?;
//! let buckets = engine
//!     .time_buckets("station-3", &range, Duration::from_secs(3600))
//!     .await?;
//! ```
//!
//! Results may lag writes by up to the TTL; that staleness bound is the
//! whole caching contract. Callers that need readings the pipeline
//! persisted a moment ago query the store directly instead.

pub mod cache;
pub mod engine;
pub mod error;

pub use cache::{CacheMetrics, TtlCache};
pub use engine::{QueryEngine, QueryEngineBuilder};
pub use error::{QueryError, Result};
