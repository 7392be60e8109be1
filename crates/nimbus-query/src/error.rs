//! Query Error Types
//!
//! ## Error Categories
//!
//! ### Request Errors
//! - `InvalidRange`: start lies after end; rejected before touching the store
//! - `InvalidBucketWidth`: zero-width buckets would divide by zero
//!
//! ### Backend Errors
//! - `Store`: the underlying reading store failed
//!
//! Request errors are the caller's to fix. Note that an unknown station
//! or an empty range is NOT an error: those produce empty results.

use chrono::{DateTime, Utc};
use thiserror::Error;

use nimbus_store::StoreError;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid bucket width: must be greater than zero")]
    InvalidBucketWidth,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
