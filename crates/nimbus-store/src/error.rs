//! Store Error Types
//!
//! This module defines all error types that can occur during store operations.
//!
//! ## Error Categories
//!
//! ### Database Errors
//! - `Database`: SQLite operation failed (connection, query, pool)
//!
//! ### Migration Errors
//! - `Migration`: Schema migration failed at startup
//!
//! ## Transient vs Permanent
//!
//! Pool and I/O level failures are transient: the database can come back
//! and the same statement can succeed unchanged. Constraint violations,
//! decode errors and migration failures are permanent. The pipeline uses
//! [`is_transient`](StoreError::is_transient) to decide between retrying
//! an insert and dead-lettering the batch.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e.to_string())
    }
}

impl StoreError {
    /// Whether retrying the failed operation can succeed without any
    /// intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Database(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}
