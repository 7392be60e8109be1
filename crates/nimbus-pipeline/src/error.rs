//! Pipeline Error Types
//!
//! This module defines all error types that can occur while the consume
//! loop is being configured or controlled.
//!
//! ## Error Categories
//!
//! ### Configuration Errors
//! - `Config`: invalid builder parameters or missing topics at startup
//!
//! ### Runtime Errors
//! - `Broker`: a fetch, append or offset operation failed
//! - `Serialization`: a dead letter envelope would not encode
//! - `Runtime`: the control channel to the consumer task is broken
//!
//! Poison messages and exhausted persist retries are deliberately not
//! errors. Both are contained inside the loop, counted, logged and the
//! affected records dead-lettered, so one bad message or a store outage
//! can never wedge a partition.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] nimbus_broker::BrokerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
