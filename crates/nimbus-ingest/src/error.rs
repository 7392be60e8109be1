//! Ingest Error Types
//!
//! ## Error Categories
//!
//! - `Config`: the publisher was built against a topology that does not
//!   exist (missing topic, missing dead letter topic)
//! - `Broker`: a broker operation failed permanently
//! - `Serialization`: a payload could not be encoded for the wire
//!
//! A rejected or dead-lettered record is **not** an error here. Those are
//! per-record outcomes ([`RecordOutcome`](crate::report::RecordOutcome))
//! handed back to the caller; `IngestError` means the ingest path itself
//! is broken.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] nimbus_broker::BrokerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
