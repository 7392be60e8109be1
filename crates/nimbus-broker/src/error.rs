//! Broker Error Types
//!
//! This module defines all error types that can occur during broker operations.
//!
//! ## Error Categories
//!
//! ### Topic Errors
//! - `TopicNotFound`: Requested topic doesn't exist
//! - `TopicAlreadyExists`: Trying to create a topic that already exists
//!
//! ### Partition Errors
//! - `PartitionNotFound`: Requested partition doesn't exist for the topic
//! - `PartitionFull`: Partition hit its capacity bound (backpressure)
//!
//! ### Configuration Errors
//! - `InvalidConfig`: Topic configuration rejected at creation time
//!
//! ## Transient vs Permanent
//!
//! `PartitionFull` is the only transient variant: the broker is shedding
//! load and the same append can succeed once a consumer drains the
//! partition. Everything else is permanent and retrying won't help; the
//! [`is_transient`](BrokerError::is_transient) method encodes that split
//! for the retry helpers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    #[error("Partition not found: {topic}/{partition}")]
    PartitionNotFound { topic: String, partition: u32 },

    #[error("Partition full: {topic}/{partition}")]
    PartitionFull { topic: String, partition: u32 },

    #[error("Invalid topic config: {0}")]
    InvalidConfig(String),
}

impl BrokerError {
    /// Whether retrying the failed operation can succeed without any
    /// intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::PartitionFull { .. })
    }
}
