//! Record Data Structure
//!
//! This module defines the `Record` type - the unit of data on a broker
//! partition.
//!
//! ## Structure
//! Each record contains:
//! - **offset**: Unique, monotonically increasing ID within a partition
//! - **timestamp**: When the record was appended (milliseconds since epoch)
//! - **key**: Optional partitioning key (the station id for readings)
//! - **value**: The actual payload (JSON bytes)
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for zero-copy operations (no allocations when slicing)
//! - Key is optional because dead letter envelopes carry no key
//! - Offset is u64 to support very large streams

use bytes::Bytes;

/// A single record on a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Offset of this record in the partition
    pub offset: u64,

    /// Timestamp in milliseconds since epoch
    pub timestamp: u64,

    /// Optional key
    pub key: Option<Bytes>,

    /// Value (payload)
    pub value: Bytes,
}

impl Record {
    pub fn new(offset: u64, timestamp: u64, key: Option<Bytes>, value: Bytes) -> Self {
        Self {
            offset,
            timestamp,
            key,
            value,
        }
    }

    /// Estimate the size of this record in bytes
    pub fn estimated_size(&self) -> usize {
        8 + // offset
        8 + // timestamp
        self.key.as_ref().map(|k| k.len()).unwrap_or(0) +
        self.value.len()
    }
}
