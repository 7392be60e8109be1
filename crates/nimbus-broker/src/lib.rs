//! Nimbus Broker
//!
//! A partitioned, offset-addressed message log that decouples ingestion
//! from persistence in the weather telemetry pipeline.
//!
//! ## Data Model
//!
//! ```text
//! topic "weather_data"
//! ├── partition 0:  [r0] [r1] [r2] [r3] ...   ← append at tail
//! ├── partition 1:  [r0] [r1] ...
//! └── partition 2:  [r0] ...
//!
//! consumer group "weather_consumers"
//! └── committed offsets: {partition 0: 3, partition 1: 2, ...}
//! ```
//!
//! Records within a partition are totally ordered by offset. A publisher
//! that routes all records for one station to one partition therefore
//! gets per-station FIFO delivery for free.
//!
//! Committed offsets are stored per consumer group and mark the **next**
//! offset to fetch. A consumer that crashes and restarts resumes from its
//! last committed offset and re-reads anything it had fetched but not yet
//! committed (at-least-once delivery).
//!
//! ## Implementations
//!
//! [`EmbeddedBroker`] is the in-process implementation used throughout
//! the pipeline and its tests. The [`Broker`] trait keeps the rest of the
//! system independent of it.

use async_trait::async_trait;
use bytes::Bytes;

pub mod embedded;
pub mod error;
pub mod record;

pub use embedded::EmbeddedBroker;
pub use error::{BrokerError, Result};
pub use record::Record;

/// Configuration for a topic at creation time.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Topic name
    pub name: String,

    /// Number of partitions
    pub partition_count: u32,

    /// Per-partition record capacity. `None` means unbounded; dead letter
    /// topics are created unbounded so parking a message can never itself
    /// fail with backpressure.
    pub capacity: Option<usize>,
}

impl TopicConfig {
    /// A topic with the given partition count and no capacity bound.
    pub fn new(name: impl Into<String>, partition_count: u32) -> Self {
        Self {
            name: name.into(),
            partition_count,
            capacity: None,
        }
    }

    /// Bound each partition to at most `capacity` records.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Operations every broker implementation must support.
///
/// All methods are async and return `Result` so implementations backed by
/// a network are possible, even though the embedded broker never blocks.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Create a new topic.
    ///
    /// Returns `TopicAlreadyExists` if the name is taken and
    /// `InvalidConfig` if the config is rejected (empty name, zero
    /// partitions).
    async fn create_topic(&self, config: TopicConfig) -> Result<()>;

    /// Whether a topic exists.
    async fn topic_exists(&self, topic: &str) -> Result<bool>;

    /// Number of partitions for a topic.
    async fn partition_count(&self, topic: &str) -> Result<u32>;

    /// Append a record to the tail of a partition and return its offset.
    ///
    /// Returns `PartitionFull` when the partition is at capacity; that
    /// error is transient and the append can be retried after consumers
    /// drain the partition.
    async fn append(
        &self,
        topic: &str,
        partition: u32,
        key: Option<Bytes>,
        value: Bytes,
    ) -> Result<u64>;

    /// Fetch up to `max_records` records starting at `from_offset`.
    ///
    /// Returns an empty vec when `from_offset` is at or past the tail.
    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        from_offset: u64,
        max_records: usize,
    ) -> Result<Vec<Record>>;

    /// The offset the next appended record will receive (log end offset).
    async fn latest_offset(&self, topic: &str, partition: u32) -> Result<u64>;

    /// Record that `group` has fully processed everything below `offset`
    /// on this partition. `offset` is the next offset to fetch.
    async fn commit_offset(&self, group: &str, topic: &str, partition: u32, offset: u64)
        -> Result<()>;

    /// The committed offset for a group, or `None` if the group has never
    /// committed on this partition.
    async fn committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<Option<u64>>;
}
