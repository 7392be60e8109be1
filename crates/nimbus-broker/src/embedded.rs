//! In-Process Broker
//!
//! `EmbeddedBroker` keeps every partition as an in-memory `Vec<Record>`
//! behind an async `RwLock`. Offsets are dense: a record's offset is its
//! index in the vec, so `fetch` is a slice copy and `latest_offset` is a
//! length read.
//!
//! ## Concurrency
//!
//! The topic map is read-locked per operation and each partition has its
//! own lock, so appends to different partitions never contend. Committed
//! offsets live in a separate map keyed by (group, topic, partition).
//!
//! ## Backpressure
//!
//! A topic created with a capacity bound rejects appends to a full
//! partition with `PartitionFull`. Callers treat that as a transient
//! error and back off; it models a broker shedding load rather than a
//! hard failure.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info};

use async_trait::async_trait;
use nimbus_core::now_ms;

use crate::error::{BrokerError, Result};
use crate::record::Record;
use crate::{Broker, TopicConfig};

// ============================================================================
// Topic state
// ============================================================================

struct TopicState {
    partitions: Vec<RwLock<Vec<Record>>>,
    capacity: Option<usize>,
}

impl TopicState {
    fn partition(&self, topic: &str, partition: u32) -> Result<&RwLock<Vec<Record>>> {
        self.partitions
            .get(partition as usize)
            .ok_or_else(|| BrokerError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })
    }
}

// ============================================================================
// EmbeddedBroker
// ============================================================================

/// In-memory broker used by the pipeline and its tests.
pub struct EmbeddedBroker {
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
    /// Committed offsets keyed by (group, topic, partition).
    offsets: RwLock<HashMap<(String, String, u32), u64>>,
}

impl EmbeddedBroker {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            offsets: RwLock::new(HashMap::new()),
        }
    }

    async fn topic_state(&self, topic: &str) -> Result<Arc<TopicState>> {
        self.topics
            .read()
            .await
            .get(topic)
            .cloned()
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))
    }
}

impl Default for EmbeddedBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for EmbeddedBroker {
    async fn create_topic(&self, config: TopicConfig) -> Result<()> {
        if config.name.trim().is_empty() {
            return Err(BrokerError::InvalidConfig(
                "topic name must not be empty".to_string(),
            ));
        }
        if config.partition_count == 0 {
            return Err(BrokerError::InvalidConfig(format!(
                "topic '{}' must have at least one partition",
                config.name
            )));
        }

        let mut topics = self.topics.write().await;
        if topics.contains_key(&config.name) {
            return Err(BrokerError::TopicAlreadyExists(config.name));
        }

        let partitions = (0..config.partition_count)
            .map(|_| RwLock::new(Vec::new()))
            .collect();

        info!(
            topic = %config.name,
            partitions = config.partition_count,
            capacity = ?config.capacity,
            "Topic created"
        );

        topics.insert(
            config.name,
            Arc::new(TopicState {
                partitions,
                capacity: config.capacity,
            }),
        );

        Ok(())
    }

    async fn topic_exists(&self, topic: &str) -> Result<bool> {
        Ok(self.topics.read().await.contains_key(topic))
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        let state = self.topic_state(topic).await?;
        Ok(state.partitions.len() as u32)
    }

    async fn append(
        &self,
        topic: &str,
        partition: u32,
        key: Option<Bytes>,
        value: Bytes,
    ) -> Result<u64> {
        let state = self.topic_state(topic).await?;
        let mut records = state.partition(topic, partition)?.write().await;

        if let Some(capacity) = state.capacity {
            if records.len() >= capacity {
                return Err(BrokerError::PartitionFull {
                    topic: topic.to_string(),
                    partition,
                });
            }
        }

        let offset = records.len() as u64;
        records.push(Record::new(offset, now_ms() as u64, key, value));

        debug!(topic = topic, partition = partition, offset = offset, "Record appended");

        Ok(offset)
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        from_offset: u64,
        max_records: usize,
    ) -> Result<Vec<Record>> {
        let state = self.topic_state(topic).await?;
        let records = state.partition(topic, partition)?.read().await;

        let start = from_offset as usize;
        if start >= records.len() {
            return Ok(Vec::new());
        }

        let end = (start + max_records).min(records.len());
        Ok(records[start..end].to_vec())
    }

    async fn latest_offset(&self, topic: &str, partition: u32) -> Result<u64> {
        let state = self.topic_state(topic).await?;
        let records = state.partition(topic, partition)?.read().await;
        Ok(records.len() as u64)
    }

    async fn commit_offset(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<()> {
        // Validate the target so a typo'd topic surfaces here, not at the
        // next restart.
        let state = self.topic_state(topic).await?;
        state.partition(topic, partition)?;

        self.offsets
            .write()
            .await
            .insert((group.to_string(), topic.to_string(), partition), offset);

        debug!(
            group = group,
            topic = topic,
            partition = partition,
            offset = offset,
            "Offset committed"
        );

        Ok(())
    }

    async fn committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Result<Option<u64>> {
        Ok(self
            .offsets
            .read()
            .await
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied())
    }
}

// ============================================================================
// Tests
// ============================================================================
