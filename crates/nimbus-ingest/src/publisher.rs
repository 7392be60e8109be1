//! Publisher: the validated write path onto the broker.
//!
//! One [`Publisher`] owns a validator, a broker handle, and the names of
//! the primary and dead letter topics. [`Publisher::submit`] takes a raw
//! submission through validation, partition routing, and a retried
//! append; [`Publisher::submit_batch`] does the same for a whole batch
//! concurrently and reports per-record outcomes.
//!
//! ## Partition Routing
//!
//! Records are keyed by `station_id`: SipHash of the id mod the partition
//! count. All readings from one station land on one partition, which
//! bounds out-of-order arrival per station to whatever the station itself
//! interleaves. SipHash is fast, well distributed, and deterministic, so
//! routing is stable across publisher restarts.
//!
//! ## Failure Handling
//!
//! Validation failures are rejected before anything touches the broker.
//! Transient append failures (a full partition shedding load) retry with
//! jittered exponential backoff; when the retry budget is spent the
//! payload is parked on the dead letter topic and the record is reported
//! failed. Either way the batch keeps going.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use nimbus_broker::{Broker, BrokerError};
use nimbus_core::{retry_with_jittered_backoff, DeadLetter, Reading, RetryPolicy};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::report::{BatchReport, ReadingBatch, RecordOutcome};
use crate::validate::{RawReading, Validator};

/// Default primary topic for validated readings.
pub const DEFAULT_TOPIC: &str = "weather_data";

/// Default dead letter topic for readings that exhausted their publish
/// retries.
pub const DEFAULT_DLQ_TOPIC: &str = "weather_data_dlq";

/// Point-in-time snapshot of the publisher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Records appended to the primary topic.
    pub accepted: u64,
    /// Records rejected by validation.
    pub rejected: u64,
    /// Records parked on the dead letter topic.
    pub dead_lettered: u64,
}

/// Validated write path onto the broker.
///
/// Thread-safe; share one instance across tasks with `Arc`. Holds no
/// mutable state beyond its counters, so concurrent submissions never
/// contend on a lock.
pub struct Publisher {
    broker: Arc<dyn Broker>,
    validator: Validator,
    topic: String,
    dlq_topic: String,
    /// Captured at build time; topics never change partition count.
    partition_count: u32,
    retry_policy: RetryPolicy,
    accepted: AtomicU64,
    rejected: AtomicU64,
    dead_lettered: AtomicU64,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("dlq_topic", &self.dlq_topic)
            .field("partition_count", &self.partition_count)
            .field("retry_policy", &self.retry_policy)
            .field("accepted", &self.accepted)
            .field("rejected", &self.rejected)
            .field("dead_lettered", &self.dead_lettered)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Start building a publisher over the given broker.
    pub fn builder(broker: Arc<dyn Broker>) -> PublisherBuilder {
        PublisherBuilder::new(broker)
    }

    /// Validate and publish one raw submission.
    ///
    /// A bad record is not an error: rejection and dead-lettering are
    /// outcomes reported to the caller. `Err` means the ingest path
    /// itself failed (unknown topic, payload encoding) and would fail for
    /// every record.
    pub async fn submit(&self, raw: &RawReading) -> Result<RecordOutcome> {
        let reading = match self.validator.validate(raw) {
            Ok(reading) => reading,
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(station = %raw.station_id, error = %e, "Reading rejected");
                return Ok(RecordOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
        };

        self.publish(&reading).await
    }

    /// Publish an already-validated reading.
    pub async fn publish(&self, reading: &Reading) -> Result<RecordOutcome> {
        let partition = self.partition_for(&reading.station_id);
        let key = Bytes::from(reading.station_id.clone().into_bytes());
        let value = reading.to_bytes()?;

        let appended = retry_with_jittered_backoff(
            &self.retry_policy,
            BrokerError::is_transient,
            || {
                let key = key.clone();
                let value = value.clone();
                async move {
                    self.broker
                        .append(&self.topic, partition, Some(key), value)
                        .await
                }
            },
        )
        .await;

        match appended {
            Ok(offset) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    station = %reading.station_id,
                    partition,
                    offset,
                    "Reading published"
                );
                Ok(RecordOutcome::Accepted { partition, offset })
            }
            Err(e) if e.is_transient() => {
                // Retry budget spent while the broker was still shedding
                // load; park the payload so it is not lost.
                let reason = e.to_string();
                self.dead_letter(&value, &reason).await?;
                self.dead_lettered.fetch_add(1, Ordering::Relaxed);
                warn!(
                    station = %reading.station_id,
                    partition,
                    error = %e,
                    "Publish retries exhausted, reading dead-lettered"
                );
                Ok(RecordOutcome::DeadLettered { reason })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and publish a whole batch, one future per record.
    ///
    /// Record publishes run concurrently; the report lists failures by
    /// their position in the submitted batch regardless of completion
    /// order. The batch never aborts early: every record reaches a
    /// terminal outcome.
    pub async fn submit_batch(&self, batch: &ReadingBatch) -> Result<BatchReport> {
        let submissions: Vec<_> = batch.records.iter().map(|raw| self.submit(raw)).collect();
        let results = join_all(submissions).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            outcomes.push(result?);
        }

        let report = BatchReport::from_outcomes(batch.batch_id.clone(), &outcomes);
        info!(
            batch_id = %report.batch_id,
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Batch submitted"
        );
        Ok(report)
    }

    /// Point-in-time counter snapshot.
    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Topic this publisher appends validated readings to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Partition for a station id: SipHash mod partition count.
    fn partition_for(&self, station_id: &str) -> u32 {
        let mut hasher = siphasher::sip::SipHasher::new();
        station_id.hash(&mut hasher);
        (hasher.finish() % self.partition_count as u64) as u32
    }

    /// Park a payload on the dead letter topic.
    ///
    /// Dead letter topics are unbounded, so this append is not retried; a
    /// failure here means the broker itself is gone and surfaces as a
    /// real error.
    async fn dead_letter(&self, payload: &Bytes, reason: &str) -> Result<()> {
        let letter = DeadLetter::new(String::from_utf8_lossy(payload), reason);
        self.broker
            .append(&self.dlq_topic, 0, None, letter.to_bytes()?)
            .await?;
        Ok(())
    }
}

/// Builder for [`Publisher`].
///
/// Only the broker handle is required; everything else has defaults.
///
/// # Examples
///
/// ```ignore
/// let publisher = Publisher::builder(broker)
///     .topic("weather_data")
///     .retry_policy(RetryPolicy::new(
///         3,
///         Duration::from_millis(100),
///         Duration::from_secs(30),
///         2.0,
///     ))
///     .build()
///     .await?;
/// ```
pub struct PublisherBuilder {
    broker: Arc<dyn Broker>,
    validator: Validator,
    topic: String,
    dlq_topic: String,
    retry_policy: RetryPolicy,
}

impl PublisherBuilder {
    /// New builder with default topics, validator, and retry policy
    /// (3 retries, 100ms initial backoff, 2x growth, 30s cap).
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            validator: Validator::default(),
            topic: DEFAULT_TOPIC.to_string(),
            dlq_topic: DEFAULT_DLQ_TOPIC.to_string(),
            retry_policy: RetryPolicy::new(
                3,
                Duration::from_millis(100),
                Duration::from_secs(30),
                2.0,
            ),
        }
    }

    /// Replace the default validator.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Publish to a different primary topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Park failed payloads on a different dead letter topic.
    pub fn dlq_topic(mut self, topic: impl Into<String>) -> Self {
        self.dlq_topic = topic.into();
        self
    }

    /// Replace the publish retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Verify the topology and build the publisher.
    ///
    /// Both topics must already exist. Topics belong to the deployment,
    /// not the publisher; creating them here would paper over
    /// misconfiguration. The primary topic's partition count is captured
    /// once so routing never needs another broker round trip.
    ///
    /// # Errors
    ///
    /// `IngestError::Config` if either topic is missing.
    pub async fn build(self) -> Result<Publisher> {
        if !self.broker.topic_exists(&self.topic).await? {
            return Err(IngestError::Config(format!(
                "primary topic {:?} does not exist",
                self.topic
            )));
        }
        if !self.broker.topic_exists(&self.dlq_topic).await? {
            return Err(IngestError::Config(format!(
                "dead letter topic {:?} does not exist",
                self.dlq_topic
            )));
        }

        let partition_count = self.broker.partition_count(&self.topic).await?;

        info!(
            topic = %self.topic,
            dlq_topic = %self.dlq_topic,
            partitions = partition_count,
            "Publisher initialized"
        );

        Ok(Publisher {
            broker: self.broker,
            validator: self.validator,
            topic: self.topic,
            dlq_topic: self.dlq_topic,
            partition_count,
            retry_policy: self.retry_policy,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
        })
    }
}
