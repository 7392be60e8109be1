//! The Consume Loop
//!
//! A background task that moves readings from the broker into the store:
//!
//! ```text
//! ┌───────┐    ┌────────┐    ┌───────┐    ┌─────────┐    ┌────────┐
//! │ Fetch │───▶│ Decode │───▶│ Dedup │───▶│ Persist │───▶│ Commit │
//! └───────┘    └────────┘    └───────┘    └─────────┘    └────────┘
//!                  │              │            │
//!                  ▼              ▼            ▼ retries exhausted
//!               poison:       duplicate:   dead letter topic
//!               count, drop   count, skip
//! ```
//!
//! ## Delivery Contract
//!
//! The loop is at-least-once: a partition's cursor is committed only
//! after every message below it is terminal, meaning persisted, ignored
//! as a duplicate, dropped as poison, or parked on the dead letter
//! topic. A crash between persist and commit makes the next run re-read
//! the tail of the batch; the store's insert-or-ignore key turns that
//! replay into no-ops.
//!
//! ## Batching
//!
//! Decoded readings accumulate until either `max_batch_size` is reached
//! or `max_batch_wait` has passed since the oldest pending reading
//! arrived, whichever comes first. A fetch cycle in which every message
//! was terminal at decode or dedup time commits immediately, so poison
//! runs and duplicate floods never stall the cursors.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use nimbus_broker::Broker;
use nimbus_core::{retry_with_backoff, DeadLetter, Reading, RetryPolicy};
use nimbus_store::{ReadingStore, StoreError};

use crate::dedup::{DedupOutcome, DedupWindow};
use crate::error::{PipelineError, Result};
use crate::stats::{PipelineCounters, PipelineStats};

/// Default consumer group name.
pub const DEFAULT_GROUP: &str = "weather_consumers";

/// Default topic the loop consumes from.
pub const DEFAULT_TOPIC: &str = "weather_data";

/// Default topic that takes readings the store would not accept.
pub const DEFAULT_DLQ_TOPIC: &str = "weather_data_dlq";

const DEFAULT_MAX_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_BATCH_WAIT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_DEDUP_CAPACITY: usize = 4096;
const DEFAULT_DEDUP_MAX_AGE: Duration = Duration::from_secs(600);

/// Control signals sent to a running consumer task.
enum ControlSignal {
    Pause,
    Resume,
    Stop,
}

/// Configures and starts a [`PipelineConsumer`].
pub struct PipelineConsumerBuilder {
    broker: Arc<dyn Broker>,
    store: Arc<dyn ReadingStore>,
    group: String,
    topic: String,
    dlq_topic: String,
    max_batch_size: usize,
    max_batch_wait: Duration,
    poll_interval: Duration,
    persist_retries: RetryPolicy,
    dedup_capacity: usize,
    dedup_max_age: Duration,
}

impl PipelineConsumerBuilder {
    pub fn new(broker: Arc<dyn Broker>, store: Arc<dyn ReadingStore>) -> Self {
        Self {
            broker,
            store,
            group: DEFAULT_GROUP.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            dlq_topic: DEFAULT_DLQ_TOPIC.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_wait: DEFAULT_MAX_BATCH_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            persist_retries: RetryPolicy::default(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            dedup_max_age: DEFAULT_DEDUP_MAX_AGE,
        }
    }

    /// Consumer group whose committed cursors this loop resumes from.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Topic to consume readings from.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Topic that takes readings the store would not accept.
    pub fn dlq_topic(mut self, topic: impl Into<String>) -> Self {
        self.dlq_topic = topic.into();
        self
    }

    /// Flush the pending batch once it holds this many readings.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Flush the pending batch once its oldest reading is this old.
    pub fn max_batch_wait(mut self, wait: Duration) -> Self {
        self.max_batch_wait = wait;
        self
    }

    /// How long to sleep when a fetch cycle returns nothing.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Retry schedule for transient persist failures.
    pub fn persist_retries(mut self, policy: RetryPolicy) -> Self {
        self.persist_retries = policy;
        self
    }

    /// Number of reading identities the dedup window tracks.
    pub fn dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// How long a dedup window entry is trusted.
    pub fn dedup_max_age(mut self, age: Duration) -> Self {
        self.dedup_max_age = age;
        self
    }

    /// Validate the configuration, resume from the group's committed
    /// cursors and spawn the consume loop.
    pub async fn start(self) -> Result<PipelineConsumer> {
        if self.max_batch_size == 0 {
            return Err(PipelineError::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(PipelineError::Config(
                "dedup_capacity must be at least 1".to_string(),
            ));
        }
        if !self.broker.topic_exists(&self.topic).await? {
            return Err(PipelineError::Config(format!(
                "topic {:?} does not exist",
                self.topic
            )));
        }
        if !self.broker.topic_exists(&self.dlq_topic).await? {
            return Err(PipelineError::Config(format!(
                "dead letter topic {:?} does not exist",
                self.dlq_topic
            )));
        }

        let partition_count = self.broker.partition_count(&self.topic).await?;

        // Resume from the committed cursor; a group that has never
        // committed starts at the beginning of each partition.
        let mut cursors = HashMap::new();
        for partition in 0..partition_count {
            let committed = self
                .broker
                .committed_offset(&self.group, &self.topic, partition)
                .await?
                .unwrap_or(0);
            cursors.insert(partition, committed);
        }

        let counters = Arc::new(PipelineCounters::default());
        let (control_tx, control_rx) = mpsc::channel::<ControlSignal>(16);

        let worker = Worker {
            broker: self.broker,
            store: self.store,
            group: self.group,
            topic: self.topic,
            dlq_topic: self.dlq_topic,
            max_batch_size: self.max_batch_size,
            max_batch_wait: self.max_batch_wait,
            poll_interval: self.poll_interval,
            persist_retries: self.persist_retries,
            window: DedupWindow::new(self.dedup_capacity, self.dedup_max_age),
            counters: Arc::clone(&counters),
            cursors,
            pending: Vec::new(),
            pending_commits: HashMap::new(),
            batch_started: Instant::now(),
        };

        let handle = tokio::spawn(worker.run(control_rx));

        Ok(PipelineConsumer {
            control_tx,
            handle,
            counters,
        })
    }
}

/// Handle to a running consume loop.
///
/// Dropping the handle closes the control channel; the loop notices,
/// drains its pending batch and exits on its own without being joined.
#[derive(Debug)]
pub struct PipelineConsumer {
    control_tx: mpsc::Sender<ControlSignal>,
    handle: JoinHandle<()>,
    counters: Arc<PipelineCounters>,
}

impl PipelineConsumer {
    /// Start configuring a consumer over the given broker and store.
    pub fn builder(
        broker: Arc<dyn Broker>,
        store: Arc<dyn ReadingStore>,
    ) -> PipelineConsumerBuilder {
        PipelineConsumerBuilder::new(broker, store)
    }

    /// Snapshot of the loop's counters.
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Stop fetching new messages. The batch in flight still flushes on
    /// its normal schedule.
    pub fn pause(&self) -> Result<()> {
        self.control_tx
            .try_send(ControlSignal::Pause)
            .map_err(|e| PipelineError::Runtime(format!("failed to send pause: {}", e)))
    }

    /// Resume fetching after [`pause`](Self::pause).
    pub fn resume(&self) -> Result<()> {
        self.control_tx
            .try_send(ControlSignal::Resume)
            .map_err(|e| PipelineError::Runtime(format!("failed to send resume: {}", e)))
    }

    /// Graceful shutdown: the loop drains its pending batch, commits the
    /// cursors and exits before this returns.
    pub async fn stop(self) -> Result<()> {
        let _ = self.control_tx.send(ControlSignal::Stop).await;
        let _ = self.handle.await;
        Ok(())
    }

    /// Kill the loop without draining.
    ///
    /// Whatever was fetched but not committed is redelivered to the next
    /// consumer in the group; the store's insert-or-ignore key makes the
    /// replay safe.
    pub fn abort(self) {
        self.handle.abort();
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// A decoded reading awaiting persistence, with its wire payload kept
/// verbatim for dead-lettering.
struct PendingReading {
    reading: Reading,
    payload: Bytes,
}

/// State owned by the spawned consume task.
struct Worker {
    broker: Arc<dyn Broker>,
    store: Arc<dyn ReadingStore>,
    group: String,
    topic: String,
    dlq_topic: String,
    max_batch_size: usize,
    max_batch_wait: Duration,
    poll_interval: Duration,
    persist_retries: RetryPolicy,
    window: DedupWindow,
    counters: Arc<PipelineCounters>,
    /// Next offset to fetch, per partition.
    cursors: HashMap<u32, u64>,
    /// Readings decoded and admitted by the window, awaiting persist.
    pending: Vec<PendingReading>,
    /// Cursor positions that may be committed once the pending batch is
    /// terminal: partition to next offset.
    pending_commits: HashMap<u32, u64>,
    /// When the oldest pending reading arrived.
    batch_started: Instant,
}

impl Worker {
    async fn run(mut self, mut control_rx: mpsc::Receiver<ControlSignal>) {
        info!(
            group = %self.group,
            topic = %self.topic,
            partitions = self.cursors.len(),
            "Pipeline consumer started"
        );
        let mut paused = false;

        loop {
            match control_rx.try_recv() {
                Ok(ControlSignal::Stop) => {
                    info!(group = %self.group, "Stop requested, draining pending batch");
                    if let Err(e) = self.flush_and_commit().await {
                        error!(error = %e, "Failed to drain batch during shutdown");
                    }
                    break;
                }
                Ok(ControlSignal::Pause) => {
                    info!(group = %self.group, "Pipeline consumer paused");
                    paused = true;
                }
                Ok(ControlSignal::Resume) => {
                    info!(group = %self.group, "Pipeline consumer resumed");
                    paused = false;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    warn!(group = %self.group, "Control channel closed, stopping consumer");
                    if let Err(e) = self.flush_and_commit().await {
                        error!(error = %e, "Failed to drain batch during shutdown");
                    }
                    break;
                }
            }

            if paused {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }

            let fetched = match self.fetch_once().await {
                Ok(count) => count,
                Err(e) => {
                    error!(error = %e, "Fetch failed, backing off");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            let batch_due = self.pending.len() >= self.max_batch_size
                || (!self.pending.is_empty()
                    && self.batch_started.elapsed() >= self.max_batch_wait);

            if batch_due {
                if let Err(e) = self.flush_and_commit().await {
                    error!(error = %e, "Flush failed, batch retained for retry");
                }
            } else if self.pending.is_empty() && !self.pending_commits.is_empty() {
                // Everything fetched so far was terminal at decode or
                // dedup time; nothing to persist, just move the cursors.
                self.commit_cursors().await;
            }

            if fetched == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        info!(
            group = %self.group,
            stats = ?self.counters.snapshot(),
            "Pipeline consumer stopped"
        );
    }

    /// One fetch pass over all partitions, bounded by the room left in
    /// the pending batch. Returns how many records were examined.
    async fn fetch_once(&mut self) -> Result<usize> {
        let mut fetched = 0;
        let cursors: Vec<(u32, u64)> = self.cursors.iter().map(|(p, c)| (*p, *c)).collect();

        for (partition, cursor) in cursors {
            let budget = self.max_batch_size.saturating_sub(self.pending.len());
            if budget == 0 {
                break;
            }

            let records = self
                .broker
                .fetch(&self.topic, partition, cursor, budget)
                .await?;

            for record in records {
                fetched += 1;
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                let next = record.offset + 1;

                match Reading::from_bytes(&record.value) {
                    Ok(reading) => match self.window.observe(&reading.key()).await {
                        DedupOutcome::Duplicate => {
                            self.counters.window_duplicates.fetch_add(1, Ordering::Relaxed);
                            debug!(
                                key = %reading.key(),
                                partition,
                                offset = record.offset,
                                "Duplicate within window, skipped"
                            );
                        }
                        DedupOutcome::Fresh => {
                            if self.pending.is_empty() {
                                self.batch_started = Instant::now();
                            }
                            self.pending.push(PendingReading {
                                reading,
                                payload: record.value,
                            });
                        }
                    },
                    Err(e) => {
                        // Poison: counted and dropped, the cursor still
                        // advances past it.
                        self.counters.poison.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            partition,
                            offset = record.offset,
                            error = %e,
                            "Undecodable message dropped"
                        );
                    }
                }

                self.cursors.insert(partition, next);
                self.pending_commits.insert(partition, next);
            }
        }

        Ok(fetched)
    }

    /// Persist whatever is pending, then advance the committed cursors
    /// past every message examined so far.
    async fn flush_and_commit(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.flush().await?;
        }
        self.commit_cursors().await;
        Ok(())
    }

    /// Write the pending batch to the store, falling back to the dead
    /// letter topic when retries are exhausted.
    async fn flush(&mut self) -> Result<()> {
        let readings: Vec<Reading> = self.pending.iter().map(|p| p.reading.clone()).collect();
        let store = &self.store;
        let batch = &readings;

        let outcome = retry_with_backoff(&self.persist_retries, StoreError::is_transient, || {
            async move { store.insert_readings(batch).await }
        })
        .await;

        match outcome {
            Ok(summary) => {
                self.counters
                    .persisted
                    .fetch_add(summary.inserted as u64, Ordering::Relaxed);
                self.counters
                    .store_duplicates
                    .fetch_add(summary.ignored as u64, Ordering::Relaxed);
                debug!(
                    inserted = summary.inserted,
                    ignored = summary.ignored,
                    "Batch persisted"
                );
                self.pending.clear();
            }
            Err(e) => {
                // Retries exhausted. Park the batch on the dead letter
                // topic so the cursors can still advance past it.
                warn!(
                    pending = self.pending.len(),
                    error = %e,
                    "Persist retries exhausted, dead-lettering batch"
                );
                self.dead_letter_pending(&e.to_string()).await?;
            }
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        debug!(stats = ?self.counters.snapshot(), "Flush complete");
        Ok(())
    }

    /// Park every pending reading on the dead letter topic, draining as
    /// each append lands so a mid-batch failure never re-parks what
    /// already made it.
    async fn dead_letter_pending(&mut self, reason: &str) -> Result<()> {
        while let Some(entry) = self.pending.first() {
            let letter = DeadLetter::new(String::from_utf8_lossy(&entry.payload), reason);
            self.broker
                .append(&self.dlq_topic, 0, None, letter.to_bytes()?)
                .await?;
            self.pending.remove(0);
            self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Commit every cursor position whose messages are all terminal.
    ///
    /// A failed commit stays queued for the next cycle; recommitting
    /// later is safe because the store absorbs any replay in between.
    async fn commit_cursors(&mut self) {
        for (partition, offset) in std::mem::take(&mut self.pending_commits) {
            match self
                .broker
                .commit_offset(&self.group, &self.topic, partition, offset)
                .await
            {
                Ok(()) => {
                    debug!(partition, offset, "Committed cursor");
                }
                Err(e) => {
                    warn!(partition, offset, error = %e, "Cursor commit failed, will retry");
                    self.pending_commits.insert(partition, offset);
                }
            }
        }
    }
}
