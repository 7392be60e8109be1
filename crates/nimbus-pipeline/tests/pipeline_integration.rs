//! End-to-end pipeline tests: publisher to embedded broker to consume
//! loop to SQLite store, including crash recovery, poison containment
//! and store-outage dead-lettering.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use nimbus_broker::{Broker, EmbeddedBroker, TopicConfig};
use nimbus_core::{DeadLetter, Reading, RetryPolicy};
use nimbus_ingest::{GeneratorConfig, Publisher, RawReading, ReadingBatch, ReadingGenerator};
use nimbus_pipeline::{
    PipelineConsumer, PipelineConsumerBuilder, PipelineError, DEFAULT_DLQ_TOPIC, DEFAULT_GROUP,
    DEFAULT_TOPIC,
};
use nimbus_query::QueryEngine;
use nimbus_store::{
    AggregateSummary, InsertSummary, ReadingStore, SqliteReadingStore, StoreError, TimeBucket,
    TimeRange,
};

/// Install a quiet test subscriber once; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Embedded broker with the primary topic (given partition count) and an
/// unbounded dead letter topic already created.
async fn broker_with_topics(partitions: u32) -> Arc<EmbeddedBroker> {
    init_tracing();
    let broker = Arc::new(EmbeddedBroker::new());
    broker
        .create_topic(TopicConfig::new(DEFAULT_TOPIC, partitions))
        .await
        .unwrap();
    broker
        .create_topic(TopicConfig::new(DEFAULT_DLQ_TOPIC, 1))
        .await
        .unwrap();
    broker
}

/// A consumer builder tuned so tests flush in tens of milliseconds.
fn fast_consumer(
    broker: Arc<EmbeddedBroker>,
    store: Arc<dyn ReadingStore>,
) -> PipelineConsumerBuilder {
    PipelineConsumer::builder(broker, store)
        .max_batch_wait(Duration::from_millis(50))
        .poll_interval(Duration::from_millis(10))
}

/// Raw submission for `station` at minute `minute` past a fixed base
/// hour.
fn raw(station: &str, minute: u32, temperature: f64) -> RawReading {
    RawReading {
        station_id: station.to_string(),
        temperature,
        humidity: 50.0,
        wind_speed: 5.0,
        timestamp: format!("2025-06-01T12:{:02}:00Z", minute),
    }
}

/// A range wide enough to cover every timestamp these tests produce.
fn wide_range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    )
}

/// Poll `condition` until it holds or about five seconds pass.
async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Whether the group's committed cursor has reached the log end on every
/// partition of the primary topic.
async fn fully_committed(broker: &EmbeddedBroker, group: &str) -> bool {
    let partitions = broker.partition_count(DEFAULT_TOPIC).await.unwrap();
    for partition in 0..partitions {
        let latest = broker.latest_offset(DEFAULT_TOPIC, partition).await.unwrap();
        let committed = broker
            .committed_offset(group, DEFAULT_TOPIC, partition)
            .await
            .unwrap()
            .unwrap_or(0);
        if committed < latest {
            return false;
        }
    }
    true
}

async fn wait_fully_committed(broker: &EmbeddedBroker, group: &str) {
    for _ in 0..500 {
        if fully_committed(broker, group).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for cursors to reach the log end");
}

async fn station_rows(store: &dyn ReadingStore, station: &str) -> usize {
    store.raw_range(station, &wide_range()).await.unwrap().len()
}

/// Store wrapper that counts how many readings are handed to insert,
/// proving what the dedup window kept away from the store.
struct CountingStore {
    inner: SqliteReadingStore,
    readings_seen: AtomicUsize,
}

impl CountingStore {
    async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteReadingStore::new_in_memory().await.unwrap(),
            readings_seen: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ReadingStore for CountingStore {
    async fn insert_readings(&self, readings: &[Reading]) -> nimbus_store::Result<InsertSummary> {
        self.readings_seen.fetch_add(readings.len(), Ordering::SeqCst);
        self.inner.insert_readings(readings).await
    }

    async fn raw_range(
        &self,
        station_id: &str,
        range: &TimeRange,
    ) -> nimbus_store::Result<Vec<Reading>> {
        self.inner.raw_range(station_id, range).await
    }

    async fn aggregate(
        &self,
        station_id: &str,
        range: &TimeRange,
    ) -> nimbus_store::Result<Option<AggregateSummary>> {
        self.inner.aggregate(station_id, range).await
    }

    async fn time_buckets(
        &self,
        station_id: &str,
        range: &TimeRange,
        bucket_width: Duration,
    ) -> nimbus_store::Result<Vec<TimeBucket>> {
        self.inner.time_buckets(station_id, range, bucket_width).await
    }
}

/// Store whose inserts always fail with a transient pool timeout.
struct FailingStore;

#[async_trait]
impl ReadingStore for FailingStore {
    async fn insert_readings(&self, _readings: &[Reading]) -> nimbus_store::Result<InsertSummary> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn raw_range(
        &self,
        _station_id: &str,
        _range: &TimeRange,
    ) -> nimbus_store::Result<Vec<Reading>> {
        Ok(Vec::new())
    }

    async fn aggregate(
        &self,
        _station_id: &str,
        _range: &TimeRange,
    ) -> nimbus_store::Result<Option<AggregateSummary>> {
        Ok(None)
    }

    async fn time_buckets(
        &self,
        _station_id: &str,
        _range: &TimeRange,
        _bucket_width: Duration,
    ) -> nimbus_store::Result<Vec<TimeBucket>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_published_readings_reach_the_store() {
    let broker = broker_with_topics(4).await;
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    for minute in 0..5 {
        publisher.submit(&raw("station-1", minute, 20.0)).await.unwrap();
        publisher.submit(&raw("station-2", minute, 25.0)).await.unwrap();
    }

    let consumer = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_for("10 readings persisted", || consumer.stats().persisted == 10).await;

    assert_eq!(station_rows(store.as_ref(), "station-1").await, 5);
    assert_eq!(station_rows(store.as_ref(), "station-2").await, 5);

    let stats = consumer.stats();
    assert_eq!(stats.processed, 10);
    assert_eq!(stats.poison, 0);
    assert_eq!(stats.dead_lettered, 0);

    consumer.stop().await.unwrap();
    assert!(fully_committed(broker.as_ref(), DEFAULT_GROUP).await);
}

#[tokio::test]
async fn test_window_short_circuits_duplicates() {
    let broker = broker_with_topics(2).await;
    let store = CountingStore::new().await;
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    // The same observation twice, then a distinct one.
    publisher.submit(&raw("station-1", 0, 20.0)).await.unwrap();
    publisher.submit(&raw("station-1", 0, 20.0)).await.unwrap();
    publisher.submit(&raw("station-1", 1, 21.0)).await.unwrap();

    let consumer = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_for("2 readings persisted", || consumer.stats().persisted == 2).await;

    let stats = consumer.stats();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.window_duplicates, 1);
    // The duplicate never reached the store at all.
    assert_eq!(store.readings_seen.load(Ordering::SeqCst), 2);
    assert_eq!(station_rows(store.as_ref(), "station-1").await, 2);

    consumer.stop().await.unwrap();
}

#[tokio::test]
async fn test_store_absorbs_duplicates_across_consumer_restarts() {
    let broker = broker_with_topics(2).await;
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    publisher.submit(&raw("station-1", 0, 20.0)).await.unwrap();

    let first = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_for("first run persisted", || first.stats().persisted == 1).await;
    first.stop().await.unwrap();

    // A replayed observation and a new one arrive after the restart. The
    // new consumer's window is empty, so the store's key is what absorbs
    // the replay.
    publisher.submit(&raw("station-1", 0, 20.0)).await.unwrap();
    publisher.submit(&raw("station-2", 0, 18.0)).await.unwrap();

    let second = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_for("second run flushed", || {
        let stats = second.stats();
        stats.persisted == 1 && stats.store_duplicates == 1
    })
    .await;
    second.stop().await.unwrap();

    assert_eq!(station_rows(store.as_ref(), "station-1").await, 1);
    assert_eq!(station_rows(store.as_ref(), "station-2").await, 1);
}

// ============================================================================
// Crash recovery
// ============================================================================

#[tokio::test]
async fn test_abort_mid_stream_then_restart_converges() {
    let broker = broker_with_topics(3).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteReadingStore::new(dir.path().join("readings.db"))
            .await
            .unwrap(),
    );
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    let records = ReadingGenerator::new(GeneratorConfig::default()).batch(300);
    let distinct: HashSet<(String, String)> = records
        .iter()
        .map(|r| (r.station_id.clone(), r.timestamp.clone()))
        .collect();
    let report = publisher
        .submit_batch(&ReadingBatch::with_id("load", records))
        .await
        .unwrap();
    assert_eq!(report.failed, 0);

    // Kill the first consumer somewhere in the middle of the stream,
    // between flushes, with fetched-but-uncommitted messages in flight.
    let first = fast_consumer(broker.clone(), store.clone())
        .max_batch_size(20)
        .start()
        .await
        .unwrap();
    wait_for("mid-stream progress", || first.stats().processed >= 60).await;
    first.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = fast_consumer(broker.clone(), store.clone())
        .max_batch_size(20)
        .start()
        .await
        .unwrap();
    wait_fully_committed(broker.as_ref(), DEFAULT_GROUP).await;
    second.stop().await.unwrap();

    // Redelivered messages were absorbed: one row per distinct identity,
    // exactly as an uninterrupted run would leave it.
    let mut rows = 0;
    for station in 1..=10 {
        rows += station_rows(store.as_ref(), &format!("station{}", station)).await;
    }
    assert_eq!(rows, distinct.len());
}

// ============================================================================
// Poison and store outage containment
// ============================================================================

#[tokio::test]
async fn test_poison_messages_are_counted_and_skipped() {
    let broker = broker_with_topics(1).await;
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    // Two undecodable payloads sneak onto the topic ahead of real
    // traffic.
    broker
        .append(DEFAULT_TOPIC, 0, None, Bytes::from_static(b"{not json"))
        .await
        .unwrap();
    broker
        .append(DEFAULT_TOPIC, 0, None, Bytes::from_static(b"\xff\xfe"))
        .await
        .unwrap();
    for minute in 0..3 {
        publisher.submit(&raw("station-1", minute, 20.0)).await.unwrap();
    }

    let consumer = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_fully_committed(broker.as_ref(), DEFAULT_GROUP).await;

    let stats = consumer.stats();
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.poison, 2);
    assert_eq!(stats.persisted, 3);
    assert_eq!(station_rows(store.as_ref(), "station-1").await, 3);

    // Poison is dropped, not dead-lettered.
    assert_eq!(broker.latest_offset(DEFAULT_DLQ_TOPIC, 0).await.unwrap(), 0);

    consumer.stop().await.unwrap();
}

#[tokio::test]
async fn test_store_outage_dead_letters_batch_and_advances() {
    let broker = broker_with_topics(2).await;
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    for minute in 0..3 {
        publisher.submit(&raw("station-1", minute, 20.0)).await.unwrap();
    }

    let consumer = fast_consumer(broker.clone(), Arc::new(FailingStore))
        .persist_retries(RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
        ))
        .start()
        .await
        .unwrap();
    wait_for("3 readings dead-lettered", || {
        consumer.stats().dead_lettered == 3
    })
    .await;
    wait_fully_committed(broker.as_ref(), DEFAULT_GROUP).await;

    let stats = consumer.stats();
    assert_eq!(stats.persisted, 0);
    assert_eq!(stats.dead_lettered, 3);

    // Each envelope carries the failure reason and the original payload,
    // still decodable as a reading for later replay.
    let parked = broker.fetch(DEFAULT_DLQ_TOPIC, 0, 0, 10).await.unwrap();
    assert_eq!(parked.len(), 3);
    for record in &parked {
        let letter = DeadLetter::from_bytes(&record.value).unwrap();
        assert!(letter.reason.contains("Database error"), "reason was {:?}", letter.reason);
        let reading = Reading::from_bytes(letter.payload.as_bytes()).unwrap();
        assert_eq!(reading.station_id, "station-1");
    }

    consumer.stop().await.unwrap();
}

// ============================================================================
// Batch isolation through the full stack
// ============================================================================

#[tokio::test]
async fn test_batch_with_invalid_record_end_to_end() {
    let broker = broker_with_topics(2).await;
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    let mut records = Vec::new();
    for minute in 0..10 {
        records.push(raw("station-1", minute, 15.0));
    }
    records[4].temperature = 200.0;

    let report = publisher
        .submit_batch(&ReadingBatch::with_id("mixed", records))
        .await
        .unwrap();
    assert_eq!(report.successful, 9);
    assert_eq!(report.failed, 1);

    let consumer = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_for("9 readings persisted", || consumer.stats().persisted == 9).await;
    consumer.stop().await.unwrap();

    assert_eq!(station_rows(store.as_ref(), "station-1").await, 9);
}

// ============================================================================
// Lifecycle control
// ============================================================================

#[tokio::test]
async fn test_graceful_stop_drains_pending_batch() {
    let broker = broker_with_topics(2).await;
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    for minute in 0..5 {
        publisher.submit(&raw("station-1", minute, 20.0)).await.unwrap();
    }

    // A batch window so large that nothing flushes until shutdown.
    let consumer = PipelineConsumer::builder(broker.clone(), store.clone())
        .max_batch_wait(Duration::from_secs(60))
        .poll_interval(Duration::from_millis(10))
        .start()
        .await
        .unwrap();
    wait_for("5 readings fetched", || consumer.stats().processed == 5).await;
    assert_eq!(consumer.stats().persisted, 0);

    consumer.stop().await.unwrap();

    // Stop drained the batch and committed the cursors.
    assert_eq!(station_rows(store.as_ref(), "station-1").await, 5);
    assert!(fully_committed(broker.as_ref(), DEFAULT_GROUP).await);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let broker = broker_with_topics(2).await;
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    for minute in 0..5 {
        publisher.submit(&raw("station-1", minute, 20.0)).await.unwrap();
    }

    let consumer = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_for("initial 5 processed", || consumer.stats().processed == 5).await;

    consumer.pause().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    for minute in 5..8 {
        publisher.submit(&raw("station-1", minute, 20.0)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(consumer.stats().processed, 5, "paused consumer kept fetching");

    consumer.resume().unwrap();
    wait_for("all 8 processed", || consumer.stats().processed == 8).await;
    consumer.stop().await.unwrap();
}

// ============================================================================
// Startup validation
// ============================================================================

#[tokio::test]
async fn test_start_fails_when_topic_missing() {
    init_tracing();
    let broker = Arc::new(EmbeddedBroker::new());
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());

    let err = PipelineConsumer::builder(broker, store).start().await.unwrap_err();
    match err {
        PipelineError::Config(msg) => assert!(msg.contains(DEFAULT_TOPIC)),
        other => panic!("expected Config error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_start_fails_when_dlq_topic_missing() {
    init_tracing();
    let broker = Arc::new(EmbeddedBroker::new());
    broker
        .create_topic(TopicConfig::new(DEFAULT_TOPIC, 2))
        .await
        .unwrap();
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());

    let err = PipelineConsumer::builder(broker, store).start().await.unwrap_err();
    match err {
        PipelineError::Config(msg) => assert!(msg.contains(DEFAULT_DLQ_TOPIC)),
        other => panic!("expected Config error, got {:?}", other),
    }
}

// ============================================================================
// Full stack with the query engine
// ============================================================================

#[tokio::test]
async fn test_query_engine_reads_back_persisted_readings() {
    let broker = broker_with_topics(2).await;
    let store = Arc::new(SqliteReadingStore::new_in_memory().await.unwrap());
    let publisher = Publisher::builder(broker.clone()).build().await.unwrap();

    for (minute, temperature) in [(0, 10.0), (1, 20.0), (2, 30.0)] {
        publisher
            .submit(&raw("station-5", minute, temperature))
            .await
            .unwrap();
    }

    let consumer = fast_consumer(broker.clone(), store.clone())
        .start()
        .await
        .unwrap();
    wait_for("3 readings persisted", || consumer.stats().persisted == 3).await;
    consumer.stop().await.unwrap();

    let engine = QueryEngine::new(store.clone());
    let range = wide_range();

    let rows = engine.raw_range("station-5", &range).await.unwrap();
    assert_eq!(rows.len(), 3);
    // Newest first.
    assert_eq!(rows[0].temperature, 30.0);
    assert_eq!(rows[2].temperature, 10.0);

    let summary = engine
        .aggregate("station-5", &range)
        .await
        .unwrap()
        .expect("range holds readings");
    assert_eq!(summary.reading_count, 3);
    assert_eq!(summary.temperature.min, 10.0);
    assert_eq!(summary.temperature.max, 30.0);
    assert_eq!(summary.temperature.avg, 20.0);

    let buckets = engine
        .time_buckets("station-5", &range, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0].avg_temperature, 10.0);
    assert_eq!(buckets[2].avg_temperature, 30.0);
}
