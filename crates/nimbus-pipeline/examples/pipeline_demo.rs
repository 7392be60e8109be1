//! End-to-end pipeline walkthrough: synthetic station traffic is
//! published onto the embedded broker, the consume loop dedups and
//! persists it, and the query engine reads the results back.
//!
//! Run with: cargo run -p nimbus-pipeline --example pipeline_demo

use std::sync::Arc;
use std::time::Duration;

use nimbus_broker::{Broker, EmbeddedBroker, TopicConfig};
use nimbus_ingest::{GeneratorConfig, Publisher, RawReading, ReadingBatch, ReadingGenerator};
use nimbus_pipeline::{PipelineConsumer, DEFAULT_DLQ_TOPIC, DEFAULT_TOPIC};
use nimbus_query::QueryEngine;
use nimbus_store::{SqliteReadingStore, TimeRange};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Nimbus Pipeline Demo");
    println!();

    // Setup: broker topics and an in-memory store.
    let broker = Arc::new(EmbeddedBroker::new());
    broker
        .create_topic(TopicConfig::new(DEFAULT_TOPIC, 4))
        .await?;
    broker
        .create_topic(TopicConfig::new(DEFAULT_DLQ_TOPIC, 1))
        .await?;
    println!("✓ Created topic '{}' with 4 partitions", DEFAULT_TOPIC);

    let store = Arc::new(SqliteReadingStore::new_in_memory().await?);
    let publisher = Publisher::builder(broker.clone()).build().await?;

    // Publish 500 synthetic readings, roughly 20% of them duplicates,
    // plus a couple of submissions validation should reject.
    let mut generator = ReadingGenerator::new(GeneratorConfig::default());
    let mut records = generator.batch(500);
    records.push(RawReading {
        station_id: String::new(),
        temperature: 20.0,
        humidity: 50.0,
        wind_speed: 3.0,
        timestamp: "2025-01-01T00:00:00Z".to_string(),
    });
    records.push(RawReading {
        station_id: "station1".to_string(),
        temperature: 250.0,
        humidity: 50.0,
        wind_speed: 3.0,
        timestamp: "2025-01-01T00:00:00Z".to_string(),
    });

    let total = records.len();
    let report = publisher.submit_batch(&ReadingBatch::new(records)).await?;
    println!(
        "✓ Published batch {}: {} accepted, {} rejected of {}",
        report.batch_id, report.successful, report.failed, total
    );
    for failure in &report.failures {
        println!("    record {}: {}", failure.index, failure.reason);
    }

    // Consume until every published message is persisted or skipped.
    let consumer = PipelineConsumer::builder(broker.clone(), store.clone())
        .max_batch_wait(Duration::from_millis(200))
        .start()
        .await?;

    let published = report.successful as u64;
    while consumer.stats().processed < published {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stats = consumer.stats();
    println!("✓ Consumed {} messages in {} batches", stats.processed, stats.batches);
    println!("    persisted:         {}", stats.persisted);
    println!("    window duplicates: {}", stats.window_duplicates);
    println!("    store duplicates:  {}", stats.store_duplicates);

    consumer.stop().await?;

    // Read back through the query engine.
    let engine = QueryEngine::new(store);
    let config = GeneratorConfig::default();
    let range = TimeRange::new(config.start, config.start + chrono::Duration::hours(1));

    println!();
    if let Some(summary) = engine.aggregate("station1", &range).await? {
        println!(
            "station1: {} readings, temperature {:.1}..{:.1} C (avg {:.1})",
            summary.reading_count,
            summary.temperature.min,
            summary.temperature.max,
            summary.temperature.avg
        );
    }

    let buckets = engine
        .time_buckets("station1", &range, Duration::from_secs(60))
        .await?;
    println!("station1: {} one-minute buckets", buckets.len());
    for bucket in buckets.iter().take(5) {
        println!(
            "    {}  {} readings, avg {:.1} C",
            bucket.bucket_start.format("%H:%M"),
            bucket.reading_count,
            bucket.avg_temperature
        );
    }

    println!();
    println!("✓ Demo finished");
    Ok(())
}
