//! Nimbus Pipeline
//!
//! The consume side of the weather telemetry pipeline: a background loop
//! that fetches published readings from the broker, screens out
//! duplicates and poison, persists batches to the reading store and
//! advances the consumer group's cursors.
//!
//! ```text
//!  broker topic          ┌────────────────────────────┐
//!  "weather_data" ──────▶│       PipelineConsumer     │──────▶ reading store
//!                        │  decode ▸ dedup ▸ persist  │
//!                        └──────────┬─────────────────┘
//!                                   │ undeliverable batches
//!                                   ▼
//!                        broker topic "weather_data_dlq"
//! ```
//!
//! ## Guarantees
//!
//! - **At-least-once**: cursors commit only after every message below
//!   them is terminal; crashes cause replay, never loss.
//! - **Idempotent**: replayed messages are absorbed by the in-memory
//!   [`DedupWindow`] or, past its horizon, by the store's
//!   insert-or-ignore key.
//! - **Contained failure**: an undecodable message is counted and
//!   dropped, and a store outage that outlives the retry schedule parks
//!   the batch on the dead letter topic. Neither stalls the loop.
//!
//! ## Usage
//!
//! ```ignore
//! use nimbus_pipeline::PipelineConsumer;
//!
//! let consumer = PipelineConsumer::builder(broker, store)
//!     .group("weather_consumers")
//!     .max_batch_size(100)
//!     .start()
//!     .await?;
//!
//! // ... readings flow until ...
//! consumer.stop().await?;
//! ```

pub mod consumer;
pub mod dedup;
pub mod error;
pub mod stats;

pub use consumer::{
    PipelineConsumer, PipelineConsumerBuilder, DEFAULT_DLQ_TOPIC, DEFAULT_GROUP, DEFAULT_TOPIC,
};
pub use dedup::{DedupOutcome, DedupStats, DedupWindow};
pub use error::{PipelineError, Result};
pub use stats::PipelineStats;
