//! Nimbus Ingest
//!
//! The validated write path of the telemetry pipeline: raw station
//! submissions come in, well-typed readings go out onto the broker.
//!
//! ```text
//! RawReading ──▶ Validator ──▶ Publisher ──▶ topic "weather_data"
//!                   │              │
//!                   ▼              ▼ (retries exhausted)
//!                Rejected     "weather_data_dlq"
//! ```
//!
//! [`Publisher::submit`] handles one record; [`Publisher::submit_batch`]
//! publishes a whole [`ReadingBatch`] concurrently and returns a
//! per-record [`BatchReport`]. A batch never fails as a unit: every
//! record ends Accepted, Rejected, or DeadLettered.
//!
//! [`ReadingGenerator`] produces deterministic synthetic traffic for
//! tests and load experiments, duplicates included.

pub mod error;
pub mod publisher;
pub mod report;
pub mod synthetic;
pub mod validate;

pub use error::{IngestError, Result};
pub use publisher::{
    Publisher, PublisherBuilder, PublisherStats, DEFAULT_DLQ_TOPIC, DEFAULT_TOPIC,
};
pub use report::{BatchReport, ReadingBatch, RecordFailure, RecordOutcome};
pub use synthetic::{GeneratorConfig, ReadingGenerator};
pub use validate::{RawReading, ValidationError, Validator, ValidatorConfig};
