//! Shared types for the nimbus weather telemetry pipeline.
//!
//! Everything that crosses a crate boundary lives here: the [`Reading`]
//! record and its identity key, the [`DeadLetter`] envelope, retry
//! policies, and millisecond time helpers.

pub mod envelope;
pub mod reading;
pub mod retry;
pub mod time;

pub use envelope::DeadLetter;
pub use reading::{Reading, ReadingKey};
pub use retry::{retry_with_backoff, retry_with_jittered_backoff, RetryPolicy};
pub use time::{datetime_to_ms, ms_to_datetime, now_ms};
