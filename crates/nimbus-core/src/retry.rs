//! Retry Logic with Exponential Backoff
//!
//! This module implements retry logic for handling transient failures when
//! publishing readings to the broker or persisting them to the store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  operation   │ broker append / store insert
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │  RetryPolicy                 │
//! │  - max_retries: 5            │
//! │  - initial_backoff: 100ms    │
//! │  - max_backoff: 30s          │
//! │  - backoff_multiplier: 2.0   │
//! └──────┬───────────────────────┘
//!        │
//!        ├─→ Attempt 1: Immediate
//!        ├─→ Attempt 2: Wait 100ms (backoff)
//!        ├─→ Attempt 3: Wait 200ms (backoff * 2)
//!        ├─→ Attempt 4: Wait 400ms (backoff * 4)
//!        ├─→ Attempt 5: Wait 800ms (backoff * 8)
//!        └─→ Attempt 6: Wait 1.6s  (backoff * 16)
//! ```
//!
//! ## Retryable vs Non-Retryable Errors
//!
//! Each error type in the workspace knows which of its variants are
//! transient (a full partition, a pool timeout) and which are permanent
//! (unknown topic, malformed payload). The retry helpers take that
//! classification as a predicate so one loop serves every caller:
//!
//! ```ignore
//! use nimbus_core::retry::{RetryPolicy, retry_with_backoff};
//!
//! let policy = RetryPolicy::default(); // 5 retries, 100ms-30s backoff
//!
//! let summary = retry_with_backoff(&policy, StoreError::is_transient, || async {
//!     store.insert_readings(&batch).await
//! })
//! .await?;
//! ```
//!
//! A non-retryable error returns immediately; retryable errors back off
//! exponentially until the policy's budget is spent.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration for exponential backoff.
///
/// # Fields
///
/// * `max_retries` - Maximum number of retry attempts (default: 5)
/// * `initial_backoff` - Initial backoff duration (default: 100ms)
/// * `max_backoff` - Maximum backoff duration (default: 30s)
/// * `backoff_multiplier` - Backoff multiplier for exponential growth (default: 2.0)
///
/// # Backoff Calculation
///
/// ```text
/// backoff = min(initial_backoff * multiplier^attempt, max_backoff)
///
/// Example with defaults (100ms initial, 2x multiplier, 30s max):
/// - Attempt 1: 100ms
/// - Attempt 2: 200ms
/// - Attempt 3: 400ms
/// - Attempt 4: 800ms
/// - Attempt 5: 1.6s
/// - Attempt 6+: capped at 30s
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    /// Create a default retry policy.
    ///
    /// # Returns
    ///
    /// RetryPolicy with:
    /// - max_retries: 5
    /// - initial_backoff: 100ms
    /// - max_backoff: 30s
    /// - backoff_multiplier: 2.0
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Maximum number of retry attempts
    /// * `initial_backoff` - Initial backoff duration
    /// * `max_backoff` - Maximum backoff duration
    /// * `backoff_multiplier` - Backoff multiplier for exponential growth
    pub fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Calculate backoff duration for a given attempt number.
    ///
    /// # Arguments
    ///
    /// * `attempt` - Attempt number (0-indexed)
    ///
    /// # Returns
    ///
    /// Backoff duration = min(initial_backoff * multiplier^attempt, max_backoff)
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }
}

/// Retry an async operation with exponential backoff.
///
/// # Arguments
///
/// * `policy` - Retry policy configuration
/// * `is_transient` - Predicate classifying an error as retryable
/// * `operation` - Async operation to retry
///
/// # Returns
///
/// - `Ok(T)` if operation succeeds within max_retries
/// - `Err(E)` if all retries exhausted or non-retryable error
///
/// # Behavior
///
/// 1. Try operation
/// 2. If success, return result
/// 3. If error is non-retryable, return error immediately
/// 4. If error is retryable and retries remaining:
///    - Calculate backoff duration
///    - Sleep for backoff duration
///    - Retry operation
/// 5. If all retries exhausted, return last error
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                // Check if error is retryable
                if !is_transient(&error) {
                    warn!(error = %error, "Non-retryable error, giving up");
                    return Err(error);
                }

                // Check if we've exhausted retries
                if attempt >= policy.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %error,
                        "Max retries exhausted, giving up"
                    );
                    return Err(error);
                }

                // Calculate backoff and retry
                let backoff = policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis(),
                    error = %error,
                    "Retryable error, backing off"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Retry an async operation with jittered exponential backoff.
///
/// # Jitter
///
/// Adds random jitter (±25%) to backoff duration to prevent thundering herd.
/// This is useful when many publishers retry simultaneously after the broker
/// sheds load.
///
/// ```text
/// jittered_backoff = backoff * (0.75 + random(0.0, 0.5))
/// ```
pub async fn retry_with_jittered_backoff<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                // Check if error is retryable
                if !is_transient(&error) {
                    warn!(error = %error, "Non-retryable error, giving up");
                    return Err(error);
                }

                // Check if we've exhausted retries
                if attempt >= policy.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %error,
                        "Max retries exhausted, giving up"
                    );
                    return Err(error);
                }

                // Calculate backoff with jitter
                let base_backoff = policy.backoff(attempt);
                let jitter = 0.75 + (rand::random::<f64>() * 0.5); // 0.75-1.25x
                let jittered_backoff =
                    Duration::from_millis((base_backoff.as_millis() as f64 * jitter) as u64);

                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = jittered_backoff.as_millis(),
                    error = %error,
                    "Retryable error, backing off with jitter"
                );

                sleep(jittered_backoff).await;
                attempt += 1;
            }
        }
    }
}
