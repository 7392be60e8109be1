//! Pipeline Counters
//!
//! Running totals for one consume loop, shared between the worker task
//! and the handle that observes it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time view of a consumer's counters.
///
/// `processed` counts every message fetched and examined. Once all
/// batches have flushed, the outcome counters partition it exactly:
/// `persisted + store_duplicates + window_duplicates + poison +
/// dead_lettered == processed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Messages fetched from the broker and examined.
    pub processed: u64,
    /// New rows accepted by the store.
    pub persisted: u64,
    /// Insert no-ops on a key the store already holds.
    pub store_duplicates: u64,
    /// Duplicates short-circuited by the in-memory window.
    pub window_duplicates: u64,
    /// Undecodable messages dropped.
    pub poison: u64,
    /// Readings parked on the dead letter topic.
    pub dead_lettered: u64,
    /// Completed flush cycles.
    pub batches: u64,
}

/// Live counters behind a running consumer. Every update is a relaxed
/// atomic increment, so the worker never blocks on observation.
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub processed: AtomicU64,
    pub persisted: AtomicU64,
    pub store_duplicates: AtomicU64,
    pub window_duplicates: AtomicU64,
    pub poison: AtomicU64,
    pub dead_lettered: AtomicU64,
    pub batches: AtomicU64,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            processed: self.processed.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            store_duplicates: self.store_duplicates.load(Ordering::Relaxed),
            window_duplicates: self.window_duplicates.load(Ordering::Relaxed),
            poison: self.poison.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}
