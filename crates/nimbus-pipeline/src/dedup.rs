//! In-Memory Dedup Window
//!
//! A bounded window of recently seen reading identities, consulted by the
//! consume loop before a reading joins the persist batch.
//!
//! ## Role
//!
//! The window is an optimization, not the source of truth. The store's
//! (station, timestamp) key is the authoritative dedup boundary; the
//! window only short-circuits the common case of duplicates arriving
//! close together. An entry that is evicted by capacity or expires by age
//! costs exactly one redundant insert-or-ignore, never a duplicate row.
//!
//! ## Bounds
//!
//! Two bounds keep the window honest about memory and staleness:
//! - **capacity**: at most this many keys are tracked; the least recently
//!   seen key is evicted first
//! - **max age**: an entry older than this is treated as absent and
//!   refreshed on its next sighting

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::RwLock;

use nimbus_core::{now_ms, ReadingKey};

/// Outcome of checking one reading identity against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// Not seen within the window; the key is now tracked.
    Fresh,
    /// Seen before, within the window's age bound.
    Duplicate,
}

/// Point-in-time view of window occupancy and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Keys currently tracked.
    pub entries: usize,
    /// Maximum keys tracked before eviction.
    pub capacity: usize,
    /// Observations answered `Fresh`.
    pub fresh: u64,
    /// Observations answered `Duplicate`.
    pub duplicates: u64,
}

/// Sliding window of recently seen reading identities.
///
/// Keys are kept in an LRU cache alongside the wall-clock time they were
/// last admitted, so the window is bounded both by entry count and by
/// entry age. Lookups take the write lock because every observation
/// mutates recency.
pub struct DedupWindow {
    window: RwLock<LruCache<ReadingKey, i64>>,
    capacity: usize,
    max_age: Duration,
    fresh: AtomicU64,
    duplicates: AtomicU64,
}

impl DedupWindow {
    /// A window bounded to `capacity` keys, each trusted for `max_age`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).expect("DedupWindow capacity must be > 0");
        Self {
            window: RwLock::new(LruCache::new(cap)),
            capacity,
            max_age,
            fresh: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    /// Record a sighting of `key` and report whether it is new.
    ///
    /// An entry older than the window's max age is treated as absent and
    /// refreshed; the caller re-persists and the store's key constraint
    /// absorbs the redundant write.
    pub async fn observe(&self, key: &ReadingKey) -> DedupOutcome {
        let now = now_ms();
        let mut window = self.window.write().await;

        if let Some(seen_at) = window.get(key) {
            if now - *seen_at <= self.max_age.as_millis() as i64 {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                return DedupOutcome::Duplicate;
            }
        }

        window.put(key.clone(), now);
        self.fresh.fetch_add(1, Ordering::Relaxed);
        DedupOutcome::Fresh
    }

    /// Best-effort stats snapshot.
    ///
    /// The entry count reads as 0 if the window is locked at the moment of
    /// the snapshot; counters are always exact.
    pub fn stats(&self) -> DedupStats {
        let entries = self.window.try_read().map(|w| w.len()).unwrap_or(0);
        DedupStats {
            entries,
            capacity: self.capacity,
            fresh: self.fresh.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }

    /// Number of keys currently tracked.
    pub async fn len(&self) -> usize {
        self.window.read().await.len()
    }

    /// Whether the window tracks no keys.
    pub async fn is_empty(&self) -> bool {
        self.window.read().await.is_empty()
    }
}
