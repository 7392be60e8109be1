//! Query Result Caching
//!
//! This module implements a TTL-bounded LRU cache for query results to
//! reduce load on the underlying store for read-heavy workloads.
//!
//! ## Why Caching?
//!
//! Dashboards poll the same handful of queries (last hour for a station,
//! daily buckets) far faster than new readings arrive. Without caching
//! every poll is a database query; with it, repeated queries inside the
//! freshness window are served from memory.
//!
//! ## Cache Invalidation Strategy
//!
//! **TTL-Based Expiration:**
//! - Every entry carries an expiry timestamp
//! - An expired entry is treated as absent and evicted on access
//! - Staleness is bounded by the TTL and nothing else: writes do not
//!   invalidate, by design
//!
//! **LRU Eviction:**
//! - The cache has a fixed capacity
//! - Least recently used entries are evicted when full
//! - Prevents unbounded memory growth
//!
//! ## Concurrency
//!
//! `get_or_compute` never holds the cache lock across the compute future.
//! Two tasks missing on the same key may both compute; both results are
//! valid for the key, the second insert simply overwrites the first.

use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::RwLock;

use nimbus_core::now_ms;

/// Cache entry with TTL
#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: i64, // Timestamp in milliseconds
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let expires_at = now_ms() + ttl.as_millis() as i64;
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        now_ms() >= self.expires_at
    }

    fn value(&self) -> &V {
        &self.value
    }
}

/// Cache performance metrics
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheMetrics {
    /// Create new metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// TTL-bounded LRU cache keyed by query parameters.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    entries: RwLock<LruCache<K, CacheEntry<V>>>,
    metrics: CacheMetrics,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("TtlCache capacity must be > 0"),
            )),
            metrics: CacheMetrics::new(),
        }
    }

    /// Look up a key, counting a hit or miss.
    ///
    /// An expired entry counts as a miss and is evicted.
    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let mut cache = self.entries.write().await;
            if let Some(entry) = cache.get(key) {
                if !entry.is_expired() {
                    self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value().clone());
                } else {
                    // Expired - remove from cache
                    cache.pop(key);
                }
            }
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a value that stays fresh for `ttl`.
    pub async fn insert(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        self.entries.write().await.put(key, entry);
    }

    /// Return the cached value for `key`, or run `compute`, cache its
    /// result and return it.
    ///
    /// The cache lock is not held while `compute` runs, so a slow query
    /// never blocks unrelated lookups. A failed compute caches nothing.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }

        let value = compute().await?;
        self.insert(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Drop a single entry.
    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.pop(key);
    }

    /// Drop everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of live entries (expired entries still count until evicted).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get cache performance metrics
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}
