//! Query-level result cache (spec §5 "Caching (optional, implementation
//! detail)"): memoizes a full [`crate::results::SearchResponse`] against
//! the index's current epoch so that a repeated identical search avoids
//! redoing retrieval/fusion/scoring. Generalizes the teacher's
//! `QueryCacheKey`/`QueryCache`/`CacheInvalidator` trio from a fixed
//! lexical/semantic/hybrid mail-search key shape to an opaque per-request
//! hash, since this engine's request shape (filters, vector probes, facets,
//! scoring profiles) is too open-ended to enumerate field-by-field the way
//! the teacher's `SearchFilter` hash does. Drops the teacher's
//! `WarmWorker`/embedding-model warmup machinery: this engine has no
//! separate embedder/reranker process to pre-warm, only the tantivy reader
//! and HNSW graphs the engine itself opens on `open_index`.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::query::SearchRequest;

/// Environment variable for max cache entries.
pub const CACHE_MAX_ENTRIES_ENV: &str = "SEARCH_SIM_CACHE_MAX_ENTRIES";
/// Default maximum cache entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Environment variable for cache TTL seconds.
pub const CACHE_TTL_SECONDS_ENV: &str = "SEARCH_SIM_CACHE_TTL_SECONDS";
/// Default cache TTL in seconds.
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Deterministic cache key for one search request against one index.
///
/// The key incorporates everything that affects the result set:
/// - The index name
/// - A content hash of the full request (query text, filter, vectors,
///   paging, facets, scoring profile, ...)
/// - The index epoch at query time (bumped on every mutating batch)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryCacheKey {
    pub index_name: String,
    pub request_hash: u64,
    pub index_epoch: u64,
}

impl QueryCacheKey {
    /// Builds a cache key for `request` against `index_name` at
    /// `index_epoch`. The hash is computed over the request's JSON
    /// representation, which is simpler and less error-prone than hashing
    /// every field by hand (and automatically tracks new request options).
    #[must_use]
    pub fn new(index_name: &str, request: &SearchRequest, index_epoch: u64) -> Self {
        Self {
            index_name: index_name.to_owned(),
            request_hash: hash_request(request),
            index_epoch,
        }
    }
}

fn hash_request(request: &SearchRequest) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    match serde_json::to_string(request) {
        Ok(json) => json.hash(&mut hasher),
        Err(_) => 0u8.hash(&mut hasher),
    }
    hasher.finish()
}

/// Cached search result entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub access_count: u64,
    pub last_accessed: Instant,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        let now = Instant::now();
        Self { value, created_at: now, access_count: 1, last_accessed: now }
    }

    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }

    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }
}

/// Cache eviction metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions_capacity: u64,
    pub evictions_ttl: u64,
    pub evictions_epoch: u64,
    pub inserts: u64,
    pub current_entries: usize,
}

impl CacheMetrics {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Configuration for the query cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Loads config from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let max_entries = std::env::var(CACHE_MAX_ENTRIES_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);

        let ttl_seconds = std::env::var(CACHE_TTL_SECONDS_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECONDS);

        Self { max_entries, ttl: Duration::from_secs(ttl_seconds), enabled: true }
    }
}

/// Bounded LRU cache for search query results, thread-safe via `RwLock`.
pub struct QueryCache<T> {
    config: CacheConfig,
    entries: RwLock<HashMap<QueryCacheKey, CacheEntry<T>>>,
    metrics: RwLock<CacheMetrics>,
    current_epoch: AtomicU64,
}

impl<T: Clone> QueryCache<T> {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            metrics: RwLock::new(CacheMetrics::default()),
            current_epoch: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Gets a cached value if present, not expired, and still at the
    /// current epoch.
    #[allow(clippy::significant_drop_tightening)]
    pub fn get(&self, key: &QueryCacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        if key.index_epoch != self.current_epoch.load(Ordering::Acquire) {
            if let Ok(mut metrics) = self.metrics.write() {
                metrics.misses += 1;
            }
            return None;
        }

        let mut entries = self.entries.write().ok()?;
        let Some(entry) = entries.get_mut(key) else {
            drop(entries);
            if let Ok(mut metrics) = self.metrics.write() {
                metrics.misses += 1;
            }
            return None;
        };

        if entry.is_expired(self.config.ttl) {
            entries.remove(key);
            if let Ok(mut metrics) = self.metrics.write() {
                metrics.misses += 1;
                metrics.evictions_ttl += 1;
                metrics.current_entries = entries.len();
            }
            return None;
        }

        entry.touch();
        if let Ok(mut metrics) = self.metrics.write() {
            metrics.hits += 1;
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, key: QueryCacheKey, value: T) {
        if !self.config.enabled || key.index_epoch != self.current_epoch.load(Ordering::Acquire) {
            return;
        }

        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            self.evict_lru(&mut entries);
        }

        entries.insert(key, CacheEntry::new(value));

        if let Ok(mut metrics) = self.metrics.write() {
            metrics.inserts += 1;
            metrics.current_entries = entries.len();
        }
    }

    fn evict_lru(&self, entries: &mut HashMap<QueryCacheKey, CacheEntry<T>>) {
        let lru_key = entries.iter().min_by_key(|(_, entry)| entry.last_accessed).map(|(k, _)| k.clone());

        if let Some(key) = lru_key {
            entries.remove(&key);
            if let Ok(mut metrics) = self.metrics.write() {
                metrics.evictions_capacity += 1;
                metrics.current_entries = entries.len();
            }
        }
    }

    /// Invalidates all entries by bumping the epoch (called whenever a
    /// batch mutates the index).
    pub fn invalidate_all(&self) {
        self.current_epoch.fetch_add(1, Ordering::Release);

        if let Ok(mut entries) = self.entries.write() {
            let count = entries.len();
            entries.clear();
            if let Ok(mut metrics) = self.metrics.write() {
                metrics.evictions_epoch += count as u64;
                metrics.current_entries = 0;
            }
        }
    }

    #[must_use]
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Acquire)
    }

    pub fn bump_epoch(&self) -> u64 {
        self.current_epoch.fetch_add(1, Ordering::Release) + 1
    }

    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.read().map(|m| *m).unwrap_or_default()
    }

    pub fn prune_expired(&self) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.config.ttl));
        let removed = before - entries.len();

        if removed > 0 {
            if let Ok(mut metrics) = self.metrics.write() {
                metrics.evictions_ttl += removed as u64;
                metrics.current_entries = entries.len();
            }
        }
    }
}

/// What triggered a cache invalidation, for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationTrigger {
    /// An ingestion batch upserted or deleted documents.
    IndexUpdate,
    /// The index was dropped and recreated (schema change).
    IndexRebuild,
    /// Manual invalidation requested by the caller.
    Manual,
}

/// Cache invalidation event recorded for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub trigger: InvalidationTrigger,
    pub timestamp: String,
    pub entries_invalidated: usize,
    pub new_epoch: u64,
}

/// Coordinates invalidation of one [`QueryCache`] and keeps a short
/// rolling history of invalidation events.
pub struct CacheInvalidator<T> {
    cache: Arc<QueryCache<T>>,
    events: RwLock<Vec<InvalidationEvent>>,
    max_events: usize,
}

impl<T: Clone> CacheInvalidator<T> {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(cache: Arc<QueryCache<T>>, max_events: usize) -> Self {
        Self { cache, events: RwLock::new(Vec::new()), max_events }
    }

    pub fn invalidate(&self, trigger: InvalidationTrigger) {
        let entries_before = self.cache.metrics().current_entries;
        self.cache.invalidate_all();
        let new_epoch = self.cache.current_epoch();

        let event = InvalidationEvent {
            trigger,
            timestamp: chrono::Utc::now().to_rfc3339(),
            entries_invalidated: entries_before,
            new_epoch,
        };

        if let Ok(mut events) = self.events.write() {
            events.push(event);
            if events.len() > self.max_events {
                events.remove(0);
            }
        }
    }

    #[must_use]
    pub fn recent_events(&self) -> Vec<InvalidationEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<QueryCache<T>> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SearchRequest;

    fn sample_request(search: &str) -> SearchRequest {
        SearchRequest { search: search.to_owned(), ..Default::default() }
    }

    #[test]
    fn cache_key_differs_by_request_content() {
        let key1 = QueryCacheKey::new("hotels", &sample_request("spa"), 0);
        let key2 = QueryCacheKey::new("hotels", &sample_request("pool"), 0);
        assert_ne!(key1, key2);
    }

    #[test]
    fn cache_key_identical_requests_match() {
        let key1 = QueryCacheKey::new("hotels", &sample_request("spa"), 3);
        let key2 = QueryCacheKey::new("hotels", &sample_request("spa"), 3);
        assert_eq!(key1, key2);
    }

    #[test]
    fn cache_key_differs_by_epoch() {
        let key1 = QueryCacheKey::new("hotels", &sample_request("spa"), 0);
        let key2 = QueryCacheKey::new("hotels", &sample_request("spa"), 1);
        assert_ne!(key1, key2);
    }

    #[test]
    fn put_and_get_roundtrip() {
        let cache: QueryCache<Vec<i64>> = QueryCache::with_defaults();
        let key = QueryCacheKey::new("hotels", &sample_request("spa"), 0);

        cache.put(key.clone(), vec![1, 2, 3]);
        assert_eq!(cache.get(&key), Some(vec![1, 2, 3]));
    }

    #[test]
    fn miss_on_epoch_mismatch() {
        let cache: QueryCache<Vec<i64>> = QueryCache::with_defaults();
        let key = QueryCacheKey::new("hotels", &sample_request("spa"), 0);
        cache.put(key, vec![1, 2, 3]);

        let stale_key = QueryCacheKey::new("hotels", &sample_request("spa"), 1);
        assert!(cache.get(&stale_key).is_none());
    }

    #[test]
    fn invalidate_all_clears_entries_and_bumps_epoch() {
        let cache: QueryCache<Vec<i64>> = QueryCache::with_defaults();
        let key = QueryCacheKey::new("hotels", &sample_request("spa"), 0);
        cache.put(key.clone(), vec![1, 2, 3]);
        assert!(cache.get(&key).is_some());

        cache.invalidate_all();

        assert!(cache.get(&key).is_none());
        assert_eq!(cache.current_epoch(), 1);
    }

    #[test]
    fn metrics_track_hits_misses_and_inserts() {
        let cache: QueryCache<Vec<i64>> = QueryCache::with_defaults();
        let key = QueryCacheKey::new("hotels", &sample_request("spa"), 0);

        let _ = cache.get(&key);
        cache.put(key.clone(), vec![1, 2, 3]);
        let _ = cache.get(&key);
        let _ = cache.get(&key);

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 2);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.inserts, 1);
    }

    #[test]
    fn lru_eviction_drops_least_recently_used() {
        let config = CacheConfig { max_entries: 2, ttl: Duration::from_secs(300), enabled: true };
        let cache: QueryCache<i64> = QueryCache::new(config);

        let key1 = QueryCacheKey::new("hotels", &sample_request("a"), 0);
        let key2 = QueryCacheKey::new("hotels", &sample_request("b"), 0);
        let key3 = QueryCacheKey::new("hotels", &sample_request("c"), 0);

        cache.put(key1.clone(), 1);
        cache.put(key2.clone(), 2);
        let _ = cache.get(&key1);
        cache.put(key3.clone(), 3);

        assert!(cache.get(&key1).is_some());
        assert!(cache.get(&key2).is_none());
        assert!(cache.get(&key3).is_some());
    }

    #[test]
    fn invalidator_records_events() {
        let cache = Arc::new(QueryCache::<i64>::with_defaults());
        let invalidator = CacheInvalidator::new(Arc::clone(&cache), 10);

        let key = QueryCacheKey::new("hotels", &sample_request("spa"), 0);
        cache.put(key, 42);

        invalidator.invalidate(InvalidationTrigger::IndexUpdate);

        let events = invalidator.recent_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger, InvalidationTrigger::IndexUpdate);
        assert_eq!(events[0].entries_invalidated, 1);
    }
}
