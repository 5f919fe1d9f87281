//! Result store with entry-count and memory budgets.
//!
//! Every mutation (including the recency bump on a hit) happens under one
//! `parking_lot::Mutex`, so the budget invariants are never observed torn.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use super::config::CacheConfig;
use super::stats::{CacheStats, Counters};
use crate::data::Table;
use crate::query::normalize::{normalize_whitespace, truncate_query};

/// Cache key: stable hash of the whitespace-normalized query text. Quoted
/// literals are hashed as written.
///
/// Case is preserved, so `SELECT 'A'` and `select 'a'` are distinct keys.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_query(sql: &str) -> Self {
        let normalized = normalize_whitespace(sql);
        Self(format!("{:016x}", fxhash::hash64(normalized.as_str())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached result and its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub data: Arc<Table>,
    /// Query text the result was produced from; pattern invalidation matches on this
    pub source_query: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    inserted: Instant,
    /// Logical clock value of the last insert or hit
    access_tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, CacheKey>,
    clock: u64,
    memory_bytes: u64,
    counters: Counters,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.access_tick);
        assert!(
            self.memory_bytes >= entry.size_bytes,
            "cache memory accounting underflow: {} < {}",
            self.memory_bytes,
            entry.size_bytes
        );
        self.memory_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// Evict the least recently accessed entry. Ticks are unique, so the
    /// order is total and needs no tie-break.
    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.recency.first_key_value().map(|(_, k)| k.clone()) else {
            return false;
        };
        if let Some(entry) = self.remove(&key) {
            self.counters.evictions += 1;
            tracing::debug!(
                "Evicted cache entry {} ({} bytes, query: {})",
                key,
                entry.size_bytes,
                truncate_query(&entry.source_query, 80)
            );
        }
        true
    }

    fn check_invariants(&self, config: &CacheConfig) {
        assert!(
            self.entries.len() <= config.max_entries,
            "cache holds {} entries, budget is {}",
            self.entries.len(),
            config.max_entries
        );
        assert!(
            self.memory_bytes <= config.max_memory_bytes,
            "cache holds {} bytes, budget is {}",
            self.memory_bytes,
            config.max_memory_bytes
        );
        debug_assert_eq!(
            self.memory_bytes,
            self.entries.values().map(|e| e.size_bytes).sum::<u64>()
        );
        debug_assert_eq!(self.recency.len(), self.entries.len());
    }
}

/// LRU result cache bounded by entry count and total bytes
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<Inner>,
    config: CacheConfig,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a result, bumping its recency on a hit
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Table>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            None => {
                inner.counters.misses += 1;
                return None;
            }
            Some(entry) => self
                .config
                .ttl
                .map(|ttl| entry.inserted.elapsed() > ttl)
                .unwrap_or(false),
        };

        if expired {
            inner.remove(key);
            inner.counters.expirations += 1;
            inner.counters.misses += 1;
            return None;
        }

        let tick = inner.tick();
        let entry = inner.entries.get_mut(key)?;
        inner.recency.remove(&entry.access_tick);
        entry.access_tick = tick;
        entry.last_access_at = Utc::now();
        inner.recency.insert(tick, key.clone());
        inner.counters.hits += 1;

        Some(Arc::clone(&entry.data))
    }

    /// Insert or replace a result, then evict until both budgets hold.
    ///
    /// The new entry is itself eligible for eviction, so a result larger than
    /// the whole memory budget leaves nothing behind for its key.
    pub fn put(&self, key: CacheKey, data: Table, source_query: &str) {
        let size_bytes = data.size_bytes();
        let now = Utc::now();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.remove(&key);
        let tick = inner.tick();
        inner.recency.insert(tick, key.clone());
        inner.memory_bytes += size_bytes;
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                data: Arc::new(data),
                source_query: source_query.to_string(),
                size_bytes,
                created_at: now,
                last_access_at: now,
                inserted: Instant::now(),
                access_tick: tick,
            },
        );

        while inner.entries.len() > self.config.max_entries {
            if !inner.evict_lru() {
                break;
            }
        }
        while inner.memory_bytes > self.config.max_memory_bytes {
            if !inner.evict_lru() {
                break;
            }
        }

        inner.check_invariants(&self.config);
    }

    /// Remove entries whose source query contains `pattern`, or everything
    /// when `pattern` is `None`. Counters are left untouched.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let doomed: Vec<CacheKey> = inner
            .entries
            .values()
            .filter(|e| pattern.map(|p| e.source_query.contains(p)).unwrap_or(true))
            .map(|e| e.key.clone())
            .collect();

        for key in &doomed {
            inner.remove(key);
        }

        inner.check_invariants(&self.config);
        doomed.len()
    }

    /// Check presence without touching recency or counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_bytes(&self) -> u64 {
        self.inner.lock().memory_bytes
    }

    /// Metadata of live entries, least recently used first
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let inner = self.inner.lock();
        inner
            .recency
            .values()
            .filter_map(|key| inner.entries.get(key))
            .map(|e| CacheEntryInfo {
                key: e.key.clone(),
                source_query: e.source_query.clone(),
                rows: e.data.num_rows(),
                size_bytes: e.size_bytes,
                created_at: e.created_at,
                last_access_at: e.last_access_at,
            })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats::new(
            inner.counters,
            inner.entries.len(),
            inner.memory_bytes,
            self.config.max_entries,
            self.config.max_memory_bytes,
        )
    }

    /// Zero the hit/miss/eviction counters
    pub fn reset_stats(&self) {
        self.inner.lock().counters = Counters::default();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Serializable summary of one cache entry
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub key: CacheKey,
    pub source_query: String,
    pub rows: usize,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}
