//! Cache counters and snapshots

use serde::Serialize;

/// Counters owned by the cache, mutated only under its lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Point-in-time view of the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Entries removed to satisfy the count or memory budget
    pub evictions: u64,
    /// Entries dropped on read because their TTL elapsed
    pub expirations: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    /// Number of entries in cache
    pub entry_count: usize,
    /// Bytes currently held
    pub memory_bytes: u64,
    pub memory_usage_mb: f64,
    pub max_entries: usize,
    pub max_memory_bytes: u64,
}

impl CacheStats {
    pub(crate) fn new(
        counters: Counters,
        entry_count: usize,
        memory_bytes: u64,
        max_entries: usize,
        max_memory_bytes: u64,
    ) -> Self {
        let total = counters.hits + counters.misses;
        Self {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            expirations: counters.expirations,
            hit_rate: if total > 0 {
                counters.hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count,
            memory_bytes,
            memory_usage_mb: memory_bytes as f64 / (1024.0 * 1024.0),
            max_entries,
            max_memory_bytes,
        }
    }

    /// Total lookups (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}
