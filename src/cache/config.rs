//! Cache budget configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits for the result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached results
    pub max_entries: usize,
    /// Maximum total `size_bytes` across all entries
    pub max_memory_bytes: u64,
    /// Entries older than this are treated as absent
    #[serde(default)]
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_memory_bytes: 100 * 1024 * 1024, // 100 MB
            ttl: None,
        }
    }
}

impl CacheConfig {
    pub fn new(max_entries: usize, max_memory_bytes: u64) -> Self {
        Self {
            max_entries,
            max_memory_bytes,
            ttl: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_memory(mut self, max_memory_bytes: u64) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
