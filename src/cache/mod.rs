//! Query result caching with LRU eviction under entry-count and memory budgets.

pub mod config;
pub mod stats;
pub mod store;

pub use config::CacheConfig;
pub use stats::CacheStats;
pub use store::{CacheEntry, CacheEntryInfo, CacheKey, ResultCache};
