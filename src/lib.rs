//! Sluice: result cache and cancellable streaming executor for an embedded
//! analytical database.
//!
//! # Features
//!
//! - **Bounded Result Cache**: LRU eviction under an entry-count and a memory budget
//! - **Streaming Execution**: results pulled in fixed-size chunks, one at a time
//! - **Cooperative Cancellation**: checked between chunks, never mid-fetch
//! - **Error Classification**: raw engine errors mapped to categories with suggestions
//! - **Query Advisor**: heuristic time estimates and LIMIT/JOIN hints
//! - **Statistics**: cache hit rates plus slow-query and row counters
//!
//! # Example
//!
//! ```no_run
//! use sluice::config::ExecutorConfig;
//! use sluice::data::{Column, Table};
//! use sluice::db::MemoryDatabase;
//! use sluice::executor::{QueryExecutor, StreamOptions};
//! use std::sync::Arc;
//!
//! let db = Arc::new(MemoryDatabase::new());
//! db.register(
//!     "events",
//!     Table::from_columns([("id", Column::Int64((0..10).map(Some).collect()))]).unwrap(),
//! );
//!
//! let executor = QueryExecutor::new(db, ExecutorConfig::default());
//! for chunk in executor
//!     .execute_streaming("SELECT * FROM events", StreamOptions::new().chunk_size(3))
//!     .unwrap()
//! {
//!     println!("{} rows", chunk.unwrap().num_rows());
//! }
//! println!("{:?}", executor.get_statistics());
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod data;
pub mod db;
pub mod executor;
pub mod query;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use config::{ConfigError, ExecutorConfig, ServerConfig};
pub use data::{Column, DataType, Table, Value};
pub use db::{Database, DatabaseError, MemoryDatabase, ResultHandle};
pub use executor::{
    ExecutorStatistics, QueryError, QueryExecutor, QueryPlan, QueryStream, StreamOptions,
};
pub use query::ErrorCategory;
