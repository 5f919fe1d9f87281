//! Cache-aware streaming executor.
//!
//! A query first consults the result cache. A hit is replayed in chunks
//! without touching the database; a miss opens a result handle and pulls
//! chunks on demand. Only a stream that runs to completion writes the cache
//! and the execution history.

pub mod cancel;
pub mod error;
pub mod history;
pub mod stream;

pub use cancel::CancellationToken;
pub use error::QueryError;
pub use history::{ExecutionHistory, ExecutionRecord, QuerySummary};
pub use stream::{Progress, ProgressCallback, QueryStream, StreamOptions, StreamStatus};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::cache::{CacheKey, CacheStats, ResultCache};
use crate::config::ExecutorConfig;
use crate::data::{Table, Value};
use crate::db::{Database, DatabaseError};
use crate::query::{truncate_query, QueryAdvisor};
use stream::StreamContext;

/// Snapshot returned by [`QueryExecutor::get_statistics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorStatistics {
    pub cache: CacheStats,
    pub queries: QuerySummary,
    pub slow_query_threshold_seconds: f64,
}

/// Plans reported by the database for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub basic_plan: String,
    /// Plan annotated with actual rows and timing; the query runs to produce it
    pub analyze_plan: String,
    pub estimated_time_seconds: f64,
}

pub struct QueryExecutor {
    database: Arc<dyn Database>,
    cache: Arc<ResultCache>,
    history: Arc<ExecutionHistory>,
    token: Arc<CancellationToken>,
    advisor: QueryAdvisor,
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(database: Arc<dyn Database>, config: ExecutorConfig) -> Self {
        let cache = Arc::new(ResultCache::new(config.cache.clone()));
        let history = Arc::new(ExecutionHistory::new(
            config.history_capacity,
            config.history_retain,
        ));
        Self {
            database,
            cache,
            history,
            token: Arc::new(CancellationToken::new()),
            advisor: QueryAdvisor::new(config.default_limit),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn history(&self) -> &Arc<ExecutionHistory> {
        &self.history
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    fn context(&self) -> StreamContext {
        StreamContext {
            cache: Arc::clone(&self.cache),
            history: Arc::clone(&self.history),
            token: Arc::clone(&self.token),
            slow_query_threshold_seconds: self.config.slow_query_threshold_seconds,
        }
    }

    /// Start streaming `sql`. Opening the result happens here, so a query the
    /// database rejects fails before any chunk is requested.
    ///
    /// Starting a stream resets cancellation: a `cancel_query` issued earlier
    /// does not affect it.
    pub fn execute_streaming(
        &self,
        sql: &str,
        options: StreamOptions,
    ) -> Result<QueryStream, QueryError> {
        let generation = self.token.begin();
        let chunk_size = options.chunk_size.unwrap_or(self.config.chunk_size).max(1);
        let key = CacheKey::for_query(sql);
        let use_cache = options.use_cache;
        let stream = QueryStream::new(
            self.context(),
            sql,
            key.clone(),
            generation,
            options,
            chunk_size,
        );

        if use_cache {
            if let Some(table) = self.cache.get(&key) {
                info!(
                    key = %key,
                    rows = table.num_rows(),
                    "Cache hit - returning cached result"
                );
                return Ok(stream.with_cached(table));
            }
        }

        let started = Instant::now();
        let started_at = Utc::now();
        let handle = self.database.execute(sql).map_err(|e| {
            let err = QueryError::execution(sql, e);
            error!(
                category = err.category().name(),
                query = %truncate_query(sql, 100),
                "Query execution failed: {}",
                err.category().message()
            );
            err
        })?;

        Ok(stream.with_handle(handle, started, started_at))
    }

    /// Run `sql` to the end and return the whole result
    pub fn execute_query(&self, sql: &str) -> Result<Table, QueryError> {
        self.execute_query_with(sql, StreamOptions::default())
    }

    pub fn execute_query_with(
        &self,
        sql: &str,
        options: StreamOptions,
    ) -> Result<Table, QueryError> {
        self.execute_streaming(sql, options)?.collect_table()
    }

    /// Ask the in-flight stream to stop at its next chunk boundary
    pub fn cancel_query(&self) {
        info!("Cancellation requested");
        self.token.cancel();
    }

    pub fn estimate_query_time(&self, sql: &str) -> f64 {
        self.advisor.estimate_query_time(sql, &self.history)
    }

    /// `EXPLAIN` and `EXPLAIN ANALYZE` output plus the advisor's estimate.
    /// Bypasses the cache and the execution history.
    pub fn get_query_plan(&self, sql: &str) -> Result<QueryPlan, QueryError> {
        Ok(QueryPlan {
            basic_plan: self.explain(sql, "EXPLAIN")?,
            analyze_plan: self.explain(sql, "EXPLAIN ANALYZE")?,
            estimated_time_seconds: self.estimate_query_time(sql),
        })
    }

    /// Plan text sits in the second column of the first row
    fn explain(&self, sql: &str, prefix: &str) -> Result<String, QueryError> {
        let plan = self
            .database
            .execute(&format!("{} {}", prefix, sql))
            .and_then(|mut handle| handle.fetch_chunk(1))
            .and_then(|chunk| {
                chunk
                    .rows()
                    .next()
                    .and_then(|row| row.get(1).and_then(Value::as_str).map(str::to_string))
                    .ok_or_else(|| DatabaseError::new(format!("{} returned no plan", prefix)))
            });

        plan.map_err(|e| {
            let err = QueryError::execution(sql, e);
            error!(
                category = err.category().name(),
                query = %truncate_query(sql, 100),
                "Failed to get query plan: {}",
                err.category().message()
            );
            err
        })
    }

    pub fn optimize_query(&self, sql: &str) -> (String, Vec<String>) {
        let optimization = self.advisor.optimize_query(sql);
        (optimization.query, optimization.suggestions)
    }

    pub fn get_statistics(&self) -> ExecutorStatistics {
        ExecutorStatistics {
            cache: self.cache.stats(),
            queries: self.history.summary(self.config.slow_query_threshold_seconds),
            slow_query_threshold_seconds: self.config.slow_query_threshold_seconds,
        }
    }

    /// Drop cached results whose query text contains `pattern`, or all of them
    pub fn clear_cache(&self, pattern: Option<&str>) -> usize {
        let removed = self.cache.invalidate(pattern);
        info!(removed, pattern = pattern.unwrap_or("*"), "Cleared cache");
        removed
    }

    /// Zero the cache counters and forget execution history
    pub fn reset_statistics(&self) {
        self.cache.reset_stats();
        self.history.clear();
    }
}
