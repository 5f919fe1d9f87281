//! Pull-based chunk stream returned by [`QueryExecutor::execute_streaming`].
//!
//! [`QueryExecutor::execute_streaming`]: super::QueryExecutor::execute_streaming

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::cancel::CancellationToken;
use super::error::QueryError;
use super::history::{ExecutionHistory, ExecutionRecord};
use crate::cache::{CacheKey, ResultCache};
use crate::data::Table;
use crate::db::ResultHandle;
use crate::query::{shape_signature, truncate_query};

/// Cumulative counters passed to the progress callback after each fetched chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub rows_fetched: u64,
    pub chunks_fetched: u64,
    pub elapsed: Duration,
}

pub type ProgressCallback = Box<dyn FnMut(&Progress) + Send>;

/// Per-call streaming options
pub struct StreamOptions {
    /// Rows per chunk; the executor default when unset
    pub chunk_size: Option<u32>,
    pub progress: Option<ProgressCallback>,
    /// When false the cache is neither read nor written
    pub use_cache: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: None,
            progress: None,
            use_cache: true,
        }
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("chunk_size", &self.chunk_size)
            .field("progress", &self.progress.is_some())
            .field("use_cache", &self.use_cache)
            .finish()
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, rows: u32) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(&Progress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }
}

/// Where a stream stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Streaming,
    /// Every row was yielded
    Completed,
    /// Stopped early by `cancel_query`; the rows yielded so far are valid
    Cancelled,
    Failed,
}

/// State shared by every stream of one executor
#[derive(Clone)]
pub(super) struct StreamContext {
    pub cache: Arc<ResultCache>,
    pub history: Arc<ExecutionHistory>,
    pub token: Arc<CancellationToken>,
    pub slow_query_threshold_seconds: f64,
}

struct Fetch {
    handle: Box<dyn ResultHandle>,
    /// Copies of yielded chunks, kept only when the result will be cached
    chunks: Vec<Table>,
    rows_fetched: u64,
    chunks_fetched: u64,
    started: Instant,
    started_at: DateTime<Utc>,
}

enum State {
    Cached { table: Arc<Table>, offset: usize },
    Fetching(Fetch),
    Done,
}

/// Finite, non-restartable iterator of result chunks.
///
/// Cancellation is checked before every pull, so after `cancel_query` no
/// further chunk is requested from the database.
pub struct QueryStream {
    sql: String,
    key: CacheKey,
    generation: u64,
    chunk_size: u32,
    use_cache: bool,
    progress: Option<ProgressCallback>,
    ctx: StreamContext,
    state: State,
    status: StreamStatus,
    from_cache: bool,
    rows_yielded: u64,
}

impl QueryStream {
    pub(super) fn with_cached(mut self, table: Arc<Table>) -> Self {
        self.state = State::Cached { table, offset: 0 };
        self.from_cache = true;
        self
    }

    pub(super) fn with_handle(
        mut self,
        handle: Box<dyn ResultHandle>,
        started: Instant,
        started_at: DateTime<Utc>,
    ) -> Self {
        self.state = State::Fetching(Fetch {
            handle,
            chunks: Vec::new(),
            rows_fetched: 0,
            chunks_fetched: 0,
            started,
            started_at,
        });
        self
    }

    pub(super) fn new(
        ctx: StreamContext,
        sql: &str,
        key: CacheKey,
        generation: u64,
        options: StreamOptions,
        chunk_size: u32,
    ) -> Self {
        Self {
            sql: sql.to_string(),
            key,
            generation,
            chunk_size,
            use_cache: options.use_cache,
            progress: options.progress,
            ctx,
            state: State::Done,
            status: StreamStatus::Streaming,
            from_cache: false,
            rows_yielded: 0,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Whether the chunks come from the result cache
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn rows_yielded(&self) -> u64 {
        self.rows_yielded
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Drain the rest of the stream into one table
    pub fn collect_table(self) -> Result<Table, QueryError> {
        let chunks = self.collect::<Result<Vec<_>, _>>()?;
        Ok(Table::concat(&chunks))
    }

    fn finish(&mut self, status: StreamStatus) {
        self.state = State::Done;
        self.status = status;
    }

    fn next_cached(&mut self) -> Option<Table> {
        let State::Cached { table, offset } = &mut self.state else {
            return None;
        };
        let chunk = table.slice(*offset, self.chunk_size as usize);
        if chunk.is_empty() {
            self.finish(StreamStatus::Completed);
            return None;
        }
        *offset += chunk.num_rows();
        Some(chunk)
    }

    fn next_fetched(&mut self) -> Option<Result<Table, QueryError>> {
        let State::Fetching(fetch) = &mut self.state else {
            return None;
        };

        debug!(chunk_size = self.chunk_size, "Pulling chunk");
        match fetch.handle.fetch_chunk(self.chunk_size) {
            Ok(chunk) if chunk.is_empty() => {
                if let State::Fetching(fetch) = std::mem::replace(&mut self.state, State::Done) {
                    self.complete(fetch);
                }
                None
            }
            Ok(chunk) => {
                fetch.rows_fetched += chunk.num_rows() as u64;
                fetch.chunks_fetched += 1;
                if self.use_cache {
                    fetch.chunks.push(chunk.clone());
                }
                if let Some(callback) = self.progress.as_mut() {
                    callback(&Progress {
                        rows_fetched: fetch.rows_fetched,
                        chunks_fetched: fetch.chunks_fetched,
                        elapsed: fetch.started.elapsed(),
                    });
                }
                Some(Ok(chunk))
            }
            Err(e) => {
                let err = QueryError::execution(&self.sql, e);
                error!(
                    category = err.category().name(),
                    query = %truncate_query(&self.sql, 100),
                    "Query execution failed: {}",
                    err.category().message()
                );
                self.finish(StreamStatus::Failed);
                Some(Err(err))
            }
        }
    }

    fn complete(&mut self, fetch: Fetch) {
        let elapsed = fetch.started.elapsed().as_secs_f64();
        self.status = StreamStatus::Completed;

        if self.use_cache {
            let result = Table::concat(&fetch.chunks);
            self.ctx.cache.put(self.key.clone(), result, &self.sql);
        }

        if elapsed > self.ctx.slow_query_threshold_seconds {
            warn!(
                elapsed_secs = elapsed,
                rows = fetch.rows_fetched,
                "Slow query detected: {}",
                truncate_query(&self.sql, 100)
            );
        }

        self.ctx.history.record(ExecutionRecord::new(
            fetch.started_at,
            elapsed,
            fetch.rows_fetched,
            shape_signature(&self.sql),
        ));
        info!(
            rows = fetch.rows_fetched,
            chunks = fetch.chunks_fetched,
            elapsed_secs = elapsed,
            "Query completed"
        );
    }
}

impl Iterator for QueryStream {
    type Item = Result<Table, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, State::Done) {
            return None;
        }

        if self.ctx.token.is_cancelled(self.generation) {
            info!(rows = self.rows_yielded, "Query cancelled");
            self.finish(StreamStatus::Cancelled);
            return None;
        }

        let item = match self.state {
            State::Cached { .. } => self.next_cached().map(Ok),
            State::Fetching(_) => self.next_fetched(),
            State::Done => None,
        };
        if let Some(Ok(chunk)) = &item {
            self.rows_yielded += chunk.num_rows() as u64;
        }
        item
    }
}

impl fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStream")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("chunk_size", &self.chunk_size)
            .field("status", &self.status)
            .field("from_cache", &self.from_cache)
            .field("rows_yielded", &self.rows_yielded)
            .finish()
    }
}
