use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::CacheEntryInfo;
use crate::data::{Table, Value};
use crate::db::MemoryDatabase;
use crate::executor::{
    ExecutorStatistics, QueryError, QueryExecutor, QueryPlan, StreamOptions, StreamStatus,
};

/// Application state shared across handlers
pub struct AppState {
    pub executor: Arc<QueryExecutor>,
    pub database: Arc<MemoryDatabase>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Query
// ============================================================================

#[derive(Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default)]
    pub chunk_size: Option<u32>,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

impl QueryRequest {
    fn options(&self) -> StreamOptions {
        let options = StreamOptions::new().use_cache(self.use_cache);
        match self.chunk_size {
            Some(rows) => options.chunk_size(rows),
            None => options,
        }
    }
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub from_cache: bool,
    pub status: StreamStatus,
    pub execution_time_ms: u64,
}

fn json_rows(table: &Table) -> Vec<Vec<serde_json::Value>> {
    table
        .rows()
        .map(|row| row.iter().map(Value::to_json).collect())
        .collect()
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let executor = Arc::clone(&state.executor);
    let started = Instant::now();

    let (table, from_cache, status) = tokio::task::spawn_blocking(move || {
        let mut stream = executor.execute_streaming(&request.sql, request.options())?;
        let chunks = stream.by_ref().collect::<Result<Vec<_>, _>>()?;
        Ok::<_, QueryError>((Table::concat(&chunks), stream.from_cache(), stream.status()))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let rows = json_rows(&table);
    Ok(Json(QueryResponse {
        columns: table.column_names().to_vec(),
        row_count: rows.len(),
        rows,
        from_cache,
        status,
        execution_time_ms: started.elapsed().as_millis() as u64,
    }))
}

/// One NDJSON line of a streamed query
#[derive(Serialize)]
#[serde(untagged)]
enum StreamLine {
    Chunk {
        chunk: u64,
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    Error {
        error: String,
        category: &'static str,
    },
    Done {
        done: bool,
        status: StreamStatus,
        rows: u64,
        from_cache: bool,
    },
}

impl StreamLine {
    fn encode(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": e.to_string() }).to_string()
        });
        line.push('\n');
        line
    }
}

/// Stream chunks as newline-delimited JSON. The executor runs on a blocking
/// task and hands over one line per chunk; a slow client applies backpressure.
pub async fn query_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let executor = Arc::clone(&state.executor);
    let (tx, rx) = tokio::sync::mpsc::channel::<String>(4);

    let stream = tokio::task::spawn_blocking(move || {
        executor.execute_streaming(&request.sql, request.options())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    tokio::task::spawn_blocking(move || {
        let mut stream = stream;
        let mut index = 0;
        for item in stream.by_ref() {
            let line = match item {
                Ok(chunk) => {
                    index += 1;
                    StreamLine::Chunk {
                        chunk: index,
                        columns: chunk.column_names().to_vec(),
                        rows: json_rows(&chunk),
                    }
                }
                Err(e) => StreamLine::Error {
                    category: e.category().name(),
                    error: e.to_string(),
                },
            };
            if tx.blocking_send(line.encode()).is_err() {
                tracing::info!("Stream client went away");
                return;
            }
        }

        let done = StreamLine::Done {
            done: true,
            status: stream.status(),
            rows: stream.rows_yielded(),
            from_cache: stream.from_cache(),
        };
        let _ = tx.blocking_send(done.encode());
    });

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok::<_, std::convert::Infallible>(line), rx))
    });

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body),
    )
        .into_response())
}

pub async fn cancel_query(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.executor.cancel_query();
    Json(serde_json::json!({ "cancelled": true }))
}

// ============================================================================
// Advisor
// ============================================================================

#[derive(Deserialize)]
pub struct SqlRequest {
    pub sql: String,
}

#[derive(Serialize)]
pub struct EstimateResponse {
    pub estimated_seconds: f64,
}

pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SqlRequest>,
) -> Json<EstimateResponse> {
    Json(EstimateResponse {
        estimated_seconds: state.executor.estimate_query_time(&request.sql),
    })
}

#[derive(Serialize)]
pub struct OptimizeResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}

pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SqlRequest>,
) -> Json<OptimizeResponse> {
    let (query, suggestions) = state.executor.optimize_query(&request.sql);
    Json(OptimizeResponse { query, suggestions })
}

/// EXPLAIN ANALYZE executes the query, so planning runs off the async workers
pub async fn plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SqlRequest>,
) -> Result<Json<QueryPlan>, ApiError> {
    let executor = Arc::clone(&state.executor);
    let plan = tokio::task::spawn_blocking(move || executor.get_query_plan(&request.sql))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(plan))
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Deserialize)]
pub struct ClearCacheParams {
    #[serde(default)]
    pub pattern: Option<String>,
}

pub async fn list_cache(State(state): State<Arc<AppState>>) -> Json<Vec<CacheEntryInfo>> {
    Json(state.executor.cache().entries())
}

pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClearCacheParams>,
) -> Json<serde_json::Value> {
    let pattern = params.pattern.as_deref().filter(|p| !p.is_empty());
    let removed = state.executor.clear_cache(pattern);
    Json(serde_json::json!({ "removed": removed }))
}

// ============================================================================
// Table Management
// ============================================================================

#[derive(Serialize)]
pub struct TablesResponse {
    pub tables: Vec<TableInfo>,
}

#[derive(Serialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: usize,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

pub async fn list_tables(State(state): State<Arc<AppState>>) -> Json<TablesResponse> {
    let tables = state
        .database
        .table_names()
        .into_iter()
        .filter_map(|name| {
            let table = state.database.table(&name)?;
            Some(TableInfo {
                row_count: table.num_rows(),
                columns: table
                    .schema()
                    .into_iter()
                    .map(|(name, dtype)| ColumnInfo {
                        name,
                        data_type: dtype.to_string(),
                    })
                    .collect(),
                name,
            })
        })
        .collect();

    Json(TablesResponse { tables })
}

#[derive(Deserialize)]
pub struct LoadTableRequest {
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Serialize)]
pub struct LoadTableResponse {
    pub table: String,
    pub rows: usize,
    pub replaced: bool,
    /// Cached results dropped because their query mentions the table
    pub invalidated: usize,
}

pub async fn load_table(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<LoadTableRequest>,
) -> Result<Json<LoadTableResponse>, ApiError> {
    if request.rows.is_empty() {
        return Err(ApiError::BadRequest("rows must not be empty".into()));
    }

    let table = Table::from_json_rows(&request.rows);
    let rows = table.num_rows();
    let replaced = state.database.register(name.clone(), table).is_some();
    let invalidated = state.executor.clear_cache(Some(&name));

    Ok(Json(LoadTableResponse {
        table: name,
        rows,
        replaced,
        invalidated,
    }))
}

pub async fn drop_table(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.database.drop_table(&name) {
        return Err(ApiError::NotFound(format!("Table '{}' not found", name)));
    }
    let invalidated = state.executor.clear_cache(Some(&name));

    Ok(Json(serde_json::json!({ "dropped": name, "invalidated": invalidated })))
}

// ============================================================================
// Stats
// ============================================================================

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<ExecutorStatistics> {
    Json(state.executor.get_statistics())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = serde_json::json!({
            "error": self.to_string()
        });
        if let ApiError::Query(e) = &self {
            body["category"] = serde_json::json!(e.category().name());
        }

        (status, Json(body)).into_response()
    }
}
