use axum::{
    routing::{get, post},
    Router,
};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    cancel_query, clear_cache, drop_table, estimate, health_check, list_cache, list_tables,
    load_table, optimize, plan, query, query_stream, stats, AppState,
};
use crate::config::{ExecutorConfig, ServerConfig};
use crate::data::{Column, Table};
use crate::db::MemoryDatabase;
use crate::executor::QueryExecutor;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Query execution
        .route("/query", post(query))
        .route("/query/stream", post(query_stream))
        .route("/query/cancel", post(cancel_query))
        // Advisor
        .route("/estimate", post(estimate))
        .route("/optimize", post(optimize))
        .route("/plan", post(plan))
        // Cache
        .route("/cache", get(list_cache).delete(clear_cache))
        // Table management
        .route("/tables", get(list_tables))
        .route("/tables/:name", post(load_table).delete(drop_table))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Synthetic `demo_events` table so a fresh server has something to query
pub fn demo_table(rows: usize) -> Table {
    const EVENTS: &[&str] = &["click", "view", "purchase", "scroll", "submit"];
    const COUNTRIES: &[&str] = &["US", "UK", "DE", "FR", "JP", "BR", "IN"];

    let mut rng = rand::thread_rng();
    let now = chrono::Utc::now().timestamp_millis();

    let mut timestamps = Vec::with_capacity(rows);
    let mut events = Vec::with_capacity(rows);
    let mut countries = Vec::with_capacity(rows);
    let mut latencies = Vec::with_capacity(rows);
    for i in 0..rows {
        timestamps.push(Some(now - (i as i64) * 1000));
        events.push(Some(EVENTS[rng.gen_range(0..EVENTS.len())].to_string()));
        countries.push(Some(COUNTRIES[rng.gen_range(0..COUNTRIES.len())].to_string()));
        latencies.push(Some(rng.gen_range(5.0..500.0)));
    }

    Table::from_columns([
        ("timestamp", Column::Timestamp(timestamps)),
        ("event", Column::String(events)),
        ("country", Column::String(countries)),
        ("latency_ms", Column::Float64(latencies)),
    ])
    .unwrap_or_default()
}

/// Run the HTTP server
pub async fn run_server(
    server: ServerConfig,
    executor_config: ExecutorConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = Arc::new(MemoryDatabase::new());
    if server.demo_rows > 0 {
        database.register("demo_events", demo_table(server.demo_rows));
        tracing::info!("Loaded {} rows into demo_events", server.demo_rows);
    }

    let executor = Arc::new(QueryExecutor::new(database.clone(), executor_config));
    let state = Arc::new(AppState { executor, database });

    let app = build_router(state);

    let addr: SocketAddr = server.addr().parse()?;
    tracing::info!("Starting Sluice server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Sluice server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, Arc<AppState>) {
        let database = Arc::new(MemoryDatabase::new());
        database.register("demo_events", demo_table(25));
        let executor = Arc::new(QueryExecutor::new(
            database.clone(),
            ExecutorConfig::default().with_chunk_size(10),
        ));
        let state = Arc::new(AppState { executor, database });
        (build_router(Arc::clone(&state)), state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_query_then_cached() {
        let (app, state) = create_test_app();
        let request = serde_json::json!({ "sql": "SELECT event, country FROM demo_events" });

        let response = app
            .clone()
            .oneshot(post_json("/query", request.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await;
        assert_eq!(first["row_count"], 25);
        assert_eq!(first["from_cache"], false);
        assert_eq!(first["status"], "completed");

        let second = body_json(app.oneshot(post_json("/query", request)).await.unwrap()).await;
        assert_eq!(second["from_cache"], true);
        assert_eq!(second["rows"], first["rows"]);

        assert_eq!(state.executor.get_statistics().cache.hits, 1);
    }

    #[tokio::test]
    async fn test_stats_report_cache_memory() {
        let (app, state) = create_test_app();
        state.executor.execute_query("SELECT * FROM demo_events").unwrap();

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;

        let cache_bytes = state.executor.cache().memory_bytes();
        assert!(cache_bytes > 0);
        assert_eq!(body["cache"]["memory_bytes"], cache_bytes);
        assert_eq!(
            body["cache"]["memory_usage_mb"].as_f64().unwrap(),
            cache_bytes as f64 / (1024.0 * 1024.0)
        );
        assert_eq!(body["queries"]["total_queries"], 1);
    }

    #[tokio::test]
    async fn test_query_error_is_classified() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(post_json("/query", serde_json::json!({ "sql": "SELECT * FROM nope" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["category"], "table_not_found");
        assert!(body["error"].as_str().unwrap().contains("Suggestions:"));
    }

    #[tokio::test]
    async fn test_stream_ndjson() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(post_json(
                "/query/stream",
                serde_json::json!({ "sql": "SELECT * FROM demo_events", "chunk_size": 10 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        let sizes: Vec<usize> = lines[..lines.len() - 1]
            .iter()
            .map(|l| l["rows"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        let done = lines.last().unwrap();
        assert_eq!(done["done"], true);
        assert_eq!(done["status"], "completed");
        assert_eq!(done["rows"], 25);
    }

    #[tokio::test]
    async fn test_load_table_invalidates_cache() {
        let (app, state) = create_test_app();
        let rows = serde_json::json!({ "rows": [{ "id": 1 }, { "id": 2 }] });

        app.clone()
            .oneshot(post_json("/tables/items", rows))
            .await
            .unwrap();
        app.clone()
            .oneshot(post_json("/query", serde_json::json!({ "sql": "SELECT id FROM items" })))
            .await
            .unwrap();
        assert_eq!(state.executor.cache().len(), 1);

        let reload = serde_json::json!({ "rows": [{ "id": 3 }] });
        let body = body_json(app.oneshot(post_json("/tables/items", reload)).await.unwrap()).await;
        assert_eq!(body["replaced"], true);
        assert_eq!(body["invalidated"], 1);
        assert!(state.executor.cache().is_empty());
    }

    #[tokio::test]
    async fn test_optimize_and_clear_cache() {
        let (app, state) = create_test_app();

        let body = body_json(
            app.clone()
                .oneshot(post_json(
                    "/optimize",
                    serde_json::json!({ "sql": "SELECT * FROM large_table" }),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert!(body["query"].as_str().unwrap().ends_with("LIMIT 1000"));

        state.executor.execute_query("SELECT * FROM demo_events").unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/cache?pattern=demo_events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await["removed"], 1);
    }

    #[tokio::test]
    async fn test_plan() {
        let (app, _) = create_test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/plan",
                serde_json::json!({ "sql": "SELECT event FROM demo_events LIMIT 5" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["basic_plan"]
            .as_str()
            .unwrap()
            .contains("SEQ_SCAN demo_events (25 rows)"));
        assert!(body["analyze_plan"].as_str().unwrap().contains("Rows: 5"));
        assert!(body["estimated_time_seconds"].as_f64().unwrap() > 0.0);

        let response = app
            .oneshot(post_json("/plan", serde_json::json!({ "sql": "SELECT * FROM nope" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["category"], "table_not_found");
    }

    #[tokio::test]
    async fn test_drop_unknown_table() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/tables/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
