//! Sluice Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - SLUICE_HOST: Bind address (default: 0.0.0.0)
//! - SLUICE_PORT: Port number (default: 8080)
//! - SLUICE_DEMO_ROWS: Rows generated into `demo_events` (default: 10000, 0 to skip)
//! - SLUICE_CHUNK_SIZE: Rows per streamed chunk (default: 1000)
//! - SLUICE_CACHE_MAX_ENTRIES: Cached results kept (default: 100)
//! - SLUICE_CACHE_MAX_MEMORY_MB: Cache memory budget in MB (default: 100)
//! - SLUICE_CACHE_TTL_SECS: Cached result lifetime, 0 for none (default: none)
//! - SLUICE_SLOW_QUERY_SECS: Slow query threshold (default: 2.0)
//! - SLUICE_HISTORY_CAPACITY: Execution records kept (default: 1000)
//! - RUST_LOG: Log level (default: info)

use sluice::api::run_server;
use sluice::config::{ExecutorConfig, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = ServerConfig::from_env()?;
    let executor = ExecutorConfig::from_env()?;

    tracing::info!("Sluice configuration:");
    tracing::info!("  Host: {}", server.addr());
    tracing::info!("  Chunk size: {} rows", executor.chunk_size);
    tracing::info!(
        "  Cache: {} entries, {} MB",
        executor.cache.max_entries,
        executor.cache.max_memory_bytes / (1024 * 1024)
    );
    match executor.cache.ttl {
        Some(ttl) => tracing::info!("  Cache TTL: {} seconds", ttl.as_secs()),
        None => tracing::info!("  Cache TTL: disabled"),
    }
    tracing::info!(
        "  Slow query threshold: {} seconds",
        executor.slow_query_threshold_seconds
    );

    println!(
        r#"
   _____ _       _
  / ____| |     (_)
 | (___ | |_   _ _  ___ ___
  \___ \| | | | | |/ __/ _ \
  ____) | | |_| | | (_|  __/
 |_____/|_|\__,_|_|\___\___|

 Query Result Cache & Streaming Executor
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(server, executor).await
}
