use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sluice::cache::CacheConfig;
use sluice::config::ExecutorConfig;
use sluice::data::{Column, Table};
use sluice::db::{Database, DatabaseError, ResultHandle};
use sluice::executor::{QueryExecutor, StreamOptions, StreamStatus};
use sluice::query::ErrorCategory;

/// Database double: every query returns the same table, or a canned error,
/// and every call is counted.
#[derive(Default)]
struct ScriptedDatabase {
    table: Table,
    error: Option<String>,
    fetch_delay: Option<Duration>,
    /// Fail the pull with this index (0-based) with the given message
    fetch_failure: Option<(usize, String)>,
    executes: AtomicUsize,
    fetches: Arc<AtomicUsize>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedDatabase {
    fn rows(n: i64) -> Self {
        Self {
            table: Table::from_columns([
                ("id", Column::Int64((0..n).map(Some).collect())),
                (
                    "label",
                    Column::String((0..n).map(|i| Some(format!("row-{}", i))).collect()),
                ),
            ])
            .unwrap(),
            ..Default::default()
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn failing_fetch(rows: i64, pull: usize, message: &str) -> Self {
        Self {
            fetch_failure: Some((pull, message.to_string())),
            ..Self::rows(rows)
        }
    }

    fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }
}

struct ScriptedHandle {
    table: Table,
    offset: usize,
    delay: Option<Duration>,
    failure: Option<(usize, String)>,
    pulls: usize,
    fetches: Arc<AtomicUsize>,
}

impl ResultHandle for ScriptedHandle {
    fn fetch_chunk(&mut self, max_rows: u32) -> Result<Table, DatabaseError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let pull = self.pulls;
        self.pulls += 1;
        if let Some((fail_at, message)) = &self.failure {
            if pull == *fail_at {
                return Err(DatabaseError::new(message.clone()));
            }
        }
        let chunk = self.table.slice(self.offset, max_rows as usize);
        self.offset += chunk.num_rows();
        Ok(chunk)
    }
}

impl Database for ScriptedDatabase {
    fn execute(&self, sql: &str) -> Result<Box<dyn ResultHandle>, DatabaseError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(sql.to_string());
        if let Some(message) = &self.error {
            return Err(DatabaseError::new(message.clone()));
        }
        Ok(Box::new(ScriptedHandle {
            table: self.table.clone(),
            offset: 0,
            delay: self.fetch_delay,
            failure: self.fetch_failure.clone(),
            pulls: 0,
            fetches: Arc::clone(&self.fetches),
        }))
    }
}

fn executor_with(db: Arc<ScriptedDatabase>, config: ExecutorConfig) -> QueryExecutor {
    QueryExecutor::new(db, config)
}

fn chunk_sizes(executor: &QueryExecutor, sql: &str, chunk_size: u32) -> Vec<usize> {
    executor
        .execute_streaming(sql, StreamOptions::new().chunk_size(chunk_size))
        .unwrap()
        .map(|chunk| chunk.unwrap().num_rows())
        .collect()
}

#[test]
fn test_cache_hit_streams_without_database() {
    let db = Arc::new(ScriptedDatabase::rows(10));
    let executor = executor_with(db.clone(), ExecutorConfig::default());

    executor.execute_query("SELECT * FROM test").unwrap();
    assert_eq!(db.executes(), 1);

    assert_eq!(chunk_sizes(&executor, "SELECT * FROM test", 3), vec![3, 3, 3, 1]);
    assert_eq!(db.executes(), 1);
    assert_eq!(executor.get_statistics().cache.hits, 1);
}

#[test]
fn test_streaming_matches_eager_execution() {
    let db = Arc::new(ScriptedDatabase::rows(2500));
    let executor = executor_with(db, ExecutorConfig::default());

    let chunks: Vec<Table> = executor
        .execute_streaming(
            "SELECT * FROM big",
            StreamOptions::new().chunk_size(1000).use_cache(false),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(chunks.len(), 3);

    let eager = executor.execute_query("SELECT * FROM big").unwrap();
    assert_eq!(Table::concat(&chunks), eager);
    assert_eq!(eager.num_rows(), 2500);
}

#[test]
fn test_progress_callback_counts() {
    let db = Arc::new(ScriptedDatabase::rows(6));
    let executor = executor_with(db, ExecutorConfig::default());
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);

    let options = StreamOptions::new()
        .chunk_size(3)
        .on_progress(move |p| sink.lock().push((p.rows_fetched, p.chunks_fetched)));
    executor.execute_query_with("SELECT * FROM test", options).unwrap();

    assert_eq!(*reports.lock(), vec![(3, 1), (6, 2)]);
}

#[test]
fn test_cancel_from_another_thread() {
    let db = Arc::new(ScriptedDatabase {
        fetch_delay: Some(Duration::from_millis(20)),
        ..ScriptedDatabase::rows(1000)
    });
    let executor = Arc::new(executor_with(db.clone(), ExecutorConfig::default()));

    let mut stream = executor
        .execute_streaming("SELECT * FROM slow", StreamOptions::new().chunk_size(10))
        .unwrap();
    assert_eq!(stream.next().unwrap().unwrap().num_rows(), 10);

    let remote = Arc::clone(&executor);
    std::thread::spawn(move || remote.cancel_query())
        .join()
        .unwrap();

    let fetches_before = db.fetches.load(Ordering::SeqCst);
    assert!(stream.next().is_none());
    assert_eq!(db.fetches.load(Ordering::SeqCst), fetches_before);
    assert_eq!(stream.status(), StreamStatus::Cancelled);
    assert_eq!(stream.rows_yielded(), 10);

    let stats = executor.get_statistics();
    assert_eq!(stats.cache.entry_count, 0);
    assert_eq!(stats.queries.total_queries, 0);
}

#[test]
fn test_cancel_only_affects_in_flight_stream() {
    let db = Arc::new(ScriptedDatabase::rows(5));
    let executor = executor_with(db, ExecutorConfig::default());

    executor.cancel_query();
    let table = executor.execute_query("SELECT * FROM test").unwrap();
    assert_eq!(table.num_rows(), 5);
}

#[test]
fn test_errors_are_classified_with_suggestions() {
    let db = Arc::new(ScriptedDatabase::failing(
        "Catalog Error: Table with name users does not exist!",
    ));
    let executor = executor_with(db, ExecutorConfig::default());

    let err = executor.execute_query("SELECT * FROM users").unwrap_err();
    assert_eq!(
        err.category(),
        &ErrorCategory::TableNotFound {
            table: Some("users".into())
        }
    );
    let text = err.to_string();
    assert!(text.contains("Table not found"));
    assert!(text.contains("Suggestions:"));
    assert!(text.contains("SHOW TABLES"));

    let stats = executor.get_statistics();
    assert_eq!(stats.queries.total_queries, 0);
    assert_eq!(stats.cache.entry_count, 0);
}

#[test]
fn test_fetch_failure_ends_stream() {
    let db = Arc::new(ScriptedDatabase::failing_fetch(
        10,
        2,
        "Binder Error: Referenced column ghost not found in FROM clause!",
    ));
    let executor = executor_with(db.clone(), ExecutorConfig::default());

    let mut stream = executor
        .execute_streaming("SELECT * FROM test", StreamOptions::new().chunk_size(2))
        .unwrap();
    assert_eq!(stream.next().unwrap().unwrap().num_rows(), 2);
    assert_eq!(stream.next().unwrap().unwrap().num_rows(), 2);

    let err = stream.next().unwrap().unwrap_err();
    assert_eq!(
        err.category(),
        &ErrorCategory::ColumnNotFound {
            column: Some("ghost".into())
        }
    );
    assert!(err.to_string().contains("Suggestions:"));

    assert!(stream.next().is_none());
    assert_eq!(stream.status(), StreamStatus::Failed);
    assert_eq!(stream.rows_yielded(), 4);
    assert_eq!(db.fetches.load(Ordering::SeqCst), 3);

    let stats = executor.get_statistics();
    assert_eq!(stats.cache.entry_count, 0);
    assert_eq!(stats.queries.total_queries, 0);
    assert!(executor.history().is_empty());
}

#[test]
fn test_statistics_and_slow_queries() {
    let db = Arc::new(ScriptedDatabase {
        fetch_delay: Some(Duration::from_millis(30)),
        ..ScriptedDatabase::rows(4)
    });
    let config = ExecutorConfig::default().with_slow_query_threshold(0.05);
    let executor = executor_with(db, config);

    // 1 chunk of 4 rows plus the terminating empty fetch
    executor
        .execute_query_with("SELECT * FROM a", StreamOptions::new().chunk_size(10))
        .unwrap();
    // 4 chunks plus the terminating fetch
    executor
        .execute_query_with("SELECT * FROM b", StreamOptions::new().chunk_size(1))
        .unwrap();

    let stats = executor.get_statistics();
    assert_eq!(stats.queries.total_queries, 2);
    assert_eq!(stats.queries.slow_queries, 2);
    assert_eq!(stats.queries.total_rows_fetched, 8);
    assert!(stats.queries.avg_execution_time_seconds >= 0.05);
    assert_eq!(stats.slow_query_threshold_seconds, 0.05);
}

#[test]
fn test_clear_cache_by_pattern() {
    let db = Arc::new(ScriptedDatabase::rows(3));
    let executor = executor_with(db.clone(), ExecutorConfig::default());

    executor.execute_query("SELECT * FROM table1").unwrap();
    executor.execute_query("SELECT * FROM table2").unwrap();

    assert_eq!(executor.clear_cache(Some("table1")), 1);
    executor.execute_query("SELECT * FROM table2").unwrap();
    assert_eq!(db.executes(), 2);

    executor.execute_query("SELECT * FROM table1").unwrap();
    assert_eq!(db.executes(), 3);
    assert_eq!(executor.clear_cache(None), 2);
}

#[test]
fn test_cache_budget_limits_results() {
    let db = Arc::new(ScriptedDatabase::rows(100));
    let config = ExecutorConfig::default().with_cache(CacheConfig::new(2, 1024 * 1024));
    let executor = executor_with(db.clone(), config);

    for table in ["t1", "t2", "t3"] {
        executor.execute_query(&format!("SELECT * FROM {}", table)).unwrap();
    }
    let stats = executor.get_statistics();
    assert_eq!(stats.cache.entry_count, 2);
    assert_eq!(stats.cache.evictions, 1);

    // t1 was evicted and runs again
    executor.execute_query("SELECT * FROM t1").unwrap();
    assert_eq!(db.executes(), 4);
    assert_eq!(
        db.queries.lock().last().map(String::as_str),
        Some("SELECT * FROM t1")
    );
}

#[test]
fn test_estimate_and_optimize() {
    let db = Arc::new(ScriptedDatabase::rows(1));
    let executor = executor_with(db, ExecutorConfig::default());

    let (query, suggestions) = executor.optimize_query("SELECT * FROM large_table");
    assert!(query.contains("LIMIT"));
    assert!(suggestions.iter().any(|s| s.contains("LIMIT")));

    let joins = "SELECT * FROM a JOIN b ON a.x = b.x JOIN c ON b.x = c.x JOIN d ON c.x = d.x";
    let (_, suggestions) = executor.optimize_query(joins);
    assert!(suggestions.iter().any(|s| s.contains("JOIN")));

    let capped = executor_with(
        Arc::new(ScriptedDatabase::rows(1)),
        ExecutorConfig::default().with_default_limit(50),
    );
    let (query, _) = capped.optimize_query("SELECT id FROM events;");
    assert_eq!(query, "SELECT id FROM events LIMIT 50");

    let plain = executor.estimate_query_time("SELECT * FROM a");
    let complex = executor.estimate_query_time("SELECT a, COUNT(*) FROM a GROUP BY a ORDER BY a");
    assert!(complex > plain);
}
