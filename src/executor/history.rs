//! Bounded log of completed executions

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// One completed, uncached, non-cancelled execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub started_at: DateTime<Utc>,
    pub execution_time_seconds: f64,
    pub rows_fetched: u64,
    /// Literal-free form of the query, see [`crate::query::shape_signature`]
    pub shape: String,
}

impl ExecutionRecord {
    pub fn new(
        started_at: DateTime<Utc>,
        execution_time_seconds: f64,
        rows_fetched: u64,
        shape: impl Into<String>,
    ) -> Self {
        Self {
            started_at,
            execution_time_seconds,
            rows_fetched,
            shape: shape.into(),
        }
    }
}

/// Aggregates over the history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySummary {
    pub total_queries: usize,
    pub slow_queries: usize,
    pub avg_execution_time_seconds: f64,
    pub total_rows_fetched: u64,
}

/// Append-only history. Once `capacity` is exceeded the buffer drops to the
/// newest `retain` records in one step; at least one record always survives.
#[derive(Debug)]
pub struct ExecutionHistory {
    records: Mutex<VecDeque<ExecutionRecord>>,
    capacity: usize,
    retain: usize,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(1000, 500)
    }
}

impl ExecutionHistory {
    pub fn new(capacity: usize, retain: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            retain: retain.clamp(1, capacity),
        }
    }

    pub fn record(&self, record: ExecutionRecord) {
        let mut records = self.records.lock();
        records.push_back(record);
        if records.len() > self.capacity {
            let excess = records.len() - self.retain;
            records.drain(..excess);
            tracing::debug!(retained = records.len(), "Trimmed execution history");
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Execution times of the newest `n` records, oldest first
    pub fn recent_times(&self, n: usize) -> Vec<f64> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(n);
        records
            .iter()
            .skip(skip)
            .map(|r| r.execution_time_seconds)
            .collect()
    }

    /// Execution times of records with the given shape, oldest first
    pub fn times_for_shape(&self, shape: &str) -> Vec<f64> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.shape == shape)
            .map(|r| r.execution_time_seconds)
            .collect()
    }

    /// Counts and averages; a record is slow when strictly above `slow_threshold_seconds`
    pub fn summary(&self, slow_threshold_seconds: f64) -> QuerySummary {
        let records = self.records.lock();
        let total_queries = records.len();
        if total_queries == 0 {
            return QuerySummary::default();
        }

        let total_time: f64 = records.iter().map(|r| r.execution_time_seconds).sum();
        QuerySummary {
            total_queries,
            slow_queries: records
                .iter()
                .filter(|r| r.execution_time_seconds > slow_threshold_seconds)
                .count(),
            avg_execution_time_seconds: total_time / total_queries as f64,
            total_rows_fetched: records.iter().map(|r| r.rows_fetched).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(secs: f64, rows: u64) -> ExecutionRecord {
        ExecutionRecord::new(Utc::now(), secs, rows, "select * from t")
    }

    #[test]
    fn test_summary() {
        let history = ExecutionHistory::default();
        assert_eq!(history.summary(2.0), QuerySummary::default());

        history.record(record(0.5, 100));
        history.record(record(3.0, 1000));

        let summary = history.summary(2.0);
        assert_eq!(summary.total_queries, 2);
        assert_eq!(summary.slow_queries, 1);
        assert!((summary.avg_execution_time_seconds - 1.75).abs() < 1e-9);
        assert_eq!(summary.total_rows_fetched, 1100);
    }

    #[test]
    fn test_trim_keeps_newest() {
        let history = ExecutionHistory::new(4, 2);
        for i in 0..5 {
            history.record(record(i as f64, i));
        }
        // Fifth insert overflows capacity 4 and trims to the newest 2
        assert_eq!(history.recent_times(10), vec![3.0, 4.0]);

        history.record(record(5.0, 5));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_trim_never_empties() {
        let history = ExecutionHistory::new(1, 0);
        history.record(record(1.0, 1));
        history.record(record(2.0, 2));

        assert_eq!(history.len(), 1);
        assert_eq!(history.recent_times(5), vec![2.0]);
        assert_eq!(history.summary(10.0).total_rows_fetched, 2);
    }

    #[test]
    fn test_shape_and_recent_lookup() {
        let history = ExecutionHistory::default();
        history.record(ExecutionRecord::new(Utc::now(), 1.0, 1, "a"));
        history.record(ExecutionRecord::new(Utc::now(), 2.0, 1, "b"));
        history.record(ExecutionRecord::new(Utc::now(), 3.0, 1, "a"));

        assert_eq!(history.times_for_shape("a"), vec![1.0, 3.0]);
        assert!(history.times_for_shape("c").is_empty());
        assert_eq!(history.recent_times(2), vec![2.0, 3.0]);

        history.clear();
        assert!(history.is_empty());
    }
}
