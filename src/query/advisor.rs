//! Heuristic time estimates and static query suggestions.
//!
//! Nothing here executes or validates a query. `sqlparser` is only used to
//! look for a top-level LIMIT; text that does not parse falls back to
//! keyword matching.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::OnceLock;

use super::normalize::shape_signature;
use crate::executor::ExecutionHistory;

const BASE_COST_SECONDS: f64 = 0.1;
const JOIN_COST: f64 = 2.0;
const GROUP_BY_COST: f64 = 1.5;
const ORDER_BY_COST: f64 = 1.0;
const WINDOW_COST: f64 = 2.5;

/// Records considered when no same-shape history exists
const RECENT_WINDOW: usize = 5;
/// JOIN count at which a join-order hint is emitted
const JOIN_WARN_THRESHOLD: usize = 3;

struct Keywords {
    join: Regex,
    group_by: Regex,
    order_by: Regex,
    window: Regex,
    where_clause: Regex,
    select_star: Regex,
    leading: Regex,
    limit: Regex,
}

fn keywords() -> &'static Keywords {
    static KEYWORDS: OnceLock<Keywords> = OnceLock::new();
    KEYWORDS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("valid advisor regex");
        Keywords {
            join: re(r"(?i)\bjoin\b"),
            group_by: re(r"(?i)\bgroup\s+by\b"),
            order_by: re(r"(?i)\border\s+by\b"),
            window: re(r"(?i)\bover\s*\(|\bwindow\b"),
            where_clause: re(r"(?i)\bwhere\b"),
            select_star: re(r"(?i)\bselect\s+(?:distinct\s+)?\*"),
            leading: re(r"(?i)^\s*\(*\s*(select|with)\b"),
            limit: re(r"(?i)\blimit\s+\S+\s*(?:offset\s+\S+\s*)?$"),
        }
    })
}

/// Rewritten query plus the hints that applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    pub query: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryAdvisor {
    default_limit: usize,
}

impl Default for QueryAdvisor {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl QueryAdvisor {
    pub fn new(default_limit: usize) -> Self {
        Self { default_limit }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Cost from query structure alone
    pub fn heuristic_seconds(&self, sql: &str) -> f64 {
        let kw = keywords();
        let mut score = 0.0;
        if kw.join.is_match(sql) {
            score += JOIN_COST;
        }
        if kw.group_by.is_match(sql) {
            score += GROUP_BY_COST;
        }
        if kw.order_by.is_match(sql) {
            score += ORDER_BY_COST;
        }
        if kw.window.is_match(sql) {
            score += WINDOW_COST;
        }
        BASE_COST_SECONDS * (1.0 + score)
    }

    /// Estimated execution time in seconds.
    ///
    /// With history, the heuristic is averaged with the recency-weighted mean
    /// of same-shape executions, or with the mean of the last few records when
    /// this shape has never run.
    pub fn estimate_query_time(&self, sql: &str, history: &ExecutionHistory) -> f64 {
        let heuristic = self.heuristic_seconds(sql);

        let same_shape = history.times_for_shape(&shape_signature(sql));
        let observed = if same_shape.is_empty() {
            mean(&history.recent_times(RECENT_WINDOW))
        } else {
            recency_weighted_mean(&same_shape)
        };

        match observed {
            Some(observed) => (heuristic + observed) / 2.0,
            None => heuristic,
        }
    }

    pub fn optimize_query(&self, sql: &str) -> Optimization {
        let kw = keywords();
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        let mut query = trimmed.to_string();
        let mut suggestions = Vec::new();

        if kw.leading.is_match(trimmed) && !has_top_level_limit(trimmed) {
            query = format!("{} LIMIT {}", trimmed, self.default_limit);
            suggestions.push(format!(
                "Consider adding a LIMIT clause to bound the result size (added LIMIT {})",
                self.default_limit
            ));
        }

        if kw.where_clause.is_match(trimmed) {
            suggestions.push("Ensure columns in WHERE clause are indexed".to_string());
        }

        if kw.select_star.is_match(trimmed) {
            suggestions
                .push("Consider selecting only required columns instead of SELECT *".to_string());
        }

        if kw.join.find_iter(trimmed).count() >= JOIN_WARN_THRESHOLD {
            suggestions.push("Consider optimizing JOIN order - smallest tables first".to_string());
        }

        Optimization { query, suggestions }
    }
}

fn has_top_level_limit(sql: &str) -> bool {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => match statements.as_slice() {
            [Statement::Query(query)] => query.limit.is_some() || query.fetch.is_some(),
            _ => true,
        },
        Err(_) => keywords().limit.is_match(sql),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Weighted mean where the i-th oldest value has weight i + 1
fn recency_weighted_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let (weighted, weights) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, total), (i, v)| {
            let w = (i + 1) as f64;
            (sum + w * v, total + w)
        });
    Some(weighted / weights)
}
