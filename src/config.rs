use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Rows per streamed chunk
    pub chunk_size: u32,
    /// Executions slower than this are counted and logged as slow
    pub slow_query_threshold_seconds: f64,
    /// History length that triggers a trim
    pub history_capacity: usize,
    /// Records kept after a trim
    pub history_retain: usize,
    /// LIMIT appended by the advisor
    pub default_limit: usize,
    pub cache: CacheConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            slow_query_threshold_seconds: 2.0,
            history_capacity: 1000,
            history_retain: 500,
            default_limit: 1000,
            cache: CacheConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_slow_query_threshold(mut self, seconds: f64) -> Self {
        self.slow_query_threshold_seconds = seconds;
        self
    }

    pub fn with_history(mut self, capacity: usize, retain: usize) -> Self {
        self.history_capacity = capacity;
        self.history_retain = retain;
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Read overrides from the environment
    /// SLUICE_CHUNK_SIZE=1000
    /// SLUICE_CACHE_MAX_ENTRIES=100
    /// SLUICE_CACHE_MAX_MEMORY_MB=100
    /// SLUICE_CACHE_TTL_SECS=300
    /// SLUICE_SLOW_QUERY_SECS=2.0
    /// SLUICE_HISTORY_CAPACITY=1000
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "SLUICE_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "SLUICE_CACHE_MAX_ENTRIES")? {
            config.cache.max_entries = v;
        }
        if let Some(raw) = lookup("SLUICE_CACHE_MAX_MEMORY_MB") {
            let bytes = raw
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|mb| mb.checked_mul(1024 * 1024));
            config.cache.max_memory_bytes = bytes.ok_or(ConfigError::InvalidValue {
                var: "SLUICE_CACHE_MAX_MEMORY_MB",
                value: raw,
            })?;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "SLUICE_CACHE_TTL_SECS")? {
            config.cache.ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = parse_var(&lookup, "SLUICE_SLOW_QUERY_SECS")? {
            config.slow_query_threshold_seconds = v;
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "SLUICE_HISTORY_CAPACITY")? {
            config.history_capacity = capacity;
            config.history_retain = (capacity / 2).max(1);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.history_retain == 0 || self.history_retain > self.history_capacity {
            return Err(ConfigError::Invalid(format!(
                "history retain ({}) must be between 1 and the capacity ({})",
                self.history_retain, self.history_capacity
            )));
        }
        if !self.slow_query_threshold_seconds.is_finite() || self.slow_query_threshold_seconds < 0.0 {
            return Err(ConfigError::Invalid(
                "slow query threshold must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Rows generated into the `demo_events` table at startup, 0 to skip
    pub demo_rows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            demo_rows: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_demo_rows(mut self, rows: usize) -> Self {
        self.demo_rows = rows;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// SLUICE_HOST=0.0.0.0
    /// SLUICE_PORT=8080
    /// SLUICE_DEMO_ROWS=10000
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = lookup("SLUICE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "SLUICE_PORT")? {
            config.port = port;
        }
        if let Some(rows) = parse_var(&lookup, "SLUICE_DEMO_ROWS")? {
            config.demo_rows = rows;
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.slow_query_threshold_seconds, 2.0);
        assert_eq!(config.cache.max_entries, 100);
    }

    #[test]
    fn test_env_overrides() {
        let config = ExecutorConfig::from_lookup(lookup(&[
            ("SLUICE_CHUNK_SIZE", "250"),
            ("SLUICE_CACHE_MAX_MEMORY_MB", "8"),
            ("SLUICE_CACHE_TTL_SECS", "30"),
            ("SLUICE_SLOW_QUERY_SECS", "0.5"),
            ("SLUICE_HISTORY_CAPACITY", "10"),
        ]))
        .unwrap();

        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.cache.max_memory_bytes, 8 * 1024 * 1024);
        assert_eq!(config.cache.ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.slow_query_threshold_seconds, 0.5);
        assert_eq!((config.history_capacity, config.history_retain), (10, 5));

        let server = ServerConfig::from_lookup(lookup(&[("SLUICE_PORT", "9090")])).unwrap();
        assert_eq!(server.addr(), "0.0.0.0:9090");

        let local = ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(3000)
            .with_demo_rows(0);
        assert_eq!(local.addr(), "127.0.0.1:3000");
        assert_eq!(local.demo_rows, 0);
    }

    #[test]
    fn test_invalid_values() {
        let err = ExecutorConfig::from_lookup(lookup(&[("SLUICE_CHUNK_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "SLUICE_CHUNK_SIZE", .. }));

        assert!(ExecutorConfig::from_lookup(lookup(&[("SLUICE_CHUNK_SIZE", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("SLUICE_PORT", "70000")])).is_err());
    }

    #[test]
    fn test_memory_budget_overflow_rejected() {
        let err = ExecutorConfig::from_lookup(lookup(&[(
            "SLUICE_CACHE_MAX_MEMORY_MB",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var: "SLUICE_CACHE_MAX_MEMORY_MB", .. }
        ));
    }

    #[test]
    fn test_single_record_history_keeps_one() {
        let config =
            ExecutorConfig::from_lookup(lookup(&[("SLUICE_HISTORY_CAPACITY", "1")])).unwrap();
        assert_eq!((config.history_capacity, config.history_retain), (1, 1));

        assert!(ExecutorConfig::default().with_history(10, 0).validate().is_err());
    }
}
