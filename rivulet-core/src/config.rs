//! Flat key/value configuration.
//!
//! Read once while a task compiles its operator graph; nothing re-reads it during
//! processing.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::StreamId;

/// Number of tasks (and default partition count of intermediate streams).
pub const JOB_PARTITIONS: &str = "job.partitions";
/// Task factory to instantiate, see [`TaskFactoryRegistry`](crate::task::TaskFactoryRegistry).
pub const TASK_CLASS: &str = "task.class";
/// Application runner to instantiate.
pub const APP_RUNNER_CLASS: &str = "app.runner.class";
/// Interval between periodic window/timer calls. `0` disables periodic calls.
pub const TASK_WINDOW_MS: &str = "task.window.ms";
/// How long closed ACCUMULATING panes (and late-arrival horizons) are kept.
pub const CLOSED_PANE_RETENTION_MS: &str = "window.closed-pane.retention.ms";

/// Key overriding the width (tumbling) or gap (session) of the named window operator.
pub fn window_width_key(op_name: &str) -> String {
    format!("window.{op_name}.width.ms")
}

/// Key holding the partition count of a stream.
pub fn stream_partitions_key(stream: &StreamId) -> String {
    format!("streams.{stream}.partitions")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    entries: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.entries.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// Parse the value under `key`. `Ok(None)` when absent.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, ConfigError> {
        self.get_parsed(key)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.get_parsed(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.get_parsed(key)
    }

    /// Millisecond value under `key` as a [`Duration`].
    pub fn get_duration_ms(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.get_u64(key)?.map(Duration::from_millis))
    }

    /// Partition count for `stream`, falling back to `job.partitions`, then 1.
    pub fn stream_partitions(&self, stream: &StreamId) -> Result<u32, ConfigError> {
        let key = stream_partitions_key(stream);
        let count = match self.get_u32(&key)? {
            Some(n) => n,
            None => self.get_u32(JOB_PARTITIONS)?.unwrap_or(1),
        };
        if count == 0 {
            return Err(ConfigError::Invalid {
                key,
                value: "0".to_string(),
                reason: "partition count must be positive".to_string(),
            });
        }
        Ok(count)
    }

    /// Entries under `prefix`, with the prefix stripped.
    pub fn subset(&self, prefix: &str) -> Config {
        self.entries
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let config = Config::new()
            .with(JOB_PARTITIONS, 4)
            .with(TASK_WINDOW_MS, "250")
            .with("debug", "true");
        assert_eq!(config.get_u32(JOB_PARTITIONS).unwrap(), Some(4));
        assert_eq!(
            config.get_duration_ms(TASK_WINDOW_MS).unwrap(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.get_bool("debug").unwrap(), Some(true));
        assert_eq!(config.get_u64("absent").unwrap(), None);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let config = Config::new().with(JOB_PARTITIONS, "four");
        match config.get_u32(JOB_PARTITIONS) {
            Err(ConfigError::Invalid { key, value, .. }) => {
                assert_eq!(key, JOB_PARTITIONS);
                assert_eq!(value, "four");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_require() {
        let config = Config::new().with(TASK_CLASS, "stream-operator");
        assert_eq!(config.require(TASK_CLASS).unwrap(), "stream-operator");
        assert_eq!(
            config.require(APP_RUNNER_CLASS),
            Err(ConfigError::Missing(APP_RUNNER_CLASS.to_string()))
        );
    }

    #[test]
    fn test_stream_partitions_fallback() {
        let stream = StreamId::new("repartitioned");
        assert_eq!(Config::new().stream_partitions(&stream).unwrap(), 1);

        let config = Config::new().with(JOB_PARTITIONS, 3);
        assert_eq!(config.stream_partitions(&stream).unwrap(), 3);

        let config = config.with(stream_partitions_key(&stream), 8);
        assert_eq!(config.stream_partitions(&stream).unwrap(), 8);

        let config = Config::new().with(JOB_PARTITIONS, 0);
        assert!(config.stream_partitions(&stream).is_err());
    }

    #[test]
    fn test_subset_strips_prefix() {
        let config: Config = [
            ("window.map-1.width.ms", "10"),
            ("window.closed-pane.retention.ms", "5"),
            ("task.window.ms", "1"),
        ]
        .into_iter()
        .collect();
        let windows = config.subset("window.");
        assert_eq!(windows.len(), 2);
        assert_eq!(windows.get("map-1.width.ms"), Some("10"));
        assert!(!windows.contains("task.window.ms"));
    }
}
