//! Runtime configuration
//!
//! Loaded from a TOML file, then overridden by `TRIBUTARY_*` environment
//! variables, then validated. Every section has defaults, so an empty file
//! (or no file at all) is a valid configuration.

use crate::error::{ConnectorError, ErrorCode, Result};
use crate::fs::PathFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "TRIBUTARY_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Number of parallel readers
    pub parallelism: usize,
    /// Splits handed out per answered request
    pub assignment_batch_size: usize,
    pub source: SourceConfig,
    pub discovery: DiscoveryConfig,
    pub reader: ReaderConfig,
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// File or directory to ingest
    pub path: Option<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub recursive: bool,
    /// Adjacent blocks are merged until a split reaches this many bytes
    pub min_split_size: u64,
    /// Block size reported by the local file system
    pub block_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Scan once, then report exhaustion
    OneShot,
    /// Rescan every `interval`; never exhausts
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Consecutive retries of a failing pass before discovery gives up
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    /// Records buffered per split between its fetcher and the reader
    pub fetch_queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Barrier interval; checkpointing is disabled when unset
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Where checkpoints are written; kept in memory when unset
    pub directory: Option<PathBuf>,
    /// Number of completed checkpoints kept on disk
    pub retained: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            assignment_batch_size: 1,
            source: SourceConfig::default(),
            discovery: DiscoveryConfig::default(),
            reader: ReaderConfig::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            include: Vec::new(),
            exclude: Vec::new(),
            recursive: true,
            min_split_size: 0,
            block_size: crate::fs::status::DEFAULT_LOCAL_BLOCK_SIZE,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::OneShot,
            interval: Duration::from_secs(10),
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            fetch_queue_capacity: 1024,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: None,
            directory: None,
            retained: 3,
        }
    }
}

impl RuntimeConfig {
    /// Load from `path` if given, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env_vars();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("cannot read configuration file {}", path.display()),
            )
            .with_source(e)
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn merge_env_vars(&mut self) {
        self.merge_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps full variable names to values
    pub fn merge_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(path) = var("SOURCE_PATH") {
            self.source.path = Some(PathBuf::from(path));
        }
        if let Some(value) = var("PARALLELISM").and_then(|v| v.parse().ok()) {
            self.parallelism = value;
        }
        if let Some(value) = var("ASSIGNMENT_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.assignment_batch_size = value;
        }
        if let Some(value) = var("FETCH_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.reader.fetch_queue_capacity = value;
        }
        if let Some(mode) = var("DISCOVERY_MODE") {
            match mode.as_str() {
                "one_shot" => self.discovery.mode = DiscoveryMode::OneShot,
                "continuous" => self.discovery.mode = DiscoveryMode::Continuous,
                other => debug!("Ignoring unknown discovery mode override '{}'", other),
            }
        }
        let interval = var("CHECKPOINT_INTERVAL")
            .and_then(|v| humantime_serde::re::humantime::parse_duration(&v).ok());
        if let Some(value) = interval {
            self.checkpoint.interval = Some(value);
        }
        if let Some(dir) = var("CHECKPOINT_DIR") {
            self.checkpoint.directory = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(message: impl Into<String>) -> ConnectorError {
            ConnectorError::config_with_code(ErrorCode::CONFIG_INVALID_VALUE, message)
        }

        if self.parallelism == 0 {
            return Err(invalid("parallelism must be at least 1"));
        }
        if self.assignment_batch_size == 0 {
            return Err(invalid("assignment_batch_size must be at least 1"));
        }
        if self.reader.fetch_queue_capacity == 0 {
            return Err(invalid("reader.fetch_queue_capacity must be at least 1"));
        }
        if self.source.block_size == 0 {
            return Err(invalid("source.block_size must be at least 1"));
        }
        if self.discovery.max_backoff < self.discovery.initial_backoff {
            return Err(invalid(
                "discovery.max_backoff must not be smaller than discovery.initial_backoff",
            ));
        }
        if self.discovery.mode == DiscoveryMode::Continuous && self.discovery.interval.is_zero() {
            return Err(invalid("discovery.interval must be positive in continuous mode"));
        }
        if matches!(self.checkpoint.interval, Some(interval) if interval.is_zero()) {
            return Err(invalid("checkpoint.interval must be positive"));
        }
        if self.checkpoint.retained == 0 {
            return Err(invalid("checkpoint.retained must be at least 1"));
        }

        PathFilter::from_patterns(&self.source.include, &self.source.exclude)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = RuntimeConfig::from_toml("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = RuntimeConfig::from_toml(
            r#"
            parallelism = 2
            assignment_batch_size = 3

            [source]
            path = "/data/in"
            include = ["*.log"]
            recursive = false
            min_split_size = 1024

            [discovery]
            mode = "continuous"
            interval = "30s"
            initial_backoff = "50ms"
            max_backoff = "2s"

            [reader]
            fetch_queue_capacity = 16

            [checkpoint]
            interval = "5s"
            directory = "/var/lib/tributary"
            retained = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.parallelism, 2);
        assert_eq!(config.source.path, Some(PathBuf::from("/data/in")));
        assert!(!config.source.recursive);
        assert_eq!(config.discovery.mode, DiscoveryMode::Continuous);
        assert_eq!(config.discovery.interval, Duration::from_secs(30));
        assert_eq!(config.discovery.initial_backoff, Duration::from_millis(50));
        assert_eq!(config.checkpoint.interval, Some(Duration::from_secs(5)));
        assert_eq!(config.checkpoint.retained, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = RuntimeConfig::from_toml("paralelism = 2").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_TOML);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TRIBUTARY_PARALLELISM", "8"),
            ("TRIBUTARY_SOURCE_PATH", "/tmp/in"),
            ("TRIBUTARY_DISCOVERY_MODE", "continuous"),
            ("TRIBUTARY_CHECKPOINT_INTERVAL", "250ms"),
            ("TRIBUTARY_FETCH_QUEUE_CAPACITY", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = RuntimeConfig::default();
        config.merge_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.parallelism, 8);
        assert_eq!(config.source.path, Some(PathBuf::from("/tmp/in")));
        assert_eq!(config.discovery.mode, DiscoveryMode::Continuous);
        assert_eq!(config.checkpoint.interval, Some(Duration::from_millis(250)));
        assert_eq!(config.reader.fetch_queue_capacity, 1024);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RuntimeConfig::default();
        config.parallelism = 0;
        assert_eq!(
            config.validate().unwrap_err().code(),
            ErrorCode::CONFIG_INVALID_VALUE
        );

        let mut config = RuntimeConfig::default();
        config.discovery.initial_backoff = Duration::from_secs(5);
        config.discovery.max_backoff = Duration::from_secs(1);
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.source.exclude = vec!["[oops".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuntimeConfig::load(Some(Path::new("/no/such/tributary.toml"))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    }
}
