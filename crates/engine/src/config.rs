//! Engine configuration via `tablestore.toml`
//!
//! Every field has a default, so an empty file (or no file) gives the
//! Table service's published limits. Configuration is passed into the
//! coordinator explicitly; nothing here is process-wide.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use tablestore_core::{Limits, TableError, TableResult};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tablestore.toml";

/// Engine configuration loaded from `tablestore.toml`.
///
/// # Example
///
/// ```toml
/// max_operations_per_changeset = 100
/// lock_timeout_ms = 30000
/// reject_duplicate_entities = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum operations in one change-set
    pub max_operations_per_changeset: usize,
    /// Maximum PartitionKey / RowKey length in bytes
    pub max_key_bytes: usize,
    /// Maximum user properties per entity
    pub max_properties: usize,
    /// Maximum string property size in bytes
    pub max_string_bytes: usize,
    /// Maximum binary property size in bytes
    pub max_binary_bytes: usize,
    /// Maximum entity size in bytes
    pub max_entity_bytes: usize,
    /// Partition lock wait in milliseconds; 0 waits indefinitely
    pub lock_timeout_ms: u64,
    /// Reject change-sets that target one entity twice
    pub reject_duplicate_entities: bool,
    /// Batch worker pool threads
    pub worker_threads: usize,
    /// Batches the worker pool queues before refusing more
    pub max_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_operations_per_changeset: limits.max_operations_per_changeset,
            max_key_bytes: limits.max_key_bytes,
            max_properties: limits.max_properties,
            max_string_bytes: limits.max_string_bytes,
            max_binary_bytes: limits.max_binary_bytes,
            max_entity_bytes: limits.max_entity_bytes,
            lock_timeout_ms: 30_000,
            reject_duplicate_entities: true,
            worker_threads: 4,
            max_queue_depth: 1024,
        }
    }
}

impl EngineConfig {
    /// Config with small limits for testing
    pub fn with_small_limits() -> Self {
        Self::default().with_limits(Limits::with_small_limits())
    }

    /// Replace the payload and change-set limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.max_operations_per_changeset = limits.max_operations_per_changeset;
        self.max_key_bytes = limits.max_key_bytes;
        self.max_properties = limits.max_properties;
        self.max_string_bytes = limits.max_string_bytes;
        self.max_binary_bytes = limits.max_binary_bytes;
        self.max_entity_bytes = limits.max_entity_bytes;
        self
    }

    /// Limits for the validator
    pub fn limits(&self) -> Limits {
        Limits {
            max_operations_per_changeset: self.max_operations_per_changeset,
            max_key_bytes: self.max_key_bytes,
            max_properties: self.max_properties,
            max_string_bytes: self.max_string_bytes,
            max_binary_bytes: self.max_binary_bytes,
            max_entity_bytes: self.max_entity_bytes,
        }
    }

    /// Partition lock wait, `None` for unbounded
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
    }

    /// Check values that have no sensible zero
    ///
    /// # Errors
    ///
    /// `TableError::Config` naming the first offending field.
    pub fn validate(&self) -> TableResult<()> {
        let nonzero = [
            ("max_operations_per_changeset", self.max_operations_per_changeset),
            ("max_key_bytes", self.max_key_bytes),
            ("max_entity_bytes", self.max_entity_bytes),
            ("worker_threads", self.worker_threads),
            ("max_queue_depth", self.max_queue_depth),
        ];
        match nonzero.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(TableError::Config(format!(
                "'{}' in {} must be greater than zero",
                name, CONFIG_FILE_NAME
            ))),
            None => Ok(()),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Table batch engine configuration

# Maximum operations in one change-set (default: 100)
max_operations_per_changeset = 100

# Entity limits, in bytes unless noted
max_key_bytes = 1024
max_properties = 252            # user properties per entity
max_string_bytes = 65536
max_binary_bytes = 65536
max_entity_bytes = 1048576

# How long a batch waits for its partition lock (0 = wait indefinitely)
lock_timeout_ms = 30000

# Reject change-sets that touch the same entity twice (default: true).
# When false, later operations see the effects of earlier ones.
reject_duplicate_entities = true

# Batch worker pool
worker_threads = 4
max_queue_depth = 1024
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> TableResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TableError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            TableError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> TableResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> TableResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TableError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
