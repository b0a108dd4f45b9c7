use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// How record tasks behave when the record queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicyConfig {
    /// Wait up to `record_timeout_ms` for capacity, then drop the record.
    #[default]
    DropNewest,
    /// Wait for capacity until shutdown.
    Block,
    /// Drop the record immediately if the queue is full.
    Reject,
}

/// Destination file and queueing settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Path of the CSV file records are appended to.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Maximum time, in milliseconds, a record may wait for queue capacity.
    #[serde(default = "default_record_timeout_ms")]
    pub record_timeout_ms: u64,
    /// Explicit queue capacity. When unset, the capacity is derived from the topic count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    #[serde(default)]
    pub overflow_policy: OverflowPolicyConfig,
    /// Maximum time, in milliseconds, shutdown waits for in-flight records.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl StoreConfig {
    pub const DEFAULT_PATH: &'static str = "mli.csv";

    pub const DEFAULT_RECORD_TIMEOUT_MS: u64 = 1000;

    pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5000;

    /// Queue slots reserved per subscribed topic when no capacity is configured.
    pub const QUEUE_SLOTS_PER_TOPIC: usize = 2;

    pub fn record_timeout(&self) -> Duration {
        Duration::from_millis(self.record_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Returns the queue capacity for `topic_count` subscribed topics.
    ///
    /// The configured capacity wins; otherwise two slots per topic, and never less than one.
    pub fn effective_queue_capacity(&self, topic_count: usize) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| (topic_count * Self::QUEUE_SLOTS_PER_TOPIC).max(1))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "store.path".to_string(),
                constraint: "cannot be empty".to_string(),
            });
        }

        if self.record_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "store.record_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.queue_capacity == Some(0) {
            return Err(ValidationError::InvalidFieldValue {
                field: "store.queue_capacity".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            record_timeout_ms: default_record_timeout_ms(),
            queue_capacity: None,
            overflow_policy: OverflowPolicyConfig::default(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(StoreConfig::DEFAULT_PATH)
}

fn default_record_timeout_ms() -> u64 {
    StoreConfig::DEFAULT_RECORD_TIMEOUT_MS
}

fn default_drain_timeout_ms() -> u64 {
    StoreConfig::DEFAULT_DRAIN_TIMEOUT_MS
}
