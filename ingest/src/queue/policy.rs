use std::fmt;
use std::time::Duration;

use config::shared::{OverflowPolicyConfig, StoreConfig};

/// How a producer behaves when the record queue is full.
///
/// The policy is applied by [`RecordSender::enqueue`](crate::queue::RecordSender::enqueue)
/// only, so producers and the store loop are unaware of which policy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Waits up to `timeout` for free capacity, then drops the new record.
    DropNewest { timeout: Duration },
    /// Waits for free capacity until shutdown is triggered.
    BlockUntilShutdown,
    /// Makes a single attempt and drops the record right away if the queue is full.
    Reject,
}

impl OverflowPolicy {
    /// Default time a record may wait for queue capacity.
    pub const DEFAULT_TIMEOUT: Duration =
        Duration::from_millis(StoreConfig::DEFAULT_RECORD_TIMEOUT_MS);

    /// Builds the policy described by the store configuration.
    pub fn from_config(config: &StoreConfig) -> Self {
        match config.overflow_policy {
            OverflowPolicyConfig::DropNewest => OverflowPolicy::DropNewest {
                timeout: config.record_timeout(),
            },
            OverflowPolicyConfig::Block => OverflowPolicy::BlockUntilShutdown,
            OverflowPolicyConfig::Reject => OverflowPolicy::Reject,
        }
    }
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropNewest {
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Result of a single record task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The line was accepted by the queue.
    Enqueued,
    /// The line was discarded and will never be written.
    Dropped(DropReason),
}

impl EnqueueOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, EnqueueOutcome::Enqueued)
    }
}

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The per-record deadline elapsed while the queue was full.
    Timeout,
    /// Cancellation was observed before the line could be enqueued.
    Shutdown,
    /// The queue was full and the policy does not wait.
    Rejected,
    /// The store loop is gone and the queue can never accept the line.
    Closed,
}

impl DropReason {
    /// Returns the label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Timeout => "timeout",
            DropReason::Shutdown => "shutdown",
            DropReason::Rejected => "rejected",
            DropReason::Closed => "closed",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
