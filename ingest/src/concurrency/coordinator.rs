use std::time::Duration;
use tracing::{info, warn};

use crate::concurrency::barrier::CompletionBarrier;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};

/// Owns the cancellation signal and the completion barrier of a pipeline.
///
/// The coordinator hands out receivers and barrier clones to the tasks it supervises, and is
/// the single place where process level shutdown waits for them.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: ShutdownTx,
    barrier: CompletionBarrier,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with a fresh, non-triggered signal and an empty barrier.
    pub fn new() -> Self {
        // The initial receiver is not kept since subscribers are created on demand.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            shutdown_tx,
            barrier: CompletionBarrier::new(),
        }
    }

    /// Returns a transmitter that external collaborators can use to trigger cancellation.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Subscribes a new receiver to the cancellation signal.
    pub fn subscribe(&self) -> ShutdownRx {
        self.shutdown_tx.subscribe()
    }

    /// Returns a handle to the completion barrier.
    pub fn barrier(&self) -> CompletionBarrier {
        self.barrier.clone()
    }

    /// Broadcasts cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.shutdown_tx.is_shutdown() {
            info!("cancellation requested, stopping record tasks and store loop");
        }

        self.shutdown_tx.shutdown();
    }

    /// Returns `true` once cancellation has been broadcast.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown_tx.is_shutdown()
    }

    /// Waits for every in-flight record task to resolve, bounded by `drain_timeout`.
    ///
    /// Returns `false` if tasks were still in flight when the timeout elapsed. Record tasks
    /// observe cancellation, so after [`ShutdownCoordinator::cancel`] this normally returns
    /// within one scheduling round.
    pub async fn drain(&self, drain_timeout: Duration) -> bool {
        if self.barrier.wait_timeout(drain_timeout).await {
            return true;
        }

        warn!(
            in_flight = self.barrier.in_flight(),
            timeout_ms = drain_timeout.as_millis() as u64,
            "record tasks still in flight after drain timeout"
        );

        false
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_reaches_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        coordinator.cancel();
        coordinator.cancel();

        rx.wait_for_shutdown().await;
        assert!(coordinator.is_cancelled());
    }

    #[tokio::test]
    async fn drain_reports_stuck_tasks() {
        let coordinator = ShutdownCoordinator::new();
        let guard = coordinator.barrier().enter();

        assert!(!coordinator.drain(Duration::from_millis(10)).await);

        drop(guard);
        assert!(coordinator.drain(Duration::from_millis(10)).await);
    }
}
