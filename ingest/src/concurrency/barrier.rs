//! Completion counting join barrier for ephemeral record tasks.
//!
//! Every record task holds a [`CompletionGuard`] for its whole lifetime. The guard is created
//! before the task is spawned and decrements the counter when dropped, so a task that returns,
//! is dropped by the runtime or panics is always accounted for.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicUsize,
    drained: Notify,
}

/// Owned handle to the completion counter shared by the recorder and the coordinator.
#[derive(Debug, Clone, Default)]
pub struct CompletionBarrier {
    inner: Arc<Inner>,
}

impl CompletionBarrier {
    /// Creates a new barrier with no in-flight tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new in-flight task and returns the guard that resolves it on drop.
    pub fn enter(&self) -> CompletionGuard {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);

        CompletionGuard {
            inner: self.inner.clone(),
        }
    }

    /// Returns the number of tasks that entered the barrier and have not resolved yet.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Waits until no task is in flight.
    ///
    /// Tasks entering the barrier while this future is pending extend the wait.
    pub async fn wait(&self) {
        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            // Registering before reading the counter guarantees that a decrement to zero
            // happening in between still wakes us up.
            drained.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }

            drained.await;
        }
    }

    /// Waits until no task is in flight or the timeout elapses.
    ///
    /// Returns `true` if the barrier drained in time.
    pub async fn wait_timeout(&self, duration: Duration) -> bool {
        timeout(duration, self.wait()).await.is_ok()
    }
}

/// Marks one in-flight task; dropping it resolves the task in the barrier.
#[derive(Debug)]
pub struct CompletionGuard {
    inner: Arc<Inner>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_barrier_resolves_immediately() {
        let barrier = CompletionBarrier::new();

        assert_eq!(barrier.in_flight(), 0);
        assert!(barrier.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn waits_until_every_guard_is_dropped() {
        let barrier = CompletionBarrier::new();
        let first = barrier.enter();
        let second = barrier.enter();
        assert_eq!(barrier.in_flight(), 2);

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        drop(first);
        assert!(!barrier.wait_timeout(Duration::from_millis(10)).await);

        drop(second);
        waiter.await.unwrap();
        assert_eq!(barrier.in_flight(), 0);
    }

    #[tokio::test]
    async fn guard_is_released_when_task_panics() {
        let barrier = CompletionBarrier::new();
        let guard = barrier.enter();

        let result = tokio::spawn(async move {
            let _guard = guard;
            panic!("record task failure");
        })
        .await;

        assert!(result.is_err());
        assert!(barrier.wait_timeout(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn many_concurrent_tasks_are_counted() {
        let barrier = CompletionBarrier::new();

        for _ in 0..64 {
            let guard = barrier.enter();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(guard);
            });
        }

        assert!(barrier.wait_timeout(Duration::from_secs(2)).await);
        assert_eq!(barrier.in_flight(), 0);
    }
}
