//! Broadcast cancellation signal shared by every task of the pipeline.
//!
//! The signal is backed by a [`watch`] channel holding a boolean. Once set it stays set, every
//! receiver observes it, and setting it again has no effect.

use std::future::pending;
use tokio::sync::watch;

/// Transmitter side of the shutdown signal.
///
/// Cloning a [`ShutdownTx`] yields another handle to the same signal, so the upstream source,
/// the signal handler and the pipeline can all trigger it.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Triggers shutdown for every current and future subscriber.
    ///
    /// Calling this method more than once is allowed and has no additional effect. It never
    /// fails, even when no receiver is alive.
    pub fn shutdown(&self) {
        self.0.send_if_modified(|is_shutdown| {
            if *is_shutdown {
                return false;
            }

            *is_shutdown = true;
            true
        });
    }

    /// Returns `true` if shutdown was already triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver subscribed to this signal.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` if shutdown was triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until shutdown is triggered.
    ///
    /// Resolves immediately if the signal is already set. If every [`ShutdownTx`] is dropped
    /// without triggering shutdown, the signal can never fire and this future stays pending.
    pub async fn wait_for_shutdown(&mut self) {
        let result = self
            .0
            .wait_for(|is_shutdown| *is_shutdown)
            .await
            .map(|_| ());

        if result.is_err() {
            pending::<()>().await;
        }
    }
}

/// Creates a new shutdown channel in the non-triggered state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}
