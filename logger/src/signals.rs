//! Process signals that trigger a graceful shutdown.
//!
//! On Unix these are `SIGINT`, `SIGTERM` and `SIGQUIT`; elsewhere only Ctrl-C.

use std::io;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Registered shutdown signal listeners.
///
/// Listeners are registered eagerly so a registration failure is reported before the logger
/// starts accepting events.
#[derive(Debug)]
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigint: Signal,
    #[cfg(unix)]
    sigterm: Signal,
    #[cfg(unix)]
    sigquit: Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next shutdown signal and returns its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        let name = tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        };

        Ok(name)
    }

    /// Waits for the next shutdown signal and returns its name.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_listeners() {
        assert!(ShutdownSignals::register().is_ok());
    }
}
