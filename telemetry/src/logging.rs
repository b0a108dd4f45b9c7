use std::path::Path;

use config::{Environment, EnvironmentError};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the log bridge: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Keeps the background log writer alive.
///
/// Buffered log lines are flushed when the flusher is dropped, so it must be held until the
/// end of `main`.
#[must_use = "dropping the flusher stops log output"]
#[derive(Debug)]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Builds the filter from `RUST_LOG`, falling back to [`DEFAULT_LOG_DIRECTIVE`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

/// Installs the global tracing subscriber.
///
/// Logs go to stderr, or to a daily rotated `{app_name}.log` file in `log_dir` when given.
/// Output is compact text in development and JSON in production. Records emitted through the
/// `log` crate are forwarded to tracing.
pub fn init_tracing(app_name: &str, log_dir: Option<&Path>) -> Result<LogFlusher, TracingError> {
    LogTracer::init()?;

    let environment = Environment::load()?;

    let (writer, guard) = match log_dir {
        Some(log_dir) => {
            tracing_appender::non_blocking(rolling::daily(log_dir, format!("{app_name}.log")))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(log_dir.is_none() && !environment.is_prod());

    if environment.is_prod() {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(layer.json().with_current_span(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(layer.compact())
            .try_init()?;
    }

    Ok(LogFlusher { _guard: guard })
}
