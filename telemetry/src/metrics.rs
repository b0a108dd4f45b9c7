use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use thiserror::Error;
use tracing::info;

// Address of the installed exporter.
//
// `PrometheusBuilder::install` sets a global recorder and fails on any later call, so the
// installation is remembered and repeated calls for the same address are no-ops.
static INSTALLED_ADDR: Mutex<Option<SocketAddr>> = Mutex::new(None);

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to install the Prometheus exporter: {0}")]
    Build(#[from] BuildError),

    #[error("metrics exporter already listening on {0}")]
    AlreadyInstalled(SocketAddr),
}

/// Installs the Prometheus recorder and serves `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime, which then hosts the HTTP listener and the
/// periodic upkeep of the exporter.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut installed = INSTALLED_ADDR
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    match *installed {
        Some(installed_addr) if installed_addr == addr => return Ok(()),
        Some(installed_addr) => return Err(MetricsError::AlreadyInstalled(installed_addr)),
        None => {}
    }

    PrometheusBuilder::new().with_http_listener(addr).install()?;
    *installed = Some(addr);

    info!(%addr, "metrics exporter listening");

    Ok(())
}
