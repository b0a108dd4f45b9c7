//! `mli` records topic events into an append-only CSV log.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::json::write_template;
use config::shared::{LoggerConfig, LoggerConfigWithoutSecrets};
use telemetry::logging::init_tracing;
use telemetry::metrics::init_metrics;
use tracing::info;

use crate::cli::{Cli, Command};
use crate::core::start_logger;
use crate::settings::load_logger_config;

mod cli;
mod core;
mod settings;
mod signals;
mod source;

/// Time granted to blocking tasks, such as a pending stdin read, when the runtime stops.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), cli.log_dir.as_deref())?;

    match cli.command {
        Command::Template { file } => {
            write_template(&file)?;
            info!(path = %file.display(), "configuration template written");
        }
        Command::Show => {
            let config = load_logger_config(cli.config.as_deref())?;
            let printable = LoggerConfigWithoutSecrets::from(config);
            println!("{}", serde_json::to_string_pretty(&printable)?);
        }
        Command::Run {
            output,
            metrics_addr,
        } => {
            let config = load_logger_config(cli.config.as_deref())?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(async_main(config, output, metrics_addr));
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

            result?;
        }
    }

    Ok(())
}

async fn async_main(
    config: LoggerConfig,
    output: Option<PathBuf>,
    metrics_addr: Option<SocketAddr>,
) -> anyhow::Result<()> {
    if let Some(metrics_addr) = metrics_addr {
        init_metrics(metrics_addr)?;
    }

    start_logger(config, output).await
}
