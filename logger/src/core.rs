use std::path::PathBuf;

use config::shared::LoggerConfig;
use ingest::pipeline::{Pipeline, PipelineConfig};
use tokio::io::BufReader;
use tracing::{error, info};

use crate::signals::ShutdownSignals;
use crate::source::run_line_source;

/// Runs the logger until a shutdown signal arrives or stdin is exhausted.
///
/// Events are read from stdin. At end of input every queued record is written before the
/// logger stops. `output` overrides the configured store path.
pub async fn start_logger(config: LoggerConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut pipeline_config = PipelineConfig::from(&config);
    if let Some(output) = output {
        pipeline_config.store_path = output;
    }

    info!(
        broker = %config.broker.addr,
        client_id = %config.broker.client_id,
        topics = ?config.topics,
        "starting topic logger"
    );

    let mut pipeline = Pipeline::new(pipeline_config);
    pipeline.start().await?;

    // Hard exit path: nothing is drained.
    let mut signals = match ShutdownSignals::register() {
        Ok(signals) => signals,
        Err(err) => {
            error!(error = %err, "failed to register shutdown signal handlers");
            pipeline.abort();

            return Err(err.into());
        }
    };

    let shutdown_tx = pipeline.shutdown_tx();
    let signal_handle = tokio::spawn(async move {
        match signals.recv().await {
            Ok(signal) => info!(signal, "shutdown signal received, stopping logger"),
            Err(err) => {
                error!(error = %err, "failed to listen for shutdown signals, stopping logger")
            }
        }

        shutdown_tx.shutdown();
    });

    let source_handle = tokio::spawn(run_line_source(
        BufReader::new(tokio::io::stdin()),
        pipeline.recorder_fn()?,
        pipeline.shutdown_tx(),
    ));

    let result = pipeline.wait().await;

    signal_handle.abort();
    source_handle.abort();

    result?;

    info!("topic logger stopped");

    Ok(())
}
