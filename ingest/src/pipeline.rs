use std::future::pending;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::shared::{LoggerConfig, StoreConfig};
use tracing::{error, info};

use crate::bail;
use crate::concurrency::coordinator::ShutdownCoordinator;
use crate::concurrency::shutdown::ShutdownTx;
use crate::error::{ErrorKind, IngestResult};
use crate::queue::{OverflowPolicy, create_record_queue};
use crate::recorder::{Recorder, RecorderFn};
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::store::{
    StoreState, StoreWorker, StoreWorkerHandle, StoreWorkerState, TerminationReason,
};

/// Runtime settings of a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Destination file of the store loop.
    pub store_path: PathBuf,
    /// Maximum number of lines buffered between record tasks and the store loop.
    pub queue_capacity: usize,
    /// Behavior of record tasks when the queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Upper bound on the time spent waiting for in-flight record tasks during shutdown.
    pub drain_timeout: Duration,
}

impl PipelineConfig {
    /// Creates a configuration with the default overflow policy and drain timeout.
    pub fn new(store_path: impl Into<PathBuf>, queue_capacity: usize) -> Self {
        Self {
            store_path: store_path.into(),
            queue_capacity,
            overflow_policy: OverflowPolicy::default(),
            drain_timeout: Duration::from_millis(StoreConfig::DEFAULT_DRAIN_TIMEOUT_MS),
        }
    }

    /// Derives the pipeline settings from a loaded logger configuration.
    ///
    /// The queue is sized from the subscribed topics unless the store configuration sets an
    /// explicit capacity.
    pub fn from_logger_config(config: &LoggerConfig) -> Self {
        let store = &config.store;

        Self {
            store_path: store.path.clone(),
            queue_capacity: store.effective_queue_capacity(config.topics.len()),
            overflow_policy: OverflowPolicy::from_config(store),
            drain_timeout: store.drain_timeout(),
        }
    }
}

impl From<&LoggerConfig> for PipelineConfig {
    fn from(config: &LoggerConfig) -> Self {
        Self::from_logger_config(config)
    }
}

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        store_worker: StoreWorkerHandle,
        recorder: Recorder,
    },
}

/// Wires the record queue, the store loop and the recorder together.
///
/// A pipeline is started once, hands out recorders to message sources and is finally shut
/// down either gracefully through [`Pipeline::wait`] / [`Pipeline::shutdown_and_wait`] or
/// abruptly through [`Pipeline::abort`].
#[derive(Debug)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    coordinator: ShutdownCoordinator,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(config),
            coordinator: ShutdownCoordinator::new(),
            state: PipelineState::NotStarted,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the transmitter used to trigger cancellation of the whole pipeline.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.coordinator.shutdown_tx()
    }

    pub async fn start(&mut self) -> IngestResult<()> {
        if let PipelineState::Started { .. } = self.state {
            bail!(ErrorKind::InvalidState, "Pipeline was already started");
        }

        info!(
            path = %self.config.store_path.display(),
            queue_capacity = self.config.queue_capacity,
            overflow_policy = ?self.config.overflow_policy,
            "starting pipeline"
        );

        let (sender, receiver) = create_record_queue(self.config.queue_capacity)?;

        let store_worker = StoreWorker::new(
            self.config.store_path.clone(),
            receiver,
            self.coordinator.subscribe(),
        )
        .start()
        .await?;

        let recorder = Recorder::new(
            sender,
            self.coordinator.subscribe(),
            self.coordinator.barrier(),
            self.config.overflow_policy,
        )?;

        self.state = PipelineState::Started {
            store_worker,
            recorder,
        };

        Ok(())
    }

    /// Returns a recorder bound to this pipeline.
    pub fn recorder(&self) -> IngestResult<Recorder> {
        let PipelineState::Started { recorder, .. } = &self.state else {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline must be started before handing out recorders"
            );
        };

        Ok(recorder.clone())
    }

    /// Returns the recorder in the callback form expected by message sources.
    pub fn recorder_fn(&self) -> IngestResult<RecorderFn> {
        self.recorder().map(Recorder::into_fn)
    }

    /// Returns the observable state of the store loop, if the pipeline was started.
    pub fn store_state(&self) -> Option<StoreWorkerState> {
        match &self.state {
            PipelineState::Started { store_worker, .. } => Some(store_worker.state()),
            PipelineState::NotStarted => None,
        }
    }

    /// Waits until the pipeline stops, then drains in-flight record tasks and the store loop.
    ///
    /// The pipeline stops on cancellation, or once every recorder handed out is dropped and
    /// the store loop has written everything left in the queue.
    pub async fn wait(self) -> IngestResult<()> {
        let Pipeline {
            config,
            coordinator,
            state,
        } = self;

        let PipelineState::Started {
            store_worker,
            recorder,
        } = state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        // Our recorder clone keeps a queue sender alive, the queue can only close without it.
        drop(recorder);

        let mut shutdown_rx = coordinator.subscribe();
        tokio::select! {
            biased;

            _ = shutdown_rx.wait_for_shutdown() => {}

            _ = wait_for_queue_closed(&store_worker) => {
                info!("every record source is gone and the queue is drained");
            }
        }

        Self::drain(&coordinator, config.drain_timeout, store_worker).await
    }

    /// Triggers cancellation and waits for the pipeline to drain.
    pub async fn shutdown_and_wait(self) -> IngestResult<()> {
        self.coordinator.cancel();

        self.wait().await
    }

    /// Cancels the pipeline and aborts the store loop without draining anything.
    pub fn abort(self) {
        self.coordinator.cancel();

        if let PipelineState::Started { store_worker, .. } = self.state {
            error!("aborting pipeline, in-flight records are lost");
            store_worker.abort();
        }
    }

    async fn drain(
        coordinator: &ShutdownCoordinator,
        drain_timeout: Duration,
        store_worker: StoreWorkerHandle,
    ) -> IngestResult<()> {
        info!("waiting for in-flight record tasks to complete");
        coordinator.drain(drain_timeout).await;

        info!("waiting for store loop to complete");
        let mut errors = vec![];
        if let Err(err) = store_worker.wait().await {
            error!(error = %err, "store loop completed with an error");
            errors.push(err);
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("pipeline completed");

        Ok(())
    }
}

/// Resolves once the store loop terminated because the queue closed.
///
/// Any other termination keeps this pending, the pipeline then stops on cancellation.
async fn wait_for_queue_closed(store_worker: &StoreWorkerHandle) {
    let state = store_worker.wait_for_state(StoreState::is_terminated).await;

    if state != StoreState::Terminated(TerminationReason::QueueClosed) {
        pending::<()>().await;
    }
}
