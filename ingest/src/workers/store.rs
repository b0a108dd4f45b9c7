//! Store loop: the single writer of the store file.
//!
//! The loop owns the destination file exclusively. On start it creates the file with its
//! header when missing, then appends every dequeued line, opening the file for each write so
//! external readers can follow a growing file. It stops as soon as cancellation is observed,
//! even if lines are still buffered, or once the queue is closed.

use std::io;
use std::path::{Path, PathBuf};

use metrics::counter;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::ingest_error;
use crate::metrics::{MLI_STORE_LINES_WRITTEN_TOTAL, MLI_STORE_WRITE_FAILURES_TOTAL};
use crate::queue::RecordReceiver;
use crate::record::{FormattedLine, header_line};
use crate::workers::base::{Worker, WorkerHandle};

/// Permissions of a newly created store file.
#[cfg(unix)]
const STORE_FILE_MODE: u32 = 0o644;

/// Lifecycle of the store loop. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Preparing the store file.
    Initializing,
    /// Appending dequeued lines.
    Running,
    /// Stopped for good.
    Terminated(TerminationReason),
}

impl StoreState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, StoreState::Terminated(_))
    }
}

/// Why the store loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Cancellation was observed.
    Shutdown,
    /// Every producer is gone and the queue was drained.
    QueueClosed,
    /// The store file could not be prepared, the loop never ran.
    InitFailed,
    /// The task was aborted or panicked before reporting a reason.
    Aborted,
}

/// Observable state of a store worker.
#[derive(Debug, Clone)]
pub struct StoreWorkerState {
    state_rx: watch::Receiver<StoreState>,
}

impl StoreWorkerState {
    /// Returns the current state.
    pub fn get(&self) -> StoreState {
        *self.state_rx.borrow()
    }

    /// Waits until the worker reaches a state accepted by `predicate` and returns it.
    ///
    /// If the worker task disappears without publishing a terminal state, the worker is
    /// reported as [`TerminationReason::Aborted`].
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> StoreState
    where
        F: FnMut(&StoreState) -> bool,
    {
        let state = self
            .state_rx
            .wait_for(|state| predicate(state) || state.is_terminated())
            .await
            .map(|state| *state);

        state.unwrap_or(StoreState::Terminated(TerminationReason::Aborted))
    }

    /// Waits until the worker is terminated and returns the reason.
    pub async fn wait_for_termination(&mut self) -> TerminationReason {
        match self.wait_for(StoreState::is_terminated).await {
            StoreState::Terminated(reason) => reason,
            _ => TerminationReason::Aborted,
        }
    }
}

/// Handle for the running store loop.
#[derive(Debug)]
pub struct StoreWorkerHandle {
    state: StoreWorkerState,
    handle: Option<JoinHandle<IngestResult<TerminationReason>>>,
}

impl StoreWorkerHandle {
    /// Waits until the store loop reaches a state accepted by `predicate`, or terminates.
    pub async fn wait_for_state<F>(&self, predicate: F) -> StoreState
    where
        F: FnMut(&StoreState) -> bool,
    {
        self.state.clone().wait_for(predicate).await
    }

    /// Aborts the store loop without waiting for it.
    ///
    /// This is the hard exit path: the current write may be interrupted and buffered lines
    /// are lost.
    pub fn abort(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

impl WorkerHandle<StoreWorkerState> for StoreWorkerHandle {
    fn state(&self) -> StoreWorkerState {
        self.state.clone()
    }

    async fn wait(mut self) -> IngestResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match handle.await {
            Ok(result) => result.map(|_| ()),
            Err(err) if err.is_cancelled() => {
                warn!("store loop was aborted");
                Ok(())
            }
            Err(err) => Err(IngestError::from(err)),
        }
    }
}

/// The single consumer of the record queue.
#[derive(Debug)]
pub struct StoreWorker {
    path: PathBuf,
    receiver: RecordReceiver,
    shutdown_rx: ShutdownRx,
}

impl StoreWorker {
    pub fn new(
        path: impl Into<PathBuf>,
        receiver: RecordReceiver,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            path: path.into(),
            receiver,
            shutdown_rx,
        }
    }

    async fn run(
        mut self,
        state_tx: watch::Sender<StoreState>,
    ) -> IngestResult<TerminationReason> {
        info!(path = %self.path.display(), "starting store loop");

        match initialize_store_file(&self.path).await {
            Ok(true) => info!(path = %self.path.display(), "store file created with header"),
            Ok(false) => debug!(path = %self.path.display(), "appending to existing store file"),
            Err(err) => {
                error!(
                    path = %self.path.display(),
                    error = %err,
                    "could not initialize the store file, store loop will not run"
                );
                state_tx.send_replace(StoreState::Terminated(TerminationReason::InitFailed));

                return Err(err);
            }
        }

        state_tx.send_replace(StoreState::Running);

        let reason = loop {
            tokio::select! {
                biased;

                // Cancellation wins over buffered lines; anything still queued is lost.
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    break TerminationReason::Shutdown;
                }

                line = self.receiver.recv() => {
                    let Some(line) = line else {
                        break TerminationReason::QueueClosed;
                    };

                    self.append(&line).await;
                }
            }
        };

        match reason {
            TerminationReason::Shutdown if !self.receiver.is_empty() => warn!(
                pending = self.receiver.len(),
                "store loop cancelled with buffered records, they will not be written"
            ),
            TerminationReason::Shutdown => info!("store loop cancelled"),
            _ => info!("record queue closed, store loop finished"),
        }

        state_tx.send_replace(StoreState::Terminated(reason));

        Ok(reason)
    }

    /// Appends one line, logging failures without retrying.
    async fn append(&self, line: &FormattedLine) {
        debug!(record = %line, "storing record");

        match append_line(&self.path, line).await {
            Ok(()) => counter!(MLI_STORE_LINES_WRITTEN_TOTAL).increment(1),
            Err(err) => {
                counter!(MLI_STORE_WRITE_FAILURES_TOTAL).increment(1);
                error!(
                    path = %self.path.display(),
                    error_kind = ?err.kind(),
                    detail = err.detail().unwrap_or_default(),
                    record = %line,
                    "failed to write record, it is lost"
                );
            }
        }
    }
}

impl Worker<StoreWorkerHandle, StoreWorkerState> for StoreWorker {
    type Error = IngestError;

    async fn start(self) -> IngestResult<StoreWorkerHandle> {
        let (state_tx, state_rx) = watch::channel(StoreState::Initializing);

        let handle = tokio::spawn(self.run(state_tx));

        Ok(StoreWorkerHandle {
            state: StoreWorkerState { state_rx },
            handle: Some(handle),
        })
    }
}

/// Creates the store file with its header if it does not exist.
///
/// Returns `true` if the file was created. An existing file is left untouched.
pub async fn initialize_store_file(path: &Path) -> IngestResult<bool> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(STORE_FILE_MODE);

    let mut file = match options.open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return ensure_regular_file(path).await.map(|_| false);
        }
        Err(err) => {
            return Err(ingest_error!(
                ErrorKind::StoreInitFailed,
                "Could not create the store file",
                path.display(),
                source: err
            ));
        }
    };

    write_and_flush(&mut file, header_line().as_bytes())
        .await
        .map_err(|err| {
            ingest_error!(
                ErrorKind::StoreInitFailed,
                "Could not write the store file header",
                path.display(),
                source: err
            )
        })?;

    Ok(true)
}

async fn ensure_regular_file(path: &Path) -> IngestResult<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|err| {
        ingest_error!(
            ErrorKind::StoreInitFailed,
            "Could not inspect the store file",
            path.display(),
            source: err
        )
    })?;

    if !metadata.is_file() {
        return Err(ingest_error!(
            ErrorKind::StoreInitFailed,
            "Store path exists but is not a regular file",
            path.display()
        ));
    }

    Ok(())
}

/// Opens the store file in append mode, writes `line` verbatim and closes it.
pub async fn append_line(path: &Path, line: &FormattedLine) -> IngestResult<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|err| {
            ingest_error!(
                ErrorKind::WriteFailed,
                "Could not open the store file",
                path.display(),
                source: err
            )
        })?;

    write_and_flush(&mut file, line.as_bytes())
        .await
        .map_err(|err| {
            ingest_error!(
                ErrorKind::WriteFailed,
                "Could not append to the store file",
                path.display(),
                source: err
            )
        })
}

async fn write_and_flush(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::queue::{OverflowPolicy, create_record_queue};
    use crate::test_utils::{read_store, test_line, wait_for_lines};

    #[tokio::test]
    async fn creates_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");

        assert!(initialize_store_file(&path).await.unwrap());
        assert_eq!(read_store(&path).await, "Time Stamp,Topic,Data\n");
    }

    #[tokio::test]
    async fn existing_file_keeps_its_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        tokio::fs::write(&path, "Time Stamp,Topic,Data\n\"x\",\"y\",\"z\"\n")
            .await
            .unwrap();

        assert!(!initialize_store_file(&path).await.unwrap());
        assert_eq!(
            read_store(&path).await,
            "Time Stamp,Topic,Data\n\"x\",\"y\",\"z\"\n"
        );
    }

    #[tokio::test]
    async fn directory_path_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();

        let err = initialize_store_file(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreInitFailed);
    }

    #[tokio::test]
    async fn writes_dequeued_lines_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let (tx, rx) = create_record_queue(2).unwrap();
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();

        let handle = StoreWorker::new(&path, rx, shutdown_tx.subscribe())
            .start()
            .await
            .unwrap();

        tx.enqueue(test_line("Test1"), OverflowPolicy::default(), &mut shutdown_rx)
            .await
            .unwrap();

        let contents = wait_for_lines(&path, 2, Duration::from_secs(2)).await;
        assert_eq!(
            contents,
            format!("Time Stamp,Topic,Data\n{}", test_line("Test1").as_str())
        );

        shutdown_tx.shutdown();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn terminates_when_queue_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let (tx, rx) = create_record_queue(2).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let handle = StoreWorker::new(&path, rx, shutdown_rx).start().await.unwrap();
        let mut state = handle.state();
        drop(tx);

        assert_eq!(
            state.wait_for_termination().await,
            TerminationReason::QueueClosed
        );
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_leaves_buffered_lines_unwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let (tx, rx) = create_record_queue(2).unwrap();
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();

        for value in ["Test 1", "Test 2"] {
            tx.enqueue(test_line(value), OverflowPolicy::default(), &mut shutdown_rx)
                .await
                .unwrap();
        }
        shutdown_tx.shutdown();

        let handle = StoreWorker::new(&path, rx, shutdown_tx.subscribe())
            .start()
            .await
            .unwrap();
        let mut state = handle.state();

        assert_eq!(
            state.wait_for_termination().await,
            TerminationReason::Shutdown
        );
        handle.wait().await.unwrap();

        assert_eq!(read_store(&path).await, "Time Stamp,Topic,Data\n");
        drop(tx);
    }

    #[tokio::test]
    async fn init_failure_never_enters_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("store.csv");
        let (_tx, rx) = create_record_queue(1).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let handle = StoreWorker::new(&path, rx, shutdown_rx).start().await.unwrap();
        let mut state = handle.state();

        let reached = state
            .wait_for(|state| *state == StoreState::Running)
            .await;
        assert_eq!(reached, StoreState::Terminated(TerminationReason::InitFailed));

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreInitFailed);
    }

    #[tokio::test]
    async fn abort_reports_aborted_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        let (_tx, rx) = create_record_queue(1).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let handle = StoreWorker::new(&path, rx, shutdown_rx).start().await.unwrap();
        let mut state = handle.state();
        state.wait_for(|state| *state == StoreState::Running).await;

        handle.abort();

        assert_eq!(state.wait_for_termination().await, TerminationReason::Aborted);
        handle.wait().await.unwrap();
    }
}
