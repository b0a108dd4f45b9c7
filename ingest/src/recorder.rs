//! Recorder factory and the ephemeral record tasks it spawns.
//!
//! The external message source calls the recorder once per inbound message, possibly from a
//! thread that is not part of the async runtime and must never block. Each call formats the
//! record, registers a task in the completion barrier and spawns a [`RecordTask`] on the
//! runtime captured when the recorder was built, then returns immediately.

use std::fmt;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::concurrency::barrier::{CompletionBarrier, CompletionGuard};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::ingest_error;
use crate::metrics::{
    DROP_REASON_LABEL, MLI_RECORDS_DROPPED_TOTAL, MLI_RECORDS_ENQUEUED_TOTAL,
    MLI_RECORDS_IN_FLIGHT,
};
use crate::queue::{DropReason, DroppedLine, EnqueueOutcome, OverflowPolicy, RecordSender};
use crate::record::{FormattedLine, Record};

/// Fire-and-forget callback handed to the external message source.
pub type RecorderFn = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Barrier entry of one record task, mirrored by the in-flight gauge until dropped.
#[derive(Debug)]
struct InFlight {
    _guard: CompletionGuard,
}

impl InFlight {
    fn new(guard: CompletionGuard) -> Self {
        gauge!(MLI_RECORDS_IN_FLIGHT).increment(1.0);

        Self { _guard: guard }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(MLI_RECORDS_IN_FLIGHT).decrement(1.0);
    }
}

/// Attempts to enqueue one formatted line, then resolves its barrier entry.
///
/// The entry is also resolved when the task is dropped before completing.
#[derive(Debug)]
pub struct RecordTask {
    sender: RecordSender,
    shutdown_rx: ShutdownRx,
    line: FormattedLine,
    policy: OverflowPolicy,
    in_flight: InFlight,
}

impl RecordTask {
    pub fn new(
        sender: RecordSender,
        shutdown_rx: ShutdownRx,
        line: FormattedLine,
        policy: OverflowPolicy,
        guard: CompletionGuard,
    ) -> Self {
        Self {
            sender,
            shutdown_rx,
            line,
            policy,
            in_flight: InFlight::new(guard),
        }
    }

    /// Runs the task to completion.
    ///
    /// The task ends after one successful enqueue or one drop. It never retries past its
    /// deadline and never returns an error, since nobody is waiting for it.
    pub async fn run(self) -> EnqueueOutcome {
        let RecordTask {
            sender,
            mut shutdown_rx,
            line,
            policy,
            in_flight,
        } = self;

        let outcome = match sender.enqueue(line, policy, &mut shutdown_rx).await {
            Ok(()) => {
                counter!(MLI_RECORDS_ENQUEUED_TOTAL).increment(1);
                EnqueueOutcome::Enqueued
            }
            Err(dropped) => {
                report_drop(&dropped);
                EnqueueOutcome::Dropped(dropped.reason)
            }
        };

        drop(in_flight);

        outcome
    }
}

/// Logs and counts a dropped line.
fn report_drop(dropped: &DroppedLine) {
    counter!(
        MLI_RECORDS_DROPPED_TOTAL,
        DROP_REASON_LABEL => dropped.reason.as_str()
    )
    .increment(1);

    match drop_error(dropped) {
        Some(err) => warn!(
            error_kind = ?err.kind(),
            reason = %dropped.reason,
            record = %dropped.line,
            "failed to enqueue record, dropping it"
        ),
        None => debug!(
            record = %dropped.line,
            "cancellation observed, dropping pending record"
        ),
    }
}

/// Maps a drop to the error it represents. Cancellation is a normal termination, not an error.
fn drop_error(dropped: &DroppedLine) -> Option<IngestError> {
    let err = match dropped.reason {
        DropReason::Shutdown => return None,
        DropReason::Timeout => ingest_error!(
            ErrorKind::EnqueueTimeout,
            "Record queue stayed full until the record deadline",
            dropped.line
        ),
        DropReason::Rejected => ingest_error!(
            ErrorKind::EnqueueRejected,
            "Record queue is full",
            dropped.line
        ),
        DropReason::Closed => ingest_error!(
            ErrorKind::QueueClosed,
            "Record queue is closed",
            dropped.line
        ),
    };

    Some(err)
}

/// Builds and launches record tasks for every inbound message.
#[derive(Clone)]
pub struct Recorder {
    sender: RecordSender,
    shutdown_rx: ShutdownRx,
    barrier: CompletionBarrier,
    policy: OverflowPolicy,
    runtime: Handle,
}

impl Recorder {
    /// Creates a recorder bound to the runtime of the calling task.
    ///
    /// Fails when called outside of a Tokio runtime.
    pub fn new(
        sender: RecordSender,
        shutdown_rx: ShutdownRx,
        barrier: CompletionBarrier,
        policy: OverflowPolicy,
    ) -> IngestResult<Self> {
        let runtime = Handle::try_current().map_err(|err| {
            ingest_error!(
                ErrorKind::InvalidState,
                "Recorder must be created inside a Tokio runtime",
                source: err
            )
        })?;

        Ok(Self::with_runtime(
            sender,
            shutdown_rx,
            barrier,
            policy,
            runtime,
        ))
    }

    /// Creates a recorder that spawns its tasks on `runtime`.
    pub fn with_runtime(
        sender: RecordSender,
        shutdown_rx: ShutdownRx,
        barrier: CompletionBarrier,
        policy: OverflowPolicy,
        runtime: Handle,
    ) -> Self {
        Self {
            sender,
            shutdown_rx,
            barrier,
            policy,
            runtime,
        }
    }

    /// Records one `(topic, payload)` event.
    ///
    /// Never blocks and never fails from the caller's perspective: the record is stamped and
    /// formatted here, and the enqueue happens in a spawned task.
    pub fn record(&self, topic: &str, payload: &[u8]) {
        let line = Record::now(topic, payload).format();

        // The barrier entry must exist before the task is spawned, otherwise a concurrent
        // drain could observe zero in-flight tasks while this one is about to start.
        let guard = self.barrier.enter();

        let task = RecordTask::new(
            self.sender.clone(),
            self.shutdown_rx.clone(),
            line,
            self.policy,
            guard,
        );
        self.runtime.spawn(task.run());
    }

    /// Returns the overflow policy applied by the spawned tasks.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Converts the recorder into the callback form expected by message sources.
    pub fn into_fn(self) -> RecorderFn {
        Arc::new(move |topic: &str, payload: &[u8]| self.record(topic, payload))
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("policy", &self.policy)
            .field("capacity", &self.sender.capacity())
            .field("in_flight", &self.barrier.in_flight())
            .finish()
    }
}

/// Builds the recorder callback for a message source.
pub fn create_recorder(
    sender: RecordSender,
    shutdown_rx: ShutdownRx,
    barrier: CompletionBarrier,
    policy: OverflowPolicy,
) -> IngestResult<RecorderFn> {
    Recorder::new(sender, shutdown_rx, barrier, policy).map(Recorder::into_fn)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use metrics::{
        Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, SharedString, Unit,
    };

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::queue::create_record_queue;
    use crate::test_utils::test_line;

    #[derive(Debug, Default)]
    struct TestGauge(Mutex<f64>);

    impl TestGauge {
        fn value(&self) -> f64 {
            *self.0.lock().unwrap()
        }
    }

    impl GaugeFn for TestGauge {
        fn increment(&self, value: f64) {
            *self.0.lock().unwrap() += value;
        }

        fn decrement(&self, value: f64) {
            *self.0.lock().unwrap() -= value;
        }

        fn set(&self, value: f64) {
            *self.0.lock().unwrap() = value;
        }
    }

    /// Captures the in-flight gauge, every other metric is discarded.
    #[derive(Debug, Default)]
    struct InFlightRecorder {
        in_flight: Arc<TestGauge>,
    }

    impl metrics::Recorder for InFlightRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            if key.name() == MLI_RECORDS_IN_FLIGHT {
                Gauge::from_arc(self.in_flight.clone())
            } else {
                Gauge::noop()
            }
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn dropped_record_task_releases_its_in_flight_entry() {
        let recorder = InFlightRecorder::default();
        let (tx, _rx) = create_record_queue(1).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let barrier = CompletionBarrier::new();

        metrics::with_local_recorder(&recorder, || {
            let task = RecordTask::new(
                tx,
                shutdown_rx,
                test_line("Test1"),
                OverflowPolicy::default(),
                barrier.enter(),
            );
            assert_eq!(recorder.in_flight.value(), 1.0);
            assert_eq!(barrier.in_flight(), 1);

            drop(task);
        });

        assert_eq!(recorder.in_flight.value(), 0.0);
        assert_eq!(barrier.in_flight(), 0);
    }

    #[tokio::test]
    async fn record_task_enqueues_and_resolves_barrier() {
        let (tx, mut rx) = create_record_queue(2).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let barrier = CompletionBarrier::new();

        let task = RecordTask::new(
            tx,
            shutdown_rx,
            test_line("Test1"),
            OverflowPolicy::default(),
            barrier.enter(),
        );

        assert_eq!(task.run().await, EnqueueOutcome::Enqueued);
        assert_eq!(barrier.in_flight(), 0);
        assert_eq!(rx.recv().await, Some(test_line("Test1")));
    }

    #[tokio::test]
    async fn record_task_drops_when_queue_stays_full() {
        let (tx, mut rx) = create_record_queue(2).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let barrier = CompletionBarrier::new();
        let policy = OverflowPolicy::DropNewest {
            timeout: Duration::from_millis(10),
        };

        for value in ["Test 1", "Test 2"] {
            let task = RecordTask::new(
                tx.clone(),
                shutdown_rx.clone(),
                test_line(value),
                policy,
                barrier.enter(),
            );
            assert!(task.run().await.is_enqueued());
        }

        let task = RecordTask::new(
            tx,
            shutdown_rx,
            test_line("Test3"),
            policy,
            barrier.enter(),
        );
        assert_eq!(
            task.run().await,
            EnqueueOutcome::Dropped(DropReason::Timeout)
        );
        assert_eq!(barrier.in_flight(), 0);

        assert_eq!(rx.recv().await, Some(test_line("Test 1")));
        assert_eq!(rx.recv().await, Some(test_line("Test 2")));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn recorder_formats_and_enqueues() {
        let (tx, mut rx) = create_record_queue(2).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let barrier = CompletionBarrier::new();

        let recorder = create_recorder(
            tx,
            shutdown_rx,
            barrier.clone(),
            OverflowPolicy::DropNewest {
                timeout: Duration::from_millis(20),
            },
        )
        .unwrap();
        recorder("Test1", b"Test2");

        let line = rx.recv().await.unwrap();
        assert!(line.as_str().contains("\"Test1\",\"Test2\""));
        assert!(barrier.wait_timeout(Duration::from_secs(1)).await);
    }

    #[test]
    fn recorder_can_be_called_from_a_foreign_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let (tx, mut rx) = create_record_queue(1).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let barrier = CompletionBarrier::new();
        let recorder = Recorder::with_runtime(
            tx,
            shutdown_rx,
            barrier.clone(),
            OverflowPolicy::default(),
            runtime.handle().clone(),
        )
        .into_fn();

        std::thread::spawn(move || recorder("foreign", b"thread"))
            .join()
            .unwrap();

        let line = runtime.block_on(rx.recv()).unwrap();
        assert!(line.as_str().ends_with(",\"foreign\",\"thread\"\n"));
        assert!(runtime.block_on(barrier.wait_timeout(Duration::from_secs(1))));
    }

    #[test]
    fn recorder_requires_a_runtime() {
        let (tx, _rx) = create_record_queue(1).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let err = Recorder::new(
            tx,
            shutdown_rx,
            CompletionBarrier::new(),
            OverflowPolicy::default(),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
