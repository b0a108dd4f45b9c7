//! Bounded queue connecting record tasks to the store loop.
//!
//! The queue carries [`FormattedLine`]s, never structured records. Its capacity is fixed when
//! it is created. Producers go through [`RecordSender::enqueue`], which waits on queue capacity,
//! cancellation and the policy deadline at once, so no producer ever blocks past its deadline.

mod policy;

pub use policy::{DropReason, EnqueueOutcome, OverflowPolicy};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, timeout_at};

use crate::bail;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, IngestResult};
use crate::record::FormattedLine;

/// A line that could not be enqueued, handed back to the caller for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedLine {
    pub reason: DropReason,
    pub line: FormattedLine,
}

/// Producer side of the record queue.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<FormattedLine>,
}

impl RecordSender {
    /// Returns the fixed capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Returns `true` once the receiving side is gone or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Attempts to enqueue `line` according to `policy`.
    ///
    /// Cancellation is checked first, so a line offered after shutdown is always dropped. At
    /// most one slot is ever reserved for the line, which makes a successful enqueue unique.
    pub async fn enqueue(
        &self,
        line: FormattedLine,
        policy: OverflowPolicy,
        shutdown_rx: &mut ShutdownRx,
    ) -> Result<(), DroppedLine> {
        if shutdown_rx.is_shutdown() {
            return Err(DroppedLine {
                reason: DropReason::Shutdown,
                line,
            });
        }

        let reserved = match policy {
            OverflowPolicy::Reject => match self.tx.try_send(line) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(line)) => {
                    return Err(DroppedLine {
                        reason: DropReason::Rejected,
                        line,
                    });
                }
                Err(TrySendError::Closed(line)) => {
                    return Err(DroppedLine {
                        reason: DropReason::Closed,
                        line,
                    });
                }
            },
            OverflowPolicy::BlockUntilShutdown => self.reserve_or_shutdown(shutdown_rx).await,
            OverflowPolicy::DropNewest { timeout } => {
                let deadline = Instant::now() + timeout;
                timeout_at(deadline, self.reserve_or_shutdown(shutdown_rx))
                    .await
                    .unwrap_or(Err(DropReason::Timeout))
            }
        };

        match reserved {
            Ok(permit) => {
                permit.send(line);
                Ok(())
            }
            Err(reason) => Err(DroppedLine { reason, line }),
        }
    }

    /// Waits for a free slot or for cancellation, whichever comes first.
    async fn reserve_or_shutdown(
        &self,
        shutdown_rx: &mut ShutdownRx,
    ) -> Result<mpsc::Permit<'_, FormattedLine>, DropReason> {
        tokio::select! {
            biased;

            _ = shutdown_rx.wait_for_shutdown() => Err(DropReason::Shutdown),

            permit = self.tx.reserve() => permit.map_err(|_| DropReason::Closed),
        }
    }
}

/// Consumer side of the record queue, owned by the store loop.
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<FormattedLine>,
}

impl RecordReceiver {
    /// Waits for the next line.
    ///
    /// Returns `None` once the queue is closed and every buffered line was received.
    pub async fn recv(&mut self) -> Option<FormattedLine> {
        self.rx.recv().await
    }

    /// Closes the queue: no producer can enqueue anymore, buffered lines stay receivable.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Returns the number of lines currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if no line is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Creates a record queue holding at most `capacity` lines.
pub fn create_record_queue(capacity: usize) -> IngestResult<(RecordSender, RecordReceiver)> {
    if capacity == 0 {
        bail!(
            ErrorKind::ConfigError,
            "Record queue capacity must be greater than zero"
        );
    }

    let (tx, rx) = mpsc::channel(capacity);

    Ok((RecordSender { tx }, RecordReceiver { rx }))
}
