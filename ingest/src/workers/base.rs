use std::future::Future;

use crate::error::IngestResult;

/// Trait for background workers of the ingestion pipeline.
///
/// Starting a worker spawns its task and returns a handle that can be used to observe the
/// worker state and wait for its completion.
///
/// The generic parameter `H` represents the handle type returned when the worker starts,
/// and `S` represents the state type accessible through the handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type returned when worker startup fails.
    type Error;

    /// Starts the worker and returns a handle for monitoring its execution.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// Handle for monitoring and controlling a running worker.
///
/// The handle remains valid after the worker completes, so its final state can still be read.
pub trait WorkerHandle<S> {
    /// Returns a snapshot handle of the worker state.
    fn state(&self) -> S;

    /// Waits for the worker to complete and returns its final result.
    fn wait(self) -> impl Future<Output = IngestResult<()>> + Send;
}
