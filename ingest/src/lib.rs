//! Concurrent ingestion of topic events into an append-only CSV store.
//!
//! Inbound `(topic, payload)` events are handed to a [`recorder::Recorder`], which formats
//! each one into a CSV line and spawns a short-lived task that offers the line to a bounded
//! queue. A single store loop drains the queue into the destination file. A shared
//! cancellation signal and a completion barrier coordinate shutdown, see
//! [`pipeline::Pipeline`].

pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod recorder;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod workers;
