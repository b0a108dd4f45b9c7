//! Concurrency utilities for coordinating the ingestion pipeline.
//!
//! The pipeline has many short-lived producers (one record task per inbound message) and a
//! single long-lived consumer (the store loop). They coordinate through three primitives:
//!
//! - [`shutdown`] broadcasts a single, idempotent cancellation signal to every task.
//! - [`barrier`] counts in-flight record tasks so shutdown can wait for all of them to resolve.
//! - [`coordinator`] bundles both into the handle the pipeline owns during its lifetime.

pub mod barrier;
pub mod coordinator;
pub mod shutdown;
