//! Logging and metrics setup for the logger binary.

pub mod logging;
pub mod metrics;
