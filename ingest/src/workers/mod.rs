//! Long-lived workers of the ingestion pipeline.
//!
//! The only long-lived worker is the [`store`] loop. Record tasks are ephemeral and live in
//! [`crate::recorder`].

pub mod base;
pub mod store;
