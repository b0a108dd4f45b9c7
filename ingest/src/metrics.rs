//! Metrics definitions for ingestion monitoring.
//!
//! Metrics are emitted through the `metrics` facade and are no-ops until a recorder is
//! installed by the binary.

/// Label for the reason a record was dropped.
pub const DROP_REASON_LABEL: &str = "reason";

// Record task metrics

/// Counter for records accepted by the queue.
pub const MLI_RECORDS_ENQUEUED_TOTAL: &str = "mli_records_enqueued_total";

/// Counter for records dropped before reaching the queue, labeled by reason.
pub const MLI_RECORDS_DROPPED_TOTAL: &str = "mli_records_dropped_total";

/// Gauge for record tasks currently waiting on the queue.
pub const MLI_RECORDS_IN_FLIGHT: &str = "mli_records_in_flight";

// Store loop metrics

/// Counter for lines appended to the store file.
pub const MLI_STORE_LINES_WRITTEN_TOTAL: &str = "mli_store_lines_written_total";

/// Counter for lines lost because the append failed.
pub const MLI_STORE_WRITE_FAILURES_TOTAL: &str = "mli_store_write_failures_total";
