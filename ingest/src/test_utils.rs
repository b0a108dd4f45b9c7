//! Helpers shared by unit and integration tests.

use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::time::{Instant, sleep};

use crate::record::{FormattedLine, format_record};

/// Builds a deterministic line for `payload` under the `test` topic.
pub fn test_line(payload: &str) -> FormattedLine {
    let timestamp = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("fixed timestamp is valid");

    format_record(&timestamp, "test", payload.as_bytes())
}

/// Reads the store file, returning an empty string when it does not exist yet.
pub async fn read_store(path: &Path) -> String {
    tokio::fs::read_to_string(path).await.unwrap_or_default()
}

/// Polls the store file until it holds at least `count` lines, header included.
///
/// Returns the file contents seen last, whether or not the count was reached.
pub async fn wait_for_lines(path: &Path, count: usize, timeout: Duration) -> String {
    let deadline = Instant::now() + timeout;

    loop {
        let contents = read_store(path).await;
        if contents.lines().count() >= count || Instant::now() >= deadline {
            return contents;
        }

        sleep(Duration::from_millis(5)).await;
    }
}
