//! Line based event source.
//!
//! Stands in for a message broker client: every input line `topic<TAB>payload` is one
//! inbound message. End of input releases the recorder so the pipeline can write what is
//! queued and stop. A read error is treated like a lost broker connection and cancels the
//! pipeline.

use ingest::concurrency::shutdown::ShutdownTx;
use ingest::recorder::RecorderFn;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

const TOPIC_SEPARATOR: char = '\t';

/// Splits a line into its topic and payload.
///
/// Returns `None` when the separator is missing or the topic is empty. The payload is kept
/// verbatim and may be empty.
pub fn parse_event(line: &str) -> Option<(&str, &str)> {
    let (topic, payload) = line.split_once(TOPIC_SEPARATOR)?;

    if topic.is_empty() {
        return None;
    }

    Some((topic, payload))
}

/// Feeds every event read from `reader` to `recorder` until input ends or shutdown starts.
///
/// The recorder is dropped on return. Returns the number of events handed to it.
pub async fn run_line_source<R>(reader: R, recorder: RecorderFn, shutdown_tx: ShutdownTx) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut dispatched = 0;

    loop {
        let line = tokio::select! {
            biased;

            _ = shutdown_rx.wait_for_shutdown() => {
                debug!(dispatched, "shutdown started, event source stopped");

                return dispatched;
            }

            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => match parse_event(&line) {
                Some((topic, payload)) => {
                    recorder(topic, payload.as_bytes());
                    dispatched += 1;
                }
                None => warn!(line = %line, "skipping line without a topic"),
            },
            Ok(None) => {
                info!(dispatched, "event source reached end of input");

                return dispatched;
            }
            Err(err) => {
                error!(error = %err, dispatched, "event source failed, shutting down");
                shutdown_tx.shutdown();

                return dispatched;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use ingest::concurrency::shutdown::create_shutdown_channel;
    use ingest::pipeline::{Pipeline, PipelineConfig};
    use ingest::record::STORE_HEADER;
    use tokio::time::timeout;

    use super::*;

    type Events = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

    fn collecting_recorder() -> (RecorderFn, Events) {
        let events = Events::default();
        let sink = events.clone();
        let recorder: RecorderFn = Arc::new(move |topic: &str, payload: &[u8]| {
            sink.lock().unwrap().push((topic.to_owned(), payload.to_vec()));
        });

        (recorder, events)
    }

    #[test]
    fn parses_topic_and_payload() {
        assert_eq!(parse_event("Sensor1/Temp\t21.5"), Some(("Sensor1/Temp", "21.5")));
        assert_eq!(parse_event("demo\ta\tb"), Some(("demo", "a\tb")));
        assert_eq!(parse_event("demo\t"), Some(("demo", "")));
        assert_eq!(parse_event("\tpayload"), None);
        assert_eq!(parse_event("no separator"), None);
    }

    #[tokio::test]
    async fn end_of_input_releases_the_recorder_without_shutdown() {
        let (recorder, events) = collecting_recorder();
        let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();
        let input: &[u8] = b"demo\tone\ninvalid\nd1\t\"two\"\r\n";

        let dispatched = run_line_source(input, recorder, shutdown_tx.clone()).await;

        assert_eq!(dispatched, 2);
        assert!(!shutdown_tx.is_shutdown());
        assert_eq!(Arc::strong_count(&events), 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ("demo".to_owned(), b"one".to_vec()),
                ("d1".to_owned(), b"\"two\"".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn read_error_triggers_shutdown() {
        let (recorder, events) = collecting_recorder();
        let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();
        let input: &[u8] = b"demo\tone\n\xff\xfe\ndemo\tthree\n";

        let dispatched = run_line_source(input, recorder, shutdown_tx.clone()).await;

        assert_eq!(dispatched, 1);
        assert!(shutdown_tx.is_shutdown());
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn piped_events_are_all_stored_at_end_of_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mli.csv");
        let mut pipeline = Pipeline::new(PipelineConfig::new(&path, 8));
        pipeline.start().await.unwrap();
        let input: &[u8] = b"demo\tone\ndemo\ttwo\ndemo\tthree\n";

        let dispatched = run_line_source(
            input,
            pipeline.recorder_fn().unwrap(),
            pipeline.shutdown_tx(),
        )
        .await;
        timeout(Duration::from_secs(5), pipeline.wait())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(dispatched, 3);
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(STORE_HEADER));
        let mut payloads: Vec<_> = lines
            .map(|line| line.rsplit(',').next().unwrap().to_owned())
            .collect();
        payloads.sort();
        assert_eq!(payloads, ["\"one\"", "\"three\"", "\"two\""]);
    }

    #[tokio::test]
    async fn stops_once_shutdown_started() {
        let (recorder, events) = collecting_recorder();
        let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();
        shutdown_tx.shutdown();
        let input: &[u8] = b"demo\tone\n";

        let dispatched = run_line_source(input, recorder, shutdown_tx).await;

        assert_eq!(dispatched, 0);
        assert!(events.lock().unwrap().is_empty());
    }
}
