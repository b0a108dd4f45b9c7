//! Records and their on-disk text representation.
//!
//! A [`Record`] is formatted exactly once, at the moment it is accepted, into a
//! [`FormattedLine`]. Only the formatted text crosses the queue, so the store loop never needs
//! to know anything about the record structure.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};

/// Header written as the first line of a new store file.
pub const STORE_HEADER: &str = "Time Stamp,Topic,Data";

/// Line terminator used for the header and every data line.
pub const LINE_TERMINATOR: &str = "\n";

/// Timestamp layout, sortable and recognized as a date-time by spreadsheet tools.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const FIELD_SEPARATOR: char = ',';
const QUOTE: char = '"';

/// A single event destined for the store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<Tz: TimeZone = Local> {
    pub timestamp: DateTime<Tz>,
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Record<Local> {
    /// Creates a record stamped with the current local wall-clock time.
    pub fn now(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp: Local::now(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

impl<Tz> Record<Tz>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    /// Formats the record into its quoted CSV line.
    pub fn format(&self) -> FormattedLine {
        format_record(&self.timestamp, &self.topic, &self.payload)
    }
}

/// The quoted, escaped and newline terminated text form of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormattedLine(String);

impl FormattedLine {
    /// Returns the line as a string slice, terminator included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the line as bytes, ready to be appended to the store file.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for FormattedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.trim_end_matches(LINE_TERMINATOR))
    }
}

/// Returns the header line, terminator included.
pub fn header_line() -> String {
    format!("{STORE_HEADER}{LINE_TERMINATOR}")
}

/// Formats `(timestamp, topic, payload)` into one CSV line.
///
/// Every field is wrapped in double quotes and internal double quotes are doubled. The payload
/// is decoded as UTF-8, with invalid sequences replaced by U+FFFD.
pub fn format_record<Tz>(timestamp: &DateTime<Tz>, topic: &str, payload: &[u8]) -> FormattedLine
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let timestamp = timestamp.format(TIMESTAMP_FORMAT).to_string();
    let payload = String::from_utf8_lossy(payload);

    let mut line = String::with_capacity(timestamp.len() + topic.len() + payload.len() + 8);
    push_quoted_field(&mut line, &timestamp);
    line.push(FIELD_SEPARATOR);
    push_quoted_field(&mut line, topic);
    line.push(FIELD_SEPARATOR);
    push_quoted_field(&mut line, &payload);
    line.push_str(LINE_TERMINATOR);

    FormattedLine(line)
}

fn push_quoted_field(line: &mut String, field: &str) {
    line.push(QUOTE);
    for c in field.chars() {
        if c == QUOTE {
            line.push(QUOTE);
        }
        line.push(c);
    }
    line.push(QUOTE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
    }

    #[test]
    fn formats_three_quoted_fields() {
        let line = format_record(&fixed_timestamp(), "Sensor1/Temp", b"21.5");

        assert_eq!(
            line.as_str(),
            "\"2024-03-09T07:05:01\",\"Sensor1/Temp\",\"21.5\"\n"
        );
    }

    #[test]
    fn doubles_internal_quotes() {
        let line = format_record(&fixed_timestamp(), "Test2", b"\"Test1\"");

        assert!(line.as_str().ends_with(",\"Test2\",\"\"\"Test1\"\"\"\n"));
    }

    #[test]
    fn keeps_separators_and_newlines_inside_quotes() {
        let line = format_record(&fixed_timestamp(), "a,b", b"x\ny");

        assert_eq!(
            line.as_str(),
            "\"2024-03-09T07:05:01\",\"a,b\",\"x\ny\"\n"
        );
    }

    #[test]
    fn replaces_invalid_utf8_payload() {
        let line = format_record(&fixed_timestamp(), "raw", &[0x66, 0xff, 0x6f]);

        assert!(line.as_str().ends_with(",\"f\u{fffd}o\"\n"));
    }

    #[test]
    fn record_format_matches_free_function() {
        let record = Record {
            timestamp: fixed_timestamp(),
            topic: "demo".to_string(),
            payload: b"on".to_vec(),
        };

        assert_eq!(
            record.format(),
            format_record(&fixed_timestamp(), "demo", b"on")
        );
    }

    #[test]
    fn header_uses_same_terminator_as_lines() {
        assert_eq!(header_line(), "Time Stamp,Topic,Data\n");
        assert!(format_record(&fixed_timestamp(), "t", b"p").as_str().ends_with(LINE_TERMINATOR));
    }

    #[test]
    fn display_omits_terminator() {
        let line = format_record(&fixed_timestamp(), "t", b"p");

        assert_eq!(line.to_string(), "\"2024-03-09T07:05:01\",\"t\",\"p\"");
    }
}
