use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No topic is configured, so nothing would ever be recorded.
    #[error("`topics` must contain at least one topic")]
    NoTopics,
    /// A topic filter is empty.
    #[error("`topics[{index}]` cannot be empty")]
    EmptyTopic { index: usize },
    /// A field holds a value outside of its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
