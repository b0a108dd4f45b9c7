use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{BrokerConfig, BrokerConfigWithoutSecrets, StoreConfig, ValidationError};

/// Complete configuration of the topic logger.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    pub broker: BrokerConfig,
    /// Topic filters to subscribe to. Also sizes the record queue.
    pub topics: Vec<String>,
    #[serde(default)]
    pub store: StoreConfig,
}

impl LoggerConfig {
    /// Validates the complete logger configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topics.is_empty() {
            return Err(ValidationError::NoTopics);
        }

        if let Some(index) = self.topics.iter().position(|topic| topic.is_empty()) {
            return Err(ValidationError::EmptyTopic { index });
        }

        self.broker.validate()?;
        self.store.validate()
    }
}

impl Config for LoggerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["topics"];
}

/// Same as [`LoggerConfig`] but without secrets, safe to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfigWithoutSecrets {
    pub broker: BrokerConfigWithoutSecrets,
    pub topics: Vec<String>,
    pub store: StoreConfig,
}

impl From<LoggerConfig> for LoggerConfigWithoutSecrets {
    fn from(value: LoggerConfig) -> Self {
        LoggerConfigWithoutSecrets {
            broker: value.broker.into(),
            topics: value.topics,
            store: value.store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(topics: &[&str]) -> LoggerConfig {
        let json = serde_json::json!({
            "broker": {
                "addr": "tcp://localhost:1883",
                "client_id": "mli",
                "password": "hunter2"
            },
            "topics": topics,
        });

        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn store_section_is_optional() {
        let config = config(&["demo"]);

        assert_eq!(config.store, StoreConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_missing_and_empty_topics() {
        assert_eq!(config(&[]).validate(), Err(ValidationError::NoTopics));
        assert_eq!(
            config(&["demo", ""]).validate(),
            Err(ValidationError::EmptyTopic { index: 1 })
        );
    }

    #[test]
    fn printable_form_has_no_password() {
        let printable = LoggerConfigWithoutSecrets::from(config(&["demo"]));
        let output = serde_json::to_string(&printable).unwrap();

        assert!(!output.contains("hunter2"));
        assert!(output.contains("tcp://localhost:1883"));
    }
}
