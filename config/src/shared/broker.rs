use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Connection settings of the message broker client.
///
/// The logger only validates and carries these settings; they are consumed by the protocol
/// client feeding the recorder.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the password.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker address, for example `tcp://localhost:1883`.
    pub addr: String,
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// CA certificate used to verify the broker.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub client_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub client_key_file: Option<PathBuf>,
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.addr.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "broker.addr".to_string(),
                constraint: "cannot be empty".to_string(),
            });
        }

        if self.client_cert_file.is_some() != self.client_key_file.is_some() {
            return Err(ValidationError::InvalidFieldValue {
                field: "broker.client_cert_file".to_string(),
                constraint: "must be set together with `broker.client_key_file`".to_string(),
            });
        }

        Ok(())
    }
}

/// Same as [`BrokerConfig`] but without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfigWithoutSecrets {
    pub addr: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_file: Option<PathBuf>,
}

impl From<BrokerConfig> for BrokerConfigWithoutSecrets {
    fn from(value: BrokerConfig) -> Self {
        BrokerConfigWithoutSecrets {
            addr: value.addr,
            client_id: value.client_id,
            username: value.username,
            ca_file: value.ca_file,
            client_cert_file: value.client_cert_file,
            client_key_file: value.client_key_file,
        }
    }
}
