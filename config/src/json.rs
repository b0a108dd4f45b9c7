//! Single-file JSON configuration.
//!
//! This is the format written by `mli template`: one pretty-printed JSON document holding the
//! broker settings, the topics and the store settings. Unlike [`crate::load_config`], no
//! environment overrides are applied.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;

use crate::shared::{BrokerConfig, LoggerConfig, StoreConfig};

/// Indentation of saved files.
const INDENT: &[u8] = b"    ";

/// Permissions of a saved configuration file.
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

const TEMPLATE_TOPICS: &[&str] = &["demo", "d1", "Sensor1/Temp", "Sensor1/Humidity"];

#[derive(Debug, Error)]
pub enum JsonConfigError {
    #[error("failed to read configuration file `{path}`: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse configuration file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write configuration file `{path}`: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Loads a [`LoggerConfig`] from a JSON file.
pub fn load_json(path: impl AsRef<Path>) -> Result<LoggerConfig, JsonConfigError> {
    let path = path.as_ref();

    let contents = std::fs::read(path).map_err(|source| JsonConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&contents).map_err(|source| JsonConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves `config` as indented JSON, replacing any existing file.
///
/// The password is written in clear text, as it has to be read back by [`load_json`].
pub fn save_json(path: impl AsRef<Path>, config: &LoggerConfig) -> Result<(), JsonConfigError> {
    let path = path.as_ref();

    let mut contents = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut contents, PrettyFormatter::with_indent(INDENT));
    JsonLoggerConfig::from(config)
        .serialize(&mut serializer)
        .map_err(JsonConfigError::Serialize)?;

    write_file(path, &contents).map_err(|source| JsonConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns the starter configuration, filled with placeholders to be edited.
pub fn template() -> LoggerConfig {
    LoggerConfig {
        broker: BrokerConfig {
            addr: "tcp://192.168.0.0:1883".to_string(),
            client_id: "mli-demo".to_string(),
            username: Some("Username Here".to_string()),
            password: Some(SecretString::new("Password Here".to_string())),
            ca_file: Some(PathBuf::from("/path/to/ca.crt-optional")),
            client_cert_file: Some(PathBuf::from("/path/to/user.client.crt-optional")),
            client_key_file: Some(PathBuf::from("/path/to/user.client.key-optional")),
        },
        topics: TEMPLATE_TOPICS.iter().map(|topic| topic.to_string()).collect(),
        store: StoreConfig::default(),
    }
}

/// Writes the starter configuration to `path`.
pub fn write_template(path: impl AsRef<Path>) -> Result<(), JsonConfigError> {
    save_json(path, &template())
}

fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.flush()
}

/// Serializable view of a [`LoggerConfig`] with the password exposed.
#[derive(Serialize)]
struct JsonLoggerConfig<'a> {
    broker: JsonBrokerConfig<'a>,
    topics: &'a [String],
    store: &'a StoreConfig,
}

#[derive(Serialize)]
struct JsonBrokerConfig<'a> {
    addr: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ca_file: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_cert_file: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_key_file: Option<&'a Path>,
}

impl<'a> From<&'a LoggerConfig> for JsonLoggerConfig<'a> {
    fn from(config: &'a LoggerConfig) -> Self {
        let broker = &config.broker;

        JsonLoggerConfig {
            broker: JsonBrokerConfig {
                addr: &broker.addr,
                client_id: &broker.client_id,
                username: broker.username.as_deref(),
                password: broker
                    .password
                    .as_ref()
                    .map(|password| password.expose_secret().as_str()),
                ca_file: broker.ca_file.as_deref(),
                client_cert_file: broker.client_cert_file.as_deref(),
                client_key_file: broker.client_key_file.as_deref(),
            },
            topics: &config.topics,
            store: &config.store,
        }
    }
}
