use std::path::Path;

use anyhow::Context;
use config::json::load_json;
use config::shared::LoggerConfig;
use config::{load_config, load_config_from_file};

/// Loads and validates the logger configuration.
///
/// `.json` files are read as a single document, like the ones written by `mli template`.
/// Any other file is loaded with `APP_` environment overrides, and without a file the
/// layered `configuration/` directory is used.
pub fn load_logger_config(path: Option<&Path>) -> anyhow::Result<LoggerConfig> {
    let config = match path {
        Some(path) if is_json(path) => load_json(path)?,
        Some(path) => load_config_from_file::<LoggerConfig>(path)?,
        None => load_config::<LoggerConfig>()?,
    };

    config
        .validate()
        .context("configuration is not valid")?;

    Ok(config)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
}
