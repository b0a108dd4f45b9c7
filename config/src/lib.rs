//! Configuration of the topic logger.
//!
//! Configuration can be loaded in two ways: layered from a `configuration/` directory with
//! `APP_` prefixed environment overrides (see [`load_config`]), or from a single JSON file
//! (see [`json`]), which is also the format of the starter template.

mod environment;
pub mod json;
mod load;
pub mod shared;

pub use environment::{Environment, EnvironmentError};
pub use load::{Config, LoadConfigError, load_config, load_config_from_file};
