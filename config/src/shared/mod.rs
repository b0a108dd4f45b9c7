//! Configuration types shared by the ingestion library and the logger binary.

mod base;
mod broker;
mod logger;
mod store;

pub use base::ValidationError;
pub use broker::{BrokerConfig, BrokerConfigWithoutSecrets};
pub use logger::{LoggerConfig, LoggerConfigWithoutSecrets};
pub use store::{OverflowPolicyConfig, StoreConfig};
