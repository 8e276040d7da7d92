pub mod config;
pub mod errors;
pub mod record_type;

pub use config::{
    CacheTuning, CliOverrides, Config, ConfigError, LoggingConfig, ServerConfig,
    TransactionTuning, UpstreamConfig,
};
pub use errors::RelayError;
pub use record_type::RecordType;
