use serde::{Deserialize, Serialize};

use super::cache::CacheTuning;
use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use super::transactions::TransactionTuning;
use super::upstream::UpstreamConfig;

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listener and worker-pool settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Answer cache sizing.
    #[serde(default)]
    pub cache: CacheTuning,

    /// In-flight transaction map sizing.
    #[serde(default)]
    pub transactions: TransactionTuning,

    /// Upstream resolver endpoints.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file or use defaults.
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. dnsrelay.toml in current directory
    /// 3. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new("dnsrelay.toml").exists() {
            Self::from_file("dnsrelay.toml")?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn power_of_two(name: &str, value: usize) -> Result<(), ConfigError> {
            if value == 0 || !value.is_power_of_two() {
                return Err(ConfigError::Validation(format!(
                    "{} must be a power of two, got {}",
                    name, value
                )));
            }
            Ok(())
        }

        power_of_two("cache.segments", self.cache.segments)?;
        power_of_two("cache.buckets", self.cache.buckets)?;
        power_of_two("transactions.segments", self.transactions.segments)?;
        power_of_two("transactions.buckets", self.transactions.buckets)?;

        if self.cache.capacity == 0 {
            return Err(ConfigError::Validation(
                "cache.capacity cannot be 0".to_string(),
            ));
        }
        if self.cache.buckets < self.cache.segments {
            return Err(ConfigError::Validation(
                "cache.buckets must be >= cache.segments".to_string(),
            ));
        }
        if self.transactions.capacity == 0 {
            return Err(ConfigError::Validation(
                "transactions.capacity cannot be 0".to_string(),
            ));
        }
        if self.transactions.buckets < self.transactions.segments {
            return Err(ConfigError::Validation(
                "transactions.buckets must be >= transactions.segments".to_string(),
            ));
        }
        if self.server.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "server.queue_capacity cannot be 0".to_string(),
            ));
        }
        if self.transactions.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "transactions.request_timeout_secs cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}
