pub mod cache;
pub mod errors;
pub mod logging;
pub mod root;
pub mod server;
pub mod transactions;
pub mod upstream;

pub use cache::CacheTuning;
pub use errors::ConfigError;
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
pub use transactions::TransactionTuning;
pub use upstream::UpstreamConfig;
