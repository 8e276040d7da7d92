use dnsrelay_domain::Config;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber from the configured level.
///
/// `RUST_LOG` still wins when set, so targeted filters remain possible
/// without touching the config file.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
