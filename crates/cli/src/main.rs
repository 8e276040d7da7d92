use clap::Parser;
use dnsrelay_domain::{CliOverrides, Config, UpstreamConfig};
use dnsrelay_infrastructure::{OverrideTable, RelayServer, UpstreamPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod bootstrap;

#[derive(Parser)]
#[command(name = "dnsrelay")]
#[command(version)]
#[command(about = "DNS relay with local overrides, ad-blocking and caching")]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short = 'f', long, value_name = "FILE")]
    config: Option<String>,

    /// Log level (error, warn, info, debug)
    #[arg(short = 'd', long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Upstream resolver file, one address per line
    #[arg(short = 'c', long, value_name = "FILE")]
    upstreams: Option<String>,

    /// Override table file, `<ip> <domain>` per line
    #[arg(short = 'r', long, value_name = "FILE")]
    overrides: Option<String>,

    /// UDP port to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Some("debug".to_string())
    } else {
        cli.log_level.clone()
    };

    let cli_overrides = CliOverrides {
        port: cli.port,
        bind_address: cli.bind.clone(),
        log_level,
    };

    let config = Config::load(cli.config.as_deref(), cli_overrides)?;
    config.validate()?;

    bootstrap::init_logging(&config);

    info!("Starting dnsrelay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        bind = %config.server.bind_address,
        port = config.server.port,
        workers = config.server.resolved_worker_threads(),
        log_level = %config.logging.level,
        "Effective configuration"
    );

    let overrides = load_overrides(cli.overrides.as_deref());
    let upstreams = load_upstreams(&config, cli.upstreams.as_deref());
    for endpoint in upstreams.endpoints() {
        info!(%endpoint, "Using upstream resolver");
    }

    let mut server = RelayServer::bind(&config, overrides, upstreams)?;
    server.start()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        })?;
    }

    while !interrupted.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("Interrupt received, shutting down");
    server.shutdown();
    info!("Shutdown complete");
    Ok(())
}

/// Missing or unreadable override files are a warning, not a startup
/// failure; the relay runs with whatever loaded.
fn load_overrides(path: Option<&str>) -> OverrideTable {
    let table = OverrideTable::new();
    if let Some(path) = path {
        if let Err(e) = table.load_file(path) {
            warn!(path, error = %e, "Failed to load override table, continuing without it");
        }
    }
    table
}

/// Build the upstream pool from the `-c` file and/or the config list,
/// falling back to the default public resolver when nothing usable loads.
fn load_upstreams(config: &Config, path: Option<&str>) -> UpstreamPool {
    let mut pool = UpstreamPool::new();

    if let Some(path) = path {
        if let Err(e) = pool.load_file(path) {
            warn!(path, error = %e, "Failed to load upstream file");
        }
    }
    for server in &config.upstream.servers {
        match UpstreamPool::parse_endpoint(server) {
            Ok(endpoint) => {
                pool.add(endpoint);
            }
            Err(e) => warn!(server = %server, error = %e, "Skipping configured upstream"),
        }
    }

    if pool.is_empty() {
        warn!(
            fallback = UpstreamConfig::FALLBACK,
            "No usable upstream configured, using fallback resolver"
        );
        if let Ok(endpoint) = UpstreamPool::parse_endpoint(UpstreamConfig::FALLBACK) {
            pool.add(endpoint);
        }
    }
    pool
}
