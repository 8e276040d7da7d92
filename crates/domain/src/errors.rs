use thiserror::Error;

/// Errors that can abort startup or surface from the relay's seams.
///
/// Hot-path conditions (queue full, arena exhausted, unknown upstream ID)
/// are deliberately *not* represented here; they are counted and logged
/// where they occur and never propagate past the worker.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    SocketBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to configure UDP socket: {0}")]
    SocketOption(#[source] std::io::Error),

    #[error("Invalid upstream endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Upstream pool is empty")]
    EmptyUpstreamPool,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("DNS protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
