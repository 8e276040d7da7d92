use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Upstream resolvers as `ip` or `ip:port`; port 53 assumed when absent.
    /// Merged with (and overridden by) a `-c` resolver file when given.
    #[serde(default)]
    pub servers: Vec<String>,
}

impl UpstreamConfig {
    /// Resolver substituted when no usable upstream could be loaded.
    pub const FALLBACK: &'static str = "8.8.8.8:53";
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { servers: vec![] }
    }
}
