use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// UDP port the relay listens on. 0 lets the OS pick (used by tests).
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Worker thread count; 0 resolves to 1.5x CPU cores, clamped to 1..=31.
    #[serde(default)]
    pub worker_threads: usize,

    /// Task queue capacity, sized for multi-second burst absorption.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            worker_threads: 0,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ServerConfig {
    pub const MAX_WORKER_THREADS: usize = 31;

    /// Effective worker count for this host.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads != 0 {
            return self.worker_threads.clamp(1, Self::MAX_WORKER_THREADS);
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cores * 3 / 2).clamp(1, Self::MAX_WORKER_THREADS)
    }
}

fn default_port() -> u16 {
    53
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_queue_capacity() -> usize {
    20_000
}
