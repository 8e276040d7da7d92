use serde::{Deserialize, Serialize};

/// Sizing knobs for the in-flight transaction map.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionTuning {
    /// Entry slot capacity; bounds concurrent in-flight queries.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Segment count; must be a power of two.
    #[serde(default = "default_segments")]
    pub segments: usize,

    /// Total hash bucket count across all segments; must be a power of two.
    #[serde(default = "default_buckets")]
    pub buckets: usize,

    /// Seconds before an unanswered forwarded query is reclaimed.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Max entries reclaimed per segment per expiry sweep.
    #[serde(default = "default_cleanup_batch")]
    pub cleanup_batch: usize,
}

impl Default for TransactionTuning {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            segments: default_segments(),
            buckets: default_buckets(),
            request_timeout_secs: default_request_timeout(),
            cleanup_batch: default_cleanup_batch(),
        }
    }
}

fn default_capacity() -> usize {
    50_000
}

fn default_segments() -> usize {
    64
}

fn default_buckets() -> usize {
    4096
}

fn default_request_timeout() -> u64 {
    3
}

fn default_cleanup_batch() -> usize {
    100
}
