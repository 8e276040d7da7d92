use serde::{Deserialize, Serialize};

/// Sizing knobs for the segmented answer cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheTuning {
    /// Total entry capacity across all segments.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Segment count; must be a power of two.
    #[serde(default = "default_segments")]
    pub segments: usize,

    /// Total hash bucket count across all segments; must be a power of two.
    #[serde(default = "default_buckets")]
    pub buckets: usize,

    /// TTL substituted when an upstream answer carries TTL 0.
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u32,

    /// Max entries reclaimed per segment per expiry sweep.
    #[serde(default = "default_cleanup_batch")]
    pub cleanup_batch: usize,
}

impl Default for CacheTuning {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            segments: default_segments(),
            buckets: default_buckets(),
            default_ttl_secs: default_ttl(),
            cleanup_batch: default_cleanup_batch(),
        }
    }
}

fn default_capacity() -> usize {
    20_000
}

fn default_segments() -> usize {
    64
}

fn default_buckets() -> usize {
    4096
}

fn default_ttl() -> u32 {
    300
}

fn default_cleanup_batch() -> usize {
    100
}
