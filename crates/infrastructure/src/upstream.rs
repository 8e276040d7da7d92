//! Upstream resolver pool.
//!
//! Single source of truth for upstream endpoints. Workers pick a target via
//! the round-robin cursor (or `random` for cache-locality-insensitive
//! workloads); the dispatcher classifies incoming datagrams as
//! upstream replies by source-address membership. That classification is
//! sound because the relay talks to upstreams from its one socket and LAN
//! clients cannot spoof upstream source addresses.

use dnsrelay_domain::RelayError;
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

const DEFAULT_DNS_PORT: u16 = 53;

pub struct UpstreamPool {
    endpoints: Vec<SocketAddr>,
    cursor: AtomicUsize,
}

impl UpstreamPool {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Parse `ip` or `ip:port` into an endpoint; bare addresses get port 53.
    pub fn parse_endpoint(value: &str) -> Result<SocketAddr, RelayError> {
        let trimmed = value.trim();
        if let Ok(addr) = trimmed.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = trimmed.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, DEFAULT_DNS_PORT));
        }
        Err(RelayError::InvalidEndpoint(trimmed.to_string()))
    }

    /// Add an endpoint; duplicates are rejected.
    pub fn add(&mut self, endpoint: SocketAddr) -> bool {
        if self.endpoints.contains(&endpoint) {
            return false;
        }
        self.endpoints.push(endpoint);
        true
    }

    /// Load one endpoint per non-comment line. Invalid lines are skipped
    /// with a warning; the caller decides whether an empty result warrants
    /// the fallback resolver.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> std::io::Result<usize> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let mut added = 0;

        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match Self::parse_endpoint(trimmed) {
                Ok(endpoint) => {
                    if self.add(endpoint) {
                        added += 1;
                    }
                }
                Err(_) => {
                    warn!(line = trimmed, "Skipping invalid upstream endpoint");
                }
            }
        }

        info!(path = %path.display(), added, "Loaded upstream pool");
        Ok(added)
    }

    /// Next endpoint by round-robin cursor.
    pub fn next(&self) -> Option<SocketAddr> {
        if self.endpoints.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        Some(self.endpoints[index])
    }

    /// Uniformly random endpoint.
    pub fn random(&self) -> Option<SocketAddr> {
        if self.endpoints.is_empty() {
            return None;
        }
        Some(self.endpoints[fastrand::usize(..self.endpoints.len())])
    }

    /// Whether a datagram source is one of our upstreams.
    pub fn contains(&self, source: &SocketAddr) -> bool {
        self.endpoints.contains(source)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[SocketAddr] {
        &self.endpoints
    }
}

impl Default for UpstreamPool {
    fn default() -> Self {
        Self::new()
    }
}
