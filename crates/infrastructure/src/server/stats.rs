use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Relay-wide counters. Everything here is monotonic and updated with
/// relaxed atomics; the periodic status snapshot is the only reader.
pub struct RelayStats {
    start: Instant,
    pub tasks_queued: AtomicU64,
    pub tasks_dropped: AtomicU64,
    pub tasks_processed: AtomicU64,
    pub client_requests: AtomicU64,
    pub upstream_responses: AtomicU64,
    pub forwarded: AtomicU64,
    pub override_hits: AtomicU64,
    pub blocked_queries: AtomicU64,
    pub parse_failures: AtomicU64,
    pub register_failures: AtomicU64,
    pub unknown_responses: AtomicU64,
    pub send_failures: AtomicU64,
    pub send_soft_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub tasks_queued: u64,
    pub tasks_dropped: u64,
    pub tasks_processed: u64,
    pub client_requests: u64,
    pub upstream_responses: u64,
    pub forwarded: u64,
    pub override_hits: u64,
    pub blocked_queries: u64,
    pub parse_failures: u64,
    pub register_failures: u64,
    pub unknown_responses: u64,
    pub send_failures: u64,
    pub send_soft_failures: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            tasks_queued: AtomicU64::new(0),
            tasks_dropped: AtomicU64::new(0),
            tasks_processed: AtomicU64::new(0),
            client_requests: AtomicU64::new(0),
            upstream_responses: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            override_hits: AtomicU64::new(0),
            blocked_queries: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            register_failures: AtomicU64::new(0),
            unknown_responses: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            send_soft_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.start.elapsed().as_secs(),
            tasks_queued: self.tasks_queued.load(Ordering::Relaxed),
            tasks_dropped: self.tasks_dropped.load(Ordering::Relaxed),
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            client_requests: self.client_requests.load(Ordering::Relaxed),
            upstream_responses: self.upstream_responses.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            override_hits: self.override_hits.load(Ordering::Relaxed),
            blocked_queries: self.blocked_queries.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            register_failures: self.register_failures.load(Ordering::Relaxed),
            unknown_responses: self.unknown_responses.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            send_soft_failures: self.send_soft_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
