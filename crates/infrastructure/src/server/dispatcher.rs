use super::task::{Task, TaskKind};
use super::{RelayContext, RelayStats};
use crate::clock;
use crate::codec;
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often expired cache entries and stale in-flight mappings are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// How often the status snapshot is emitted.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Single-threaded dispatch loop: drain the socket, classify, enqueue, and
/// run the periodic maintenance between datagrams. The socket's 1 s receive
/// timeout bounds every wait, so shutdown and maintenance are never starved.
pub(super) fn dispatcher_loop(context: &RelayContext) {
    let mut buffer = [0u8; codec::MAX_DATAGRAM];
    let mut last_sweep = Instant::now();
    let mut last_status = Instant::now();

    info!("Dispatcher started");

    while !context.shutdown_requested() {
        match context.socket.recv_from(&mut buffer) {
            Ok((len, source)) => {
                if len < codec::HEADER_LEN {
                    RelayStats::bump(&context.stats.parse_failures);
                    debug!(len, %source, "Datagram too short, ignored");
                } else {
                    dispatch(context, &buffer[..len], source);
                }
            }
            Err(e)
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
                    || e.kind() == ErrorKind::Interrupted => {}
            // Windows surfaces ICMP port-unreachable as ConnectionReset on
            // the next receive; nothing to do for a datagram socket.
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
            Err(e) => {
                error!(error = %e, "Receive failed");
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        if last_sweep.elapsed() >= SWEEP_INTERVAL {
            run_sweeps(context);
            last_sweep = Instant::now();
        }
        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(context);
            last_status = Instant::now();
        }
    }

    info!("Dispatcher exiting");
}

fn dispatch(context: &RelayContext, datagram: &[u8], source: std::net::SocketAddr) {
    let kind = if context.upstreams.contains(&source) {
        TaskKind::UpstreamResponse
    } else {
        TaskKind::ClientRequest
    };

    match context.queue.push(Task::new(datagram, source, kind)) {
        Ok(()) => {
            RelayStats::bump(&context.stats.tasks_queued);
        }
        Err(_) => {
            RelayStats::bump(&context.stats.tasks_dropped);
            warn!(%source, ?kind, "Task queue full, datagram dropped");
        }
    }
}

fn run_sweeps(context: &RelayContext) {
    let now = clock::now_secs();
    let reclaimed = context
        .transactions
        .sweep_expired(now, context.request_timeout_secs);
    let expired = context.cache.sweep_expired();
    if reclaimed > 0 || expired > 0 {
        debug!(reclaimed, expired, "Periodic sweep finished");
    }
}

fn log_status(context: &RelayContext) {
    let stats = context.stats.snapshot();
    let cache = context.cache.stats();
    info!(
        uptime_secs = stats.uptime_secs,
        queue_len = context.queue.len(),
        processed = stats.tasks_processed,
        dropped = stats.tasks_dropped,
        client_requests = stats.client_requests,
        upstream_responses = stats.upstream_responses,
        forwarded = stats.forwarded,
        override_hits = stats.override_hits,
        blocked = stats.blocked_queries,
        cache_size = cache.size,
        cache_hits = cache.hits,
        cache_misses = cache.misses,
        cache_evictions = cache.evictions,
        in_flight = context.transactions.len(),
        "Relay status"
    );
}
