use super::queue::Pop;
use super::task::{Task, TaskKind};
use super::{RelayContext, RelayStats};
use crate::codec;
use crate::overrides::OverrideDecision;
use dnsrelay_domain::RecordType;
use hickory_proto::op::{Message, ResponseCode};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded dequeue wait so workers notice the shutdown flag.
const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// TTL stamped on synthesized override and block answers.
const OVERRIDE_TTL: u32 = 300;

pub(super) fn worker_loop(context: &RelayContext, index: usize) {
    debug!(worker = index, "Worker started");

    loop {
        match context.queue.pop(POP_TIMEOUT) {
            Pop::Task(task) => {
                if task.kind == TaskKind::Shutdown {
                    break;
                }
                process(context, task);
            }
            Pop::TimedOut => {
                if context.shutdown_requested() {
                    break;
                }
            }
            Pop::Closed => break,
        }
    }

    info!(worker = index, "Worker exiting");
}

fn process(context: &RelayContext, task: Task) {
    let message = match codec::parse(&task.data) {
        Ok(message) => message,
        Err(e) => {
            RelayStats::bump(&context.stats.parse_failures);
            warn!(source = %task.source, error = %e, "Dropping undecodable datagram");
            return;
        }
    };

    match task.kind {
        TaskKind::ClientRequest => {
            RelayStats::bump(&context.stats.client_requests);
            handle_client_request(context, &message, &task);
        }
        TaskKind::UpstreamResponse => {
            RelayStats::bump(&context.stats.upstream_responses);
            handle_upstream_response(context, &message, task);
        }
        TaskKind::Shutdown => return,
    }

    RelayStats::bump(&context.stats.tasks_processed);
}

/// Three-tier decision for a client query: override table, then answer
/// cache, then forward to an upstream under a freshly allocated ID.
fn handle_client_request(context: &RelayContext, message: &Message, task: &Task) {
    let Some((name, qtype)) = codec::first_question(message) else {
        RelayStats::bump(&context.stats.parse_failures);
        warn!(source = %task.source, "Query without question section dropped");
        return;
    };

    match context.overrides.lookup(&name, qtype) {
        OverrideDecision::Blocked => {
            RelayStats::bump(&context.stats.blocked_queries);
            info!(domain = %name, %qtype, client = %task.source, "Domain blocked");
            respond_with_address(context, message, task.source, block_sentinel(qtype));
            return;
        }
        OverrideDecision::Address(address) => {
            RelayStats::bump(&context.stats.override_hits);
            debug!(domain = %name, %qtype, %address, "Override hit");
            respond_with_address(context, message, task.source, address);
            return;
        }
        OverrideDecision::NotFound => {}
    }

    if let Some(answer) = context.cache.lookup(&name, qtype) {
        debug!(domain = %name, %qtype, "Cache hit");
        match codec::build_cached_response(message, &answer) {
            Ok(response) => {
                send_best_effort(context, &response, task.source);
            }
            Err(e) => {
                warn!(domain = %name, error = %e, "Failed to build cached response");
            }
        }
        return;
    }

    forward_to_upstream(context, message, task, &name, qtype);
}

fn forward_to_upstream(
    context: &RelayContext,
    message: &Message,
    task: &Task,
    name: &str,
    qtype: RecordType,
) {
    let upstream_id = match context.transactions.register(message.id(), task.source) {
        Ok(upstream_id) => upstream_id,
        Err(e) => {
            RelayStats::bump(&context.stats.register_failures);
            warn!(domain = %name, client = %task.source, error = %e, "Query dropped");
            return;
        }
    };

    let Some(upstream) = context.upstreams.next() else {
        RelayStats::bump(&context.stats.register_failures);
        context.transactions.take(upstream_id);
        warn!(domain = %name, "No upstream available, query dropped");
        return;
    };

    // Forward the client's datagram as received, with only the ID renamed,
    // so EDNS options and unknown sections survive untouched.
    let mut datagram = task.data.to_vec();
    codec::patch_id(&mut datagram, upstream_id);

    debug!(
        domain = %name,
        %qtype,
        original_id = message.id(),
        upstream_id,
        %upstream,
        "Forwarding to upstream"
    );

    if send_best_effort(context, &datagram, upstream) {
        RelayStats::bump(&context.stats.forwarded);
    } else {
        // Hard send failure: undo the registration so the ID is not stranded
        // until the expiry sweep.
        context.transactions.take(upstream_id);
    }
}

/// Route an upstream reply back to its client and feed the cache.
fn handle_upstream_response(context: &RelayContext, message: &Message, task: Task) {
    let upstream_id = message.id();
    let Some(completion) = context.transactions.take(upstream_id) else {
        RelayStats::bump(&context.stats.unknown_responses);
        warn!(upstream_id, source = %task.source, "Reply for unknown ID dropped");
        return;
    };

    let mut datagram = task.data.into_vec();
    codec::patch_id(&mut datagram, completion.original_id);
    send_best_effort(context, &datagram, completion.client);

    debug!(
        upstream_id,
        original_id = completion.original_id,
        client = %completion.client,
        "Reply relayed to client"
    );

    if message.response_code() == ResponseCode::NoError && !message.answers().is_empty() {
        if let Some((name, qtype)) = codec::first_question(message) {
            let ttl = codec::first_answer_ttl(message);
            let answer = codec::extract_answer(message);
            context.cache.insert(&name, qtype, answer, ttl);
        }
    }
}

fn respond_with_address(
    context: &RelayContext,
    message: &Message,
    client: SocketAddr,
    address: IpAddr,
) {
    match codec::build_address_response(message, address, OVERRIDE_TTL) {
        Ok(response) => {
            send_best_effort(context, &response, client);
        }
        Err(e) => {
            warn!(client = %client, error = %e, "Failed to build override response");
        }
    }
}

/// The "this name does not route" answer for a blocked domain.
fn block_sentinel(qtype: RecordType) -> IpAddr {
    match qtype {
        RecordType::AAAA => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    }
}

/// Fire-and-forget send. A full send buffer counts as soft success; other
/// errors count as failures. Returns false only on a hard failure.
fn send_best_effort(context: &RelayContext, datagram: &[u8], destination: SocketAddr) -> bool {
    match context.socket.send_to(datagram, destination) {
        Ok(_) => true,
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            RelayStats::bump(&context.stats.send_soft_failures);
            debug!(%destination, "Send buffer full, datagram dropped");
            true
        }
        Err(e) => {
            RelayStats::bump(&context.stats.send_failures);
            warn!(%destination, error = %e, "Send failed");
            false
        }
    }
}
