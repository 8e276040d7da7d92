//! I/O dispatcher and worker pool.
//!
//! One UDP socket carries both client queries and upstream replies. A single
//! dispatcher thread drains it, classifies each datagram by source address,
//! and feeds a bounded task queue; N worker threads run the decision logic
//! (override table → answer cache → forward upstream) and write responses
//! back through the same socket.

mod dispatcher;
mod queue;
mod stats;
mod task;
mod worker;

pub use queue::{Pop, PushError, TaskQueue};
pub use stats::{RelayStats, StatsSnapshot};
pub use task::{Task, TaskKind};

use crate::cache::AnswerCache;
use crate::overrides::OverrideTable;
use crate::txmap::TransactionMap;
use crate::upstream::UpstreamPool;
use dnsrelay_domain::{Config, RelayError};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Bounded I/O wait for the dispatcher; also the shutdown latency ceiling.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Sends are best-effort; a full send buffer is a counted soft failure.
const SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// Everything the dispatcher and workers share. One per relay instance;
/// tests construct as many independent contexts as they need.
pub struct RelayContext {
    pub cache: AnswerCache,
    pub overrides: OverrideTable,
    pub transactions: TransactionMap,
    pub upstreams: UpstreamPool,
    pub queue: TaskQueue,
    pub stats: RelayStats,
    pub socket: UdpSocket,
    pub request_timeout_secs: u64,
    shutdown: AtomicBool,
}

impl RelayContext {
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

pub struct RelayServer {
    context: Arc<RelayContext>,
    worker_count: usize,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl RelayServer {
    /// Bind the relay socket and assemble the shared context. Fails fast on
    /// socket errors or an empty upstream pool; nothing is spawned yet.
    pub fn bind(
        config: &Config,
        overrides: OverrideTable,
        upstreams: UpstreamPool,
    ) -> Result<Self, RelayError> {
        if upstreams.is_empty() {
            return Err(RelayError::EmptyUpstreamPool);
        }

        let socket = bind_socket(&config.server.bind_address, config.server.port)?;
        let worker_count = config.server.resolved_worker_threads();

        let context = Arc::new(RelayContext {
            cache: AnswerCache::new(&config.cache),
            overrides,
            transactions: TransactionMap::new(&config.transactions),
            upstreams,
            queue: TaskQueue::new(config.server.queue_capacity),
            stats: RelayStats::new(),
            socket,
            request_timeout_secs: config.transactions.request_timeout_secs,
            shutdown: AtomicBool::new(false),
        });

        Ok(Self {
            context,
            worker_count,
            dispatcher: None,
            workers: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.context.socket.local_addr()
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.context
    }

    /// Spawn the worker pool and the dispatcher. A failed spawn tears down
    /// whatever was already started and is fatal to the caller.
    pub fn start(&mut self) -> Result<(), RelayError> {
        if self.dispatcher.is_some() {
            return Ok(());
        }

        for index in 0..self.worker_count {
            let context = Arc::clone(&self.context);
            let spawned = std::thread::Builder::new()
                .name(format!("relay-worker-{}", index))
                .spawn(move || worker::worker_loop(&context, index));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    self.shutdown();
                    return Err(RelayError::Io(e));
                }
            }
        }

        let context = Arc::clone(&self.context);
        let spawned = std::thread::Builder::new()
            .name("relay-dispatcher".to_string())
            .spawn(move || dispatcher::dispatcher_loop(&context));
        match spawned {
            Ok(handle) => self.dispatcher = Some(handle),
            Err(e) => {
                self.shutdown();
                return Err(RelayError::Io(e));
            }
        }

        info!(
            workers = self.worker_count,
            queue_capacity = self.context.queue.capacity(),
            "Relay started"
        );
        Ok(())
    }

    /// Signal shutdown and join every thread. Workers observe either a
    /// shutdown task or the closed queue; the dispatcher observes the flag
    /// within its bounded I/O wait.
    pub fn shutdown(&mut self) {
        self.context.request_shutdown();

        for _ in 0..self.worker_count {
            let _ = self.context.queue.push(Task::shutdown());
        }
        self.context.queue.close();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread panicked during shutdown");
            }
        }
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                warn!("Dispatcher thread panicked during shutdown");
            }
        }

        let snapshot = self.context.stats.snapshot();
        let cache = self.context.cache.stats();
        info!(
            processed = snapshot.tasks_processed,
            dropped = snapshot.tasks_dropped,
            cache_hits = cache.hits,
            cache_misses = cache.misses,
            "Relay stopped"
        );
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if self.dispatcher.is_some() {
            self.shutdown();
        }
    }
}

fn bind_socket(bind_address: &str, port: u16) -> Result<UdpSocket, RelayError> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|_| RelayError::InvalidEndpoint(format!("{}:{}", bind_address, port)))?;

    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket =
        Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(RelayError::SocketOption)?;
    socket
        .set_reuse_address(true)
        .map_err(RelayError::SocketOption)?;
    socket
        .set_read_timeout(Some(RECV_TIMEOUT))
        .map_err(RelayError::SocketOption)?;
    socket
        .set_write_timeout(Some(SEND_TIMEOUT))
        .map_err(RelayError::SocketOption)?;
    socket.bind(&addr.into()).map_err(|e| RelayError::SocketBind {
        addr: addr.to_string(),
        source: e,
    })?;

    info!(%addr, "Bound relay socket");
    Ok(socket.into())
}
