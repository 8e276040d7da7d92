use smallvec::SmallVec;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Instant;

/// How the dispatcher classified a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ClientRequest,
    UpstreamResponse,
    Shutdown,
}

/// One unit of work for the pool: the raw datagram, where it came from, and
/// what the dispatcher decided it is. Payloads up to the classic 512-byte
/// UDP limit stay inline; EDNS-sized datagrams spill to the heap.
#[derive(Debug)]
pub struct Task {
    pub data: SmallVec<[u8; 512]>,
    pub source: SocketAddr,
    pub kind: TaskKind,
    pub created_at: Instant,
}

impl Task {
    pub fn new(data: &[u8], source: SocketAddr, kind: TaskKind) -> Self {
        Self {
            data: SmallVec::from_slice(data),
            source,
            kind,
            created_at: Instant::now(),
        }
    }

    /// Poison pill that tells a worker to exit.
    pub fn shutdown() -> Self {
        Self {
            data: SmallVec::new(),
            source: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            kind: TaskKind::Shutdown,
            created_at: Instant::now(),
        }
    }
}
