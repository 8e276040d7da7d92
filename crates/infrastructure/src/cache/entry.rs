use crate::arena::NIL;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::Record;

/// Answer payload owned by a cache entry: the parsed answer section plus the
/// response code, enough to rebuild a full response against any client's
/// question. Records are stored as received, so unsupported rdata passes
/// through byte-equivalent.
#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub answers: Vec<Record>,
    pub response_code: ResponseCode,
}

impl Default for CachedAnswer {
    fn default() -> Self {
        Self {
            answers: Vec::new(),
            response_code: ResponseCode::NoError,
        }
    }
}

/// One arena slot of the answer cache.
///
/// `lru_prev`/`lru_next` thread the owning segment's LRU list,
/// `bucket_next` threads its hash chain. A slot on the free stack has all
/// links at `NIL` and no answer.
#[derive(Debug)]
pub struct CacheEntry {
    pub name: Box<str>,
    pub qtype: u16,
    pub hash: u32,
    pub answer: Option<CachedAnswer>,
    pub expires_at: u64,
    pub last_access: u64,
    pub lru_prev: u32,
    pub lru_next: u32,
    pub bucket_next: u32,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            name: Box::from(""),
            qtype: 0,
            hash: 0,
            answer: None,
            expires_at: 0,
            last_access: 0,
            lru_prev: NIL,
            lru_next: NIL,
            bucket_next: NIL,
        }
    }
}

impl CacheEntry {
    /// Fingerprint match. Stored names are lowercase; the probe may not be.
    #[inline]
    pub fn matches(&self, name: &str, qtype: u16) -> bool {
        self.qtype == qtype && self.name.eq_ignore_ascii_case(name)
    }

    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    /// Drop the owned answer and detach all links before the slot goes back
    /// to the free stack.
    pub fn reset(&mut self) {
        self.name = Box::from("");
        self.qtype = 0;
        self.hash = 0;
        self.answer = None;
        self.expires_at = 0;
        self.last_access = 0;
        self.lru_prev = NIL;
        self.lru_next = NIL;
        self.bucket_next = NIL;
    }
}
