use crate::hash::{bucket_of, hash_name, segment_of};
use dnsrelay_domain::RecordType;
use parking_lot::RwLock;
use std::net::IpAddr;

const SEGMENT_COUNT: usize = 64;
const BUCKETS_PER_SEGMENT: usize = 16;

/// Outcome of an override lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDecision {
    /// No override for this name and type; fall through to cache/upstream.
    NotFound,
    /// The name is blocked for this address family.
    Blocked,
    /// The name resolves locally to this address.
    Address(IpAddr),
}

struct OverrideEntry {
    domain: Box<str>,
    addresses: Vec<IpAddr>,
}

struct OverrideSegment {
    buckets: Box<[Vec<OverrideEntry>]>,
    len: usize,
}

impl OverrideSegment {
    fn new() -> Self {
        Self {
            buckets: (0..BUCKETS_PER_SEGMENT).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }
}

pub struct OverrideTable {
    segments: Box<[RwLock<OverrideSegment>]>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self {
            segments: (0..SEGMENT_COUNT)
                .map(|_| RwLock::new(OverrideSegment::new()))
                .collect(),
        }
    }

    /// Register an address for a domain. A domain may be added repeatedly to
    /// accumulate A and AAAA records; the first matching address wins on
    /// lookup. The record type is implied by the address family.
    pub fn add(&self, domain: &str, address: IpAddr) {
        let hash = hash_name(domain);
        let segment_index = segment_of(hash, SEGMENT_COUNT);
        let bucket = bucket_of(hash, SEGMENT_COUNT, BUCKETS_PER_SEGMENT);

        let mut segment = self.segments[segment_index].write();
        let chain = &mut segment.buckets[bucket];
        if let Some(entry) = chain
            .iter_mut()
            .find(|e| e.domain.eq_ignore_ascii_case(domain))
        {
            entry.addresses.push(address);
            return;
        }
        chain.push(OverrideEntry {
            domain: domain.to_ascii_lowercase().into_boxed_str(),
            addresses: vec![address],
        });
        segment.len += 1;
    }

    /// Resolve `(domain, qtype)` against the table.
    ///
    /// Only address types can match; anything else falls through. A domain
    /// present with the other family only also falls through, so an
    /// AAAA query for a v4-only override still reaches the upstream.
    pub fn lookup(&self, domain: &str, qtype: RecordType) -> OverrideDecision {
        if !qtype.is_address() {
            return OverrideDecision::NotFound;
        }
        let want_v4 = qtype == RecordType::A;

        let hash = hash_name(domain);
        let segment_index = segment_of(hash, SEGMENT_COUNT);
        let bucket = bucket_of(hash, SEGMENT_COUNT, BUCKETS_PER_SEGMENT);

        let segment = self.segments[segment_index].read();
        let Some(entry) = segment.buckets[bucket]
            .iter()
            .find(|e| e.domain.eq_ignore_ascii_case(domain))
        else {
            return OverrideDecision::NotFound;
        };

        for address in &entry.addresses {
            if address.is_ipv4() != want_v4 {
                continue;
            }
            return if address.is_unspecified() {
                OverrideDecision::Blocked
            } else {
                OverrideDecision::Address(*address)
            };
        }
        OverrideDecision::NotFound
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.read().len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::new()
    }
}
