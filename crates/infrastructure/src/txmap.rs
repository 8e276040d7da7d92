//! In-flight transaction map.
//!
//! Multiplexes concurrent client queries onto the single upstream-facing
//! socket: each forwarded query gets a relay-unique 16-bit transaction ID,
//! and the originating client's address and original ID are kept until the
//! matching upstream reply arrives or the entry times out.
//!
//! IDs come from one shared stack pre-seeded with 1..=65535; entries live in
//! an arena and are threaded into one of 64 segments, each holding hash
//! buckets keyed by upstream ID plus a time-ordered FIFO for bounded expiry
//! sweeps. Lock order is arena → ID stack → segment on register, and
//! segment → arena → ID stack on take/sweep with each pair released before
//! the next is acquired, so the two directions cannot deadlock.

use crate::arena::{Arena, NIL};
use crate::clock;
use dnsrelay_domain::TransactionTuning;
use parking_lot::{Mutex, RwLock};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use thiserror::Error;
use tracing::{debug, info};

/// All non-zero 16-bit IDs; zero is kept out of circulation as it commonly
/// marks an unset transaction ID.
const ID_SPACE: usize = u16::MAX as usize;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    #[error("transaction arena exhausted")]
    SlotsExhausted,
    #[error("no free upstream IDs")]
    IdsExhausted,
}

/// Client context returned when an upstream reply consumes its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub original_id: u16,
    pub client: SocketAddr,
}

#[derive(Debug)]
struct TxEntry {
    original_id: u16,
    upstream_id: u16,
    client: SocketAddr,
    created_at: u64,
    bucket_next: u32,
    fifo_prev: u32,
    fifo_next: u32,
}

impl Default for TxEntry {
    fn default() -> Self {
        Self {
            original_id: 0,
            upstream_id: 0,
            client: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            created_at: 0,
            bucket_next: NIL,
            fifo_prev: NIL,
            fifo_next: NIL,
        }
    }
}

/// FIFO is oldest-at-head: registrations append at the tail, sweeps pop from
/// the head. Entries within one segment are therefore locally time-ordered,
/// which is all the bounded sweep needs.
struct TxSegment {
    buckets: Box<[u32]>,
    fifo_head: u32,
    fifo_tail: u32,
    len: usize,
}

impl TxSegment {
    fn new(bucket_count: usize) -> Self {
        Self {
            buckets: vec![NIL; bucket_count].into_boxed_slice(),
            fifo_head: NIL,
            fifo_tail: NIL,
            len: 0,
        }
    }
}

pub struct TransactionMap {
    segments: Box<[RwLock<TxSegment>]>,
    arena: Arena<TxEntry>,
    ids: Mutex<Vec<u16>>,
    segment_count: usize,
    segment_bits: u32,
    buckets_per_segment: usize,
    cleanup_batch: usize,
}

impl TransactionMap {
    pub fn new(tuning: &TransactionTuning) -> Self {
        let segment_count = tuning.segments;
        let buckets_per_segment = (tuning.buckets / segment_count).max(1);

        info!(
            capacity = tuning.capacity,
            segments = segment_count,
            request_timeout = tuning.request_timeout_secs,
            "Initializing transaction map"
        );

        let ids: Vec<u16> = (1..=u16::MAX).rev().collect();
        debug_assert_eq!(ids.len(), ID_SPACE);

        Self {
            segments: (0..segment_count)
                .map(|_| RwLock::new(TxSegment::new(buckets_per_segment)))
                .collect(),
            arena: Arena::new(tuning.capacity),
            ids: Mutex::new(ids),
            segment_count,
            segment_bits: segment_count.trailing_zeros(),
            buckets_per_segment,
            cleanup_batch: tuning.cleanup_batch,
        }
    }

    #[inline]
    fn segment_of(&self, upstream_id: u16) -> usize {
        upstream_id as usize & (self.segment_count - 1)
    }

    /// Bucket within a segment, from the bits above the segment slice.
    #[inline]
    fn bucket_of(&self, upstream_id: u16) -> usize {
        (upstream_id as usize >> self.segment_bits) % self.buckets_per_segment
    }

    /// Allocate an upstream ID and record the client context, stamped with
    /// the current time.
    pub fn register(&self, original_id: u16, client: SocketAddr) -> Result<u16, RegisterError> {
        self.register_at(original_id, client, clock::now_secs())
    }

    /// [`Self::register`] with an explicit timestamp.
    pub fn register_at(
        &self,
        original_id: u16,
        client: SocketAddr,
        now: u64,
    ) -> Result<u16, RegisterError> {
        let Some(index) = self.arena.alloc() else {
            return Err(RegisterError::SlotsExhausted);
        };
        let Some(upstream_id) = self.ids.lock().pop() else {
            self.arena.release(index);
            return Err(RegisterError::IdsExhausted);
        };

        {
            // SAFETY: freshly allocated slot, sole owner until linked below.
            let entry = unsafe { self.arena.slot_mut(index) };
            entry.original_id = original_id;
            entry.upstream_id = upstream_id;
            entry.client = client;
            entry.created_at = now;
            entry.bucket_next = NIL;
            entry.fifo_prev = NIL;
            entry.fifo_next = NIL;
        }

        let segment_index = self.segment_of(upstream_id);
        let bucket = self.bucket_of(upstream_id);
        let mut segment = self.segments[segment_index].write();

        // SAFETY: segment write lock held from here on.
        unsafe { self.arena.slot_mut(index) }.bucket_next = segment.buckets[bucket];
        segment.buckets[bucket] = index;

        let old_tail = segment.fifo_tail;
        unsafe { self.arena.slot_mut(index) }.fifo_prev = old_tail;
        if old_tail != NIL {
            unsafe { self.arena.slot_mut(old_tail) }.fifo_next = index;
        } else {
            segment.fifo_head = index;
        }
        segment.fifo_tail = index;
        segment.len += 1;

        debug!(original_id, upstream_id, %client, "Registered in-flight query");
        Ok(upstream_id)
    }

    /// Atomically look up and remove the entry for an upstream ID, returning
    /// the stored client context. `None` for stale or unknown replies.
    pub fn take(&self, upstream_id: u16) -> Option<Completion> {
        let segment_index = self.segment_of(upstream_id);
        let bucket = self.bucket_of(upstream_id);

        let (index, completion) = {
            let mut segment = self.segments[segment_index].write();
            let Some(index) = self.find_in_bucket(&segment, bucket, upstream_id) else {
                return None;
            };
            self.unlink(&mut segment, bucket, index);
            // SAFETY: segment write lock held; just unlinked, we own it.
            let entry = unsafe { self.arena.slot_mut(index) };
            let completion = Completion {
                original_id: entry.original_id,
                client: entry.client,
            };
            *entry = TxEntry::default();
            (index, completion)
        };
        // Segment lock dropped; the slot and ID go back one pool at a time.
        self.arena.release(index);
        self.ids.lock().push(upstream_id);

        debug!(upstream_id, original_id = completion.original_id, "Completed in-flight query");
        Some(completion)
    }

    /// Reclaim entries older than `timeout_secs`, walking each segment's
    /// FIFO from the oldest end and removing at most `cleanup_batch` per
    /// segment per call. Returns the number of IDs recycled.
    pub fn sweep_expired(&self, now: u64, timeout_secs: u64) -> usize {
        let mut reclaimed = Vec::new();

        for segment_lock in self.segments.iter() {
            let mut segment = segment_lock.write();
            let mut batch = 0;
            while batch < self.cleanup_batch {
                let head = segment.fifo_head;
                if head == NIL {
                    break;
                }
                // SAFETY: segment write lock held.
                let (expired, upstream_id) = {
                    let entry = unsafe { self.arena.slot(head) };
                    (
                        now.saturating_sub(entry.created_at) > timeout_secs,
                        entry.upstream_id,
                    )
                };
                if !expired {
                    break;
                }
                let bucket = self.bucket_of(upstream_id);
                self.unlink(&mut segment, bucket, head);
                unsafe { *self.arena.slot_mut(head) = TxEntry::default() };
                reclaimed.push((head, upstream_id));
                batch += 1;
            }
        }

        let count = reclaimed.len();
        for (index, upstream_id) in reclaimed {
            self.arena.release(index);
            self.ids.lock().push(upstream_id);
        }
        if count > 0 {
            debug!(reclaimed = count, "Swept expired in-flight queries");
        }
        count
    }

    /// Live in-flight entry count.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.read().len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free upstream IDs remaining on the stack.
    pub fn free_ids(&self) -> usize {
        self.ids.lock().len()
    }

    fn find_in_bucket(&self, segment: &TxSegment, bucket: usize, upstream_id: u16) -> Option<u32> {
        let mut index = segment.buckets[bucket];
        while index != NIL {
            // SAFETY: caller holds this segment's lock.
            let entry = unsafe { self.arena.slot(index) };
            if entry.upstream_id == upstream_id {
                return Some(index);
            }
            index = entry.bucket_next;
        }
        None
    }

    /// Detach an entry from its bucket chain and the FIFO. Caller holds the
    /// segment write lock.
    fn unlink(&self, segment: &mut TxSegment, bucket: usize, index: u32) {
        // Bucket chain.
        let mut current = segment.buckets[bucket];
        if current == index {
            // SAFETY: segment write lock held.
            segment.buckets[bucket] = unsafe { self.arena.slot(index) }.bucket_next;
        } else {
            while current != NIL {
                let next = unsafe { self.arena.slot(current) }.bucket_next;
                if next == index {
                    let successor = unsafe { self.arena.slot(index) }.bucket_next;
                    unsafe { self.arena.slot_mut(current) }.bucket_next = successor;
                    break;
                }
                current = next;
            }
        }

        // FIFO.
        let (prev, next) = {
            let entry = unsafe { self.arena.slot(index) };
            (entry.fifo_prev, entry.fifo_next)
        };
        if prev != NIL {
            unsafe { self.arena.slot_mut(prev) }.fifo_next = next;
        } else {
            segment.fifo_head = next;
        }
        if next != NIL {
            unsafe { self.arena.slot_mut(next) }.fifo_prev = prev;
        } else {
            segment.fifo_tail = prev;
        }

        segment.len -= 1;
    }

    /// Invariant scan: every upstream ID is live in exactly one segment or
    /// free on the stack, never both, and the counts conserve the full
    /// 16-bit space. Panics on violation.
    #[cfg(any(test, debug_assertions))]
    pub fn check_conservation(&self) {
        use std::collections::HashSet;

        let guards: Vec<_> = self.segments.iter().map(|s| s.write()).collect();
        let mut live_ids: HashSet<u16> = HashSet::new();
        let mut live_slots: HashSet<u32> = HashSet::new();
        for segment in guards.iter() {
            let mut fifo_len = 0;
            let mut index = segment.fifo_head;
            while index != NIL {
                // SAFETY: all segment locks held.
                let entry = unsafe { self.arena.slot(index) };
                assert!(live_ids.insert(entry.upstream_id), "upstream ID linked twice");
                assert!(live_slots.insert(index), "slot linked twice");
                fifo_len += 1;
                index = entry.fifo_next;
            }
            assert_eq!(fifo_len, segment.len, "FIFO length mismatch");
        }

        let free_ids = self.ids.lock();
        assert_eq!(
            live_ids.len() + free_ids.len(),
            ID_SPACE,
            "upstream IDs lost or duplicated"
        );
        for id in free_ids.iter() {
            assert!(!live_ids.contains(id), "free ID still live");
        }
        assert_eq!(
            live_slots.len() + self.arena.free_len(),
            self.arena.capacity(),
            "arena slots lost or duplicated"
        );
    }
}
