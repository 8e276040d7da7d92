use super::entry::{CacheEntry, CachedAnswer};
use super::segment::CacheSegment;
use crate::arena::{Arena, NIL};
use crate::clock;
use crate::hash::{bucket_of, fingerprint_hash, segment_of};
use dnsrelay_domain::{CacheTuning, RecordType};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Counter snapshot returned by [`AnswerCache::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub insert_failures: u64,
    pub size: usize,
}

pub struct AnswerCache {
    segments: Box<[RwLock<CacheSegment>]>,
    arena: Arena<CacheEntry>,
    segment_count: usize,
    buckets_per_segment: usize,
    default_ttl: u64,
    cleanup_batch: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    insert_failures: AtomicU64,
}

impl AnswerCache {
    pub fn new(tuning: &CacheTuning) -> Self {
        let segment_count = tuning.segments;
        let buckets_per_segment = (tuning.buckets / segment_count).max(1);
        let per_segment_capacity = (tuning.capacity / segment_count).max(1);

        let segments: Box<[RwLock<CacheSegment>]> = (0..segment_count)
            .map(|_| RwLock::new(CacheSegment::new(buckets_per_segment, per_segment_capacity)))
            .collect();

        info!(
            capacity = tuning.capacity,
            segments = segment_count,
            per_segment_capacity,
            default_ttl = tuning.default_ttl_secs,
            "Initializing answer cache"
        );

        Self {
            segments,
            arena: Arena::new(tuning.capacity),
            segment_count,
            buckets_per_segment,
            default_ttl: tuning.default_ttl_secs as u64,
            cleanup_batch: tuning.cleanup_batch,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            insert_failures: AtomicU64::new(0),
        }
    }

    /// Look up a live answer for `(name, qtype)`.
    ///
    /// A hit refreshes the access time and promotes the entry to the head of
    /// its segment's LRU list. Expired entries count as misses; they are
    /// reclaimed by [`Self::sweep_expired`], not here.
    pub fn lookup(&self, name: &str, qtype: RecordType) -> Option<CachedAnswer> {
        let code = qtype.code();
        let hash = fingerprint_hash(name, code);
        let segment_index = segment_of(hash, self.segment_count);
        let bucket = bucket_of(hash, self.segment_count, self.buckets_per_segment);
        let now = clock::now_secs();

        {
            let segment = self.segments[segment_index].read();
            let Some(index) = segment.find(&self.arena, bucket, name, code) else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };
            // SAFETY: segment read lock held.
            if unsafe { self.arena.slot(index) }.is_expired_at(now) {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(name, %qtype, "Cache entry expired");
                return None;
            }
        }

        // Upgrade to the write lock for the LRU update and re-verify: a
        // concurrent writer may have evicted or refreshed the entry while no
        // lock was held.
        let mut segment = self.segments[segment_index].write();
        let Some(index) = segment.find(&self.arena, bucket, name, code) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let answer = {
            // SAFETY: segment write lock held.
            let entry = unsafe { self.arena.slot_mut(index) };
            if entry.is_expired_at(now) {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.last_access = now;
            entry.answer.clone()
        };
        segment.lru_promote(&self.arena, index);
        self.hits.fetch_add(1, Ordering::Relaxed);
        answer
    }

    /// Insert or refresh the answer for `(name, qtype)`.
    ///
    /// A refresh replaces the owned answer, restamps expiry and access time,
    /// and promotes to LRU head. A first-time insert evicts the segment's
    /// LRU tail when the segment is full. Returns `false` only when the
    /// arena has no free slot, in which case the cache is unchanged.
    pub fn insert(&self, name: &str, qtype: RecordType, answer: CachedAnswer, ttl_secs: u32) -> bool {
        let code = qtype.code();
        let hash = fingerprint_hash(name, code);
        let segment_index = segment_of(hash, self.segment_count);
        let bucket = bucket_of(hash, self.segment_count, self.buckets_per_segment);
        let now = clock::now_secs();
        let ttl = if ttl_secs == 0 {
            self.default_ttl
        } else {
            ttl_secs as u64
        };
        let expires_at = now + ttl;

        let mut segment = self.segments[segment_index].write();

        if let Some(index) = segment.find(&self.arena, bucket, name, code) {
            // Refresh in place, whether the old entry was live or expired.
            {
                // SAFETY: segment write lock held.
                let entry = unsafe { self.arena.slot_mut(index) };
                entry.answer = Some(answer);
                entry.expires_at = expires_at;
                entry.last_access = now;
            }
            segment.lru_promote(&self.arena, index);
            debug!(name, %qtype, ttl, "Refreshed cache entry");
            return true;
        }

        if segment.len >= segment.capacity {
            let tail = segment.lru_tail;
            if tail != NIL {
                // SAFETY: segment write lock held.
                let tail_bucket = {
                    let entry = unsafe { self.arena.slot(tail) };
                    bucket_of(entry.hash, self.segment_count, self.buckets_per_segment)
                };
                segment.unlink_bucket(&self.arena, tail_bucket, tail);
                segment.lru_unlink(&self.arena, tail);
                segment.len -= 1;
                unsafe { self.arena.slot_mut(tail) }.reset();
                self.arena.release(tail);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let Some(index) = self.arena.alloc() else {
            self.insert_failures.fetch_add(1, Ordering::Relaxed);
            debug!(name, %qtype, "Cache arena exhausted, insert dropped");
            return false;
        };
        {
            // SAFETY: freshly allocated slot, sole owner until linked below.
            let entry = unsafe { self.arena.slot_mut(index) };
            entry.name = name.to_ascii_lowercase().into_boxed_str();
            entry.qtype = code;
            entry.hash = hash;
            entry.answer = Some(answer);
            entry.expires_at = expires_at;
            entry.last_access = now;
        }
        segment.push_bucket(&self.arena, bucket, index);
        segment.lru_push_front(&self.arena, index);
        segment.len += 1;
        debug!(name, %qtype, ttl, size = segment.len, "Inserted cache entry");
        true
    }

    /// Reclaim expired entries, walking each segment's LRU list from the
    /// tail and stopping at the first live entry or after `cleanup_batch`
    /// removals, so periodic callers do bounded work per segment.
    pub fn sweep_expired(&self) -> usize {
        let now = clock::now_secs();
        let mut removed = 0;

        for segment_lock in self.segments.iter() {
            let mut segment = segment_lock.write();
            let mut batch = 0;
            while batch < self.cleanup_batch {
                let tail = segment.lru_tail;
                if tail == NIL {
                    break;
                }
                // SAFETY: segment write lock held.
                let (expired, tail_bucket) = {
                    let entry = unsafe { self.arena.slot(tail) };
                    (
                        entry.is_expired_at(now),
                        bucket_of(entry.hash, self.segment_count, self.buckets_per_segment),
                    )
                };
                if !expired {
                    break;
                }
                segment.unlink_bucket(&self.arena, tail_bucket, tail);
                segment.lru_unlink(&self.arena, tail);
                segment.len -= 1;
                unsafe { self.arena.slot_mut(tail) }.reset();
                self.arena.release(tail);
                batch += 1;
            }
            removed += batch;
        }

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            insert_failures: self.insert_failures.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.read().len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full-structure invariant scan: every arena slot is referenced by
    /// exactly one segment or sits on the free stack, LRU and hash chain
    /// membership agree, fingerprints are unique per segment, and no segment
    /// exceeds its capacity. Panics on violation.
    #[cfg(any(test, debug_assertions))]
    pub fn check_consistency(&self) {
        use std::collections::HashSet;

        let guards: Vec<_> = self.segments.iter().map(|s| s.write()).collect();
        let mut linked: HashSet<u32> = HashSet::new();

        for segment in guards.iter() {
            assert!(segment.len <= segment.capacity, "segment over capacity");

            let mut chained: HashSet<u32> = HashSet::new();
            let mut fingerprints: HashSet<(String, u16)> = HashSet::new();
            for bucket in segment.buckets.iter() {
                let mut index = *bucket;
                while index != NIL {
                    // SAFETY: all segment locks held.
                    let entry = unsafe { self.arena.slot(index) };
                    assert!(chained.insert(index), "index linked twice in segment");
                    assert!(
                        linked.insert(index),
                        "index linked into more than one segment"
                    );
                    assert!(
                        fingerprints.insert((entry.name.to_string(), entry.qtype)),
                        "duplicate fingerprint in segment"
                    );
                    index = entry.bucket_next;
                }
            }

            let mut lru_members: HashSet<u32> = HashSet::new();
            let mut index = segment.lru_head;
            let mut prev = NIL;
            while index != NIL {
                // SAFETY: all segment locks held.
                let entry = unsafe { self.arena.slot(index) };
                assert_eq!(entry.lru_prev, prev, "broken LRU back-link");
                assert!(lru_members.insert(index), "index twice in LRU list");
                prev = index;
                index = entry.lru_next;
            }
            assert_eq!(segment.lru_tail, prev, "LRU tail mismatch");
            assert_eq!(lru_members, chained, "LRU and hash membership differ");
            assert_eq!(segment.len, chained.len(), "segment len mismatch");
        }

        let free = self.arena.free_indices();
        assert_eq!(
            linked.len() + free.len(),
            self.arena.capacity(),
            "arena slots lost or duplicated"
        );
        for index in free {
            assert!(!linked.contains(&index), "free index still linked");
        }
    }
}
