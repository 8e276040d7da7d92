use dnsrelay_domain::{CacheTuning, RecordType};
use dnsrelay_infrastructure::{AnswerCache, CachedAnswer};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata;
use hickory_proto::rr::{Name, RData, Record};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

fn tuning(capacity: usize, segments: usize) -> CacheTuning {
    CacheTuning {
        capacity,
        segments,
        buckets: 64 * segments.max(1),
        default_ttl_secs: 300,
        cleanup_batch: 100,
    }
}

fn answer(ip: &str, ttl: u32) -> CachedAnswer {
    let record = Record::from_rdata(
        Name::from_str("fixture.test.").unwrap(),
        ttl,
        RData::A(rdata::A(ip.parse::<Ipv4Addr>().unwrap())),
    );
    CachedAnswer {
        answers: vec![record],
        response_code: ResponseCode::NoError,
    }
}

fn answer_ip(answer: &CachedAnswer) -> Ipv4Addr {
    match answer.answers[0].data() {
        RData::A(a) => a.0,
        other => panic!("unexpected rdata {:?}", other),
    }
}

#[test]
fn insert_then_lookup_hits() {
    let cache = AnswerCache::new(&tuning(128, 8));

    assert!(cache.insert("example.com", RecordType::A, answer("1.2.3.4", 60), 60));
    let hit = cache.lookup("example.com", RecordType::A).unwrap();
    assert_eq!(answer_ip(&hit), Ipv4Addr::new(1, 2, 3, 4));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
    cache.check_consistency();
}

#[test]
fn lookup_is_case_insensitive() {
    let cache = AnswerCache::new(&tuning(128, 8));
    cache.insert("Example.COM", RecordType::A, answer("1.2.3.4", 60), 60);
    assert!(cache.lookup("example.com", RecordType::A).is_some());
    assert!(cache.lookup("EXAMPLE.com", RecordType::A).is_some());
}

#[test]
fn qtype_is_part_of_the_fingerprint() {
    let cache = AnswerCache::new(&tuning(128, 8));
    cache.insert("example.com", RecordType::A, answer("1.2.3.4", 60), 60);
    assert!(cache.lookup("example.com", RecordType::AAAA).is_none());
    assert!(cache.lookup("example.com", RecordType::A).is_some());
}

#[test]
fn miss_on_unknown_name() {
    let cache = AnswerCache::new(&tuning(128, 8));
    assert!(cache.lookup("nowhere.test", RecordType::A).is_none());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn reinsert_replaces_the_answer() {
    // insert(k, v); insert(k, v') followed by lookup(k) must observe v'.
    let cache = AnswerCache::new(&tuning(128, 8));
    cache.insert("example.com", RecordType::A, answer("1.1.1.1", 60), 60);
    cache.insert("example.com", RecordType::A, answer("2.2.2.2", 120), 120);

    let hit = cache.lookup("example.com", RecordType::A).unwrap();
    assert_eq!(answer_ip(&hit), Ipv4Addr::new(2, 2, 2, 2));
    assert_eq!(cache.stats().size, 1, "refresh must not duplicate the entry");
    cache.check_consistency();
}

#[test]
fn refresh_extends_expiry() {
    // A refresh with a fresh TTL restamps expiry; the entry outlives the
    // original TTL window.
    let cache = AnswerCache::new(&tuning(128, 1));
    cache.insert("renew.test", RecordType::A, answer("1.1.1.1", 1), 1);
    cache.insert("renew.test", RecordType::A, answer("1.1.1.1", 600), 600);
    std::thread::sleep(Duration::from_secs(2));
    assert!(cache.lookup("renew.test", RecordType::A).is_some());
}

#[test]
fn lru_promotion_protects_recently_used() {
    // Segment capacity 2: insert a, b; touch a; insert c => b evicted.
    let cache = AnswerCache::new(&tuning(2, 1));
    cache.insert("a.test", RecordType::A, answer("1.0.0.1", 300), 300);
    cache.insert("b.test", RecordType::A, answer("1.0.0.2", 300), 300);
    assert!(cache.lookup("a.test", RecordType::A).is_some());
    cache.insert("c.test", RecordType::A, answer("1.0.0.3", 300), 300);

    assert!(cache.lookup("b.test", RecordType::A).is_none(), "b was LRU");
    assert!(cache.lookup("a.test", RecordType::A).is_some());
    assert!(cache.lookup("c.test", RecordType::A).is_some());
    assert_eq!(cache.stats().evictions, 1);
    cache.check_consistency();
}

#[test]
fn single_slot_segment_evicts_previous() {
    let cache = AnswerCache::new(&tuning(1, 1));
    cache.insert("first.test", RecordType::A, answer("1.0.0.1", 300), 300);
    cache.insert("second.test", RecordType::A, answer("1.0.0.2", 300), 300);

    assert!(cache.lookup("first.test", RecordType::A).is_none());
    assert!(cache.lookup("second.test", RecordType::A).is_some());
    assert_eq!(cache.stats().size, 1);
}

#[test]
fn capacity_eviction_drops_oldest_of_many() {
    // One segment of capacity 100; the 101st insert evicts the first.
    let cache = AnswerCache::new(&tuning(100, 1));
    for i in 0..101 {
        let name = format!("host{}.test", i);
        cache.insert(&name, RecordType::A, answer("10.0.0.1", 300), 300);
    }

    assert!(cache.lookup("host0.test", RecordType::A).is_none());
    assert!(cache.lookup("host100.test", RecordType::A).is_some());
    assert_eq!(cache.stats().size, 100);
    cache.check_consistency();
}

#[test]
fn expired_entry_misses() {
    let cache = AnswerCache::new(&tuning(128, 8));
    cache.insert("shortlived.test", RecordType::A, answer("1.2.3.4", 1), 1);
    std::thread::sleep(Duration::from_secs(2));

    assert!(cache.lookup("shortlived.test", RecordType::A).is_none());
    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert!(stats.misses >= 1);
}

#[test]
fn zero_ttl_uses_the_default() {
    // With a 1 s default TTL, a 0-TTL insert must live for about a second
    // instead of being instantly expired.
    let mut tuning = tuning(128, 8);
    tuning.default_ttl_secs = 1;
    let cache = AnswerCache::new(&tuning);

    cache.insert("zero.test", RecordType::A, answer("1.2.3.4", 0), 0);
    assert!(cache.lookup("zero.test", RecordType::A).is_some());
    std::thread::sleep(Duration::from_secs(2));
    assert!(cache.lookup("zero.test", RecordType::A).is_none());
}

#[test]
fn reinserting_an_expired_fingerprint_reuses_its_slot() {
    let cache = AnswerCache::new(&tuning(128, 1));
    cache.insert("flap.test", RecordType::A, answer("1.1.1.1", 1), 1);
    std::thread::sleep(Duration::from_secs(2));
    assert!(cache.lookup("flap.test", RecordType::A).is_none());

    // The expired entry is still linked; a re-insert refreshes it in place
    // instead of growing the segment.
    cache.insert("flap.test", RecordType::A, answer("2.2.2.2", 300), 300);
    assert_eq!(cache.stats().size, 1);
    let hit = cache.lookup("flap.test", RecordType::A).unwrap();
    assert_eq!(answer_ip(&hit), Ipv4Addr::new(2, 2, 2, 2));
    cache.check_consistency();
}

#[test]
fn sweep_reclaims_expired_entries() {
    let cache = AnswerCache::new(&tuning(128, 8));
    for i in 0..10 {
        let name = format!("stale{}.test", i);
        cache.insert(&name, RecordType::A, answer("1.2.3.4", 1), 1);
    }
    cache.insert("fresh.test", RecordType::A, answer("1.2.3.4", 600), 600);
    std::thread::sleep(Duration::from_secs(2));

    let removed = cache.sweep_expired();
    assert_eq!(removed, 10);
    assert_eq!(cache.stats().size, 1);
    assert!(cache.lookup("fresh.test", RecordType::A).is_some());
    cache.check_consistency();
}

#[test]
fn sweep_respects_the_batch_limit() {
    let mut tuning = tuning(128, 1);
    tuning.cleanup_batch = 4;
    let cache = AnswerCache::new(&tuning);
    for i in 0..10 {
        let name = format!("stale{}.test", i);
        cache.insert(&name, RecordType::A, answer("1.2.3.4", 1), 1);
    }
    std::thread::sleep(Duration::from_secs(2));

    assert_eq!(cache.sweep_expired(), 4);
    assert_eq!(cache.sweep_expired(), 4);
    assert_eq!(cache.sweep_expired(), 2);
    assert_eq!(cache.stats().size, 0);
}

#[test]
fn exhausted_arena_fails_insert_without_corruption() {
    // Four segments share a two-slot arena, so some segment sees an
    // allocation failure before reaching its own capacity.
    let cache = AnswerCache::new(&tuning(2, 4));
    let mut failures = 0;
    for i in 0..32 {
        let name = format!("spread{}.test", i);
        if !cache.insert(&name, RecordType::A, answer("1.2.3.4", 300), 300) {
            failures += 1;
        }
    }

    assert!(failures > 0);
    assert!(cache.stats().insert_failures > 0);
    assert!(cache.stats().size <= 2);
    cache.check_consistency();
}

#[test]
fn concurrent_readers_and_writers_stay_consistent() {
    use std::sync::Arc;

    let cache = Arc::new(AnswerCache::new(&tuning(256, 8)));
    let mut handles = Vec::new();

    for t in 0..4 {
        let cache = Arc::clone(&cache);
        handles.push(std::thread::spawn(move || {
            for i in 0..500 {
                let name = format!("worker{}-{}.test", t, i % 50);
                cache.insert(&name, RecordType::A, answer("10.0.0.1", 300), 300);
                cache.lookup(&name, RecordType::A);
                cache.lookup("worker0-0.test", RecordType::A);
                if i % 100 == 0 {
                    cache.sweep_expired();
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    cache.check_consistency();
    let stats = cache.stats();
    assert!(stats.hits > 0);
    assert!(stats.size <= 256);
}
