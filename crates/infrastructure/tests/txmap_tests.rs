use dnsrelay_domain::TransactionTuning;
use dnsrelay_infrastructure::{RegisterError, TransactionMap};
use std::net::SocketAddr;

const ID_SPACE: usize = u16::MAX as usize;

fn tuning(capacity: usize, segments: usize) -> TransactionTuning {
    TransactionTuning {
        capacity,
        segments,
        buckets: 64 * segments.max(1),
        request_timeout_secs: 3,
        cleanup_batch: 100,
    }
}

fn client(port: u16) -> SocketAddr {
    format!("192.168.1.50:{}", port).parse().unwrap()
}

#[test]
fn fresh_map_holds_the_full_id_space() {
    let map = TransactionMap::new(&tuning(1024, 64));
    assert_eq!(map.len(), 0);
    assert_eq!(map.free_ids(), ID_SPACE);
    map.check_conservation();
}

#[test]
fn register_take_round_trip() {
    let map = TransactionMap::new(&tuning(1024, 64));

    let upstream_id = map.register(0x1234, client(4000)).unwrap();
    assert_ne!(upstream_id, 0);
    assert_eq!(map.len(), 1);
    assert_eq!(map.free_ids(), ID_SPACE - 1);

    let completion = map.take(upstream_id).unwrap();
    assert_eq!(completion.original_id, 0x1234);
    assert_eq!(completion.client, client(4000));

    assert_eq!(map.len(), 0);
    assert_eq!(map.free_ids(), ID_SPACE);
    assert!(map.take(upstream_id).is_none(), "double take must miss");
    map.check_conservation();
}

#[test]
fn colliding_client_ids_get_distinct_upstream_ids() {
    // Two clients using the same transaction ID concurrently; each reply
    // must route to its own source address.
    let map = TransactionMap::new(&tuning(1024, 64));

    let u1 = map.register(0x1000, client(5001)).unwrap();
    let u2 = map.register(0x1000, client(5002)).unwrap();
    assert_ne!(u1, u2);

    // Replies may arrive in any order.
    let second = map.take(u2).unwrap();
    assert_eq!(second.original_id, 0x1000);
    assert_eq!(second.client, client(5002));

    let first = map.take(u1).unwrap();
    assert_eq!(first.original_id, 0x1000);
    assert_eq!(first.client, client(5001));
    map.check_conservation();
}

#[test]
fn sweep_reclaims_only_entries_past_the_timeout() {
    let map = TransactionMap::new(&tuning(1024, 64));

    for i in 0..10 {
        map.register_at(0x2000 + i, client(6000 + i), 0).unwrap();
    }
    let late = map.register_at(0x3000, client(6999), 4).unwrap();
    assert_eq!(map.len(), 11);

    let reclaimed = map.sweep_expired(5, 3);
    assert_eq!(reclaimed, 10);
    assert_eq!(map.len(), 1);
    assert_eq!(map.free_ids(), ID_SPACE - 1);

    // The t=4 entry survived and is still consumable.
    let completion = map.take(late).unwrap();
    assert_eq!(completion.original_id, 0x3000);
    map.check_conservation();
}

#[test]
fn swept_entries_are_unknown_to_take() {
    let map = TransactionMap::new(&tuning(1024, 64));
    let upstream_id = map.register_at(0x4242, client(7000), 0).unwrap();
    assert_eq!(map.sweep_expired(10, 3), 1);
    assert!(map.take(upstream_id).is_none());
}

#[test]
fn sweep_respects_the_per_segment_batch_limit() {
    let mut tuning = tuning(1024, 1);
    tuning.cleanup_batch = 5;
    let map = TransactionMap::new(&tuning);

    for i in 0..12 {
        map.register_at(i, client(8000 + i), 0).unwrap();
    }

    assert_eq!(map.sweep_expired(10, 3), 5);
    assert_eq!(map.sweep_expired(10, 3), 5);
    assert_eq!(map.sweep_expired(10, 3), 2);
    assert_eq!(map.len(), 0);
    assert_eq!(map.free_ids(), ID_SPACE);
    map.check_conservation();
}

#[test]
fn slot_exhaustion_fails_cleanly() {
    let map = TransactionMap::new(&tuning(2, 1));
    map.register(1, client(9001)).unwrap();
    map.register(2, client(9002)).unwrap();

    let err = map.register(3, client(9003)).unwrap_err();
    assert_eq!(err, RegisterError::SlotsExhausted);
    // The failed register must not leak an ID.
    assert_eq!(map.free_ids(), ID_SPACE - 2);
    map.check_conservation();
}

#[test]
fn id_exhaustion_fails_cleanly() {
    // Capacity above the ID space, so the ID stack runs dry first.
    let map = TransactionMap::new(&tuning(ID_SPACE + 16, 64));
    for i in 0..ID_SPACE {
        map.register_at(i as u16, client(1), 0).unwrap();
    }
    assert_eq!(map.free_ids(), 0);

    let err = map.register_at(7, client(1), 0).unwrap_err();
    assert_eq!(err, RegisterError::IdsExhausted);
    assert_eq!(map.len(), ID_SPACE);
    map.check_conservation();

    // Sweeping everything brings the full space back.
    let mut reclaimed = 0;
    while reclaimed < ID_SPACE {
        let swept = map.sweep_expired(100, 3);
        assert!(swept > 0);
        reclaimed += swept;
    }
    assert_eq!(map.free_ids(), ID_SPACE);
    map.check_conservation();
}

#[test]
fn concurrent_register_take_and_sweep() {
    use std::sync::Arc;

    let map = Arc::new(TransactionMap::new(&tuning(4096, 64)));
    let mut handles = Vec::new();

    for t in 0..8u16 {
        let map = Arc::clone(&map);
        handles.push(std::thread::spawn(move || {
            for i in 0..500u16 {
                if let Ok(upstream_id) = map.register(i, client(10_000 + t)) {
                    if i % 3 != 0 {
                        // The racing sweeper may legitimately get there
                        // first; when take wins, the context must be ours.
                        if let Some(completion) = map.take(upstream_id) {
                            assert_eq!(completion.original_id, i);
                            assert_eq!(completion.client, client(10_000 + t));
                        }
                    }
                }
            }
        }));
    }

    // Aggressive sweeper racing the workers, timeout 0 so anything a second
    // old is fair game.
    {
        let map = Arc::clone(&map);
        handles.push(std::thread::spawn(move || {
            for _ in 0..50 {
                map.sweep_expired(dnsrelay_infrastructure::clock::now_secs() + 1, 0);
                std::thread::yield_now();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Drain the leftovers and verify nothing was lost either way.
    loop {
        let swept = map.sweep_expired(dnsrelay_infrastructure::clock::now_secs() + 10, 0);
        if swept == 0 {
            break;
        }
    }
    assert_eq!(map.len(), 0);
    assert_eq!(map.free_ids(), ID_SPACE);
    map.check_conservation();
}
