use dnsrelay_infrastructure::UpstreamPool;
use std::io::Write;
use std::net::SocketAddr;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn parse_endpoint_defaults_to_port_53() {
    assert_eq!(
        UpstreamPool::parse_endpoint("8.8.8.8").unwrap(),
        addr("8.8.8.8:53")
    );
    assert_eq!(
        UpstreamPool::parse_endpoint("9.9.9.9:5353").unwrap(),
        addr("9.9.9.9:5353")
    );
    assert!(UpstreamPool::parse_endpoint("not an address").is_err());
}

#[test]
fn duplicates_are_rejected() {
    let mut pool = UpstreamPool::new();
    assert!(pool.add(addr("8.8.8.8:53")));
    assert!(!pool.add(addr("8.8.8.8:53")));
    assert_eq!(pool.len(), 1);
}

#[test]
fn round_robin_cycles_in_order() {
    let mut pool = UpstreamPool::new();
    pool.add(addr("10.0.0.1:53"));
    pool.add(addr("10.0.0.2:53"));
    pool.add(addr("10.0.0.3:53"));

    assert_eq!(pool.next(), Some(addr("10.0.0.1:53")));
    assert_eq!(pool.next(), Some(addr("10.0.0.2:53")));
    assert_eq!(pool.next(), Some(addr("10.0.0.3:53")));
    assert_eq!(pool.next(), Some(addr("10.0.0.1:53")));
}

#[test]
fn random_returns_a_member() {
    let mut pool = UpstreamPool::new();
    pool.add(addr("10.0.0.1:53"));
    pool.add(addr("10.0.0.2:53"));

    for _ in 0..20 {
        let endpoint = pool.random().unwrap();
        assert!(pool.contains(&endpoint));
    }
}

#[test]
fn empty_pool_yields_nothing() {
    let pool = UpstreamPool::new();
    assert!(pool.is_empty());
    assert_eq!(pool.next(), None);
    assert_eq!(pool.random(), None);
}

#[test]
fn contains_matches_exact_endpoint() {
    let mut pool = UpstreamPool::new();
    pool.add(addr("8.8.8.8:53"));

    assert!(pool.contains(&addr("8.8.8.8:53")));
    assert!(!pool.contains(&addr("8.8.8.8:5353")));
    assert!(!pool.contains(&addr("8.8.4.4:53")));
}

#[test]
fn loader_skips_comments_and_invalid_lines() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# resolvers").unwrap();
    writeln!(file, "8.8.8.8").unwrap();
    writeln!(file, "garbage line").unwrap();
    writeln!(file, "1.1.1.1:5353").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "8.8.8.8").unwrap();
    file.flush().unwrap();

    let mut pool = UpstreamPool::new();
    let added = pool.load_file(file.path()).unwrap();
    assert_eq!(added, 2, "duplicate and invalid lines add nothing");
    assert!(pool.contains(&addr("8.8.8.8:53")));
    assert!(pool.contains(&addr("1.1.1.1:5353")));
}

#[test]
fn loader_missing_file_errors() {
    let mut pool = UpstreamPool::new();
    assert!(pool.load_file("/nonexistent/upstreams.conf").is_err());
    assert!(pool.is_empty());
}

#[test]
fn round_robin_is_thread_safe() {
    use std::collections::HashMap;
    use std::sync::Arc;

    let mut pool = UpstreamPool::new();
    pool.add(addr("10.0.0.1:53"));
    pool.add(addr("10.0.0.2:53"));
    let pool = Arc::new(pool);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(std::thread::spawn(move || {
            let mut counts: HashMap<SocketAddr, usize> = HashMap::new();
            for _ in 0..1000 {
                *counts.entry(pool.next().unwrap()).or_default() += 1;
            }
            counts
        }));
    }

    let mut totals: HashMap<SocketAddr, usize> = HashMap::new();
    for handle in handles {
        for (endpoint, count) in handle.join().unwrap() {
            *totals.entry(endpoint).or_default() += count;
        }
    }
    // 4000 picks over 2 endpoints split exactly evenly by the shared cursor.
    assert_eq!(totals[&addr("10.0.0.1:53")], 2000);
    assert_eq!(totals[&addr("10.0.0.2:53")], 2000);
}
