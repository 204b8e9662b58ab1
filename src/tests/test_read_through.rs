use std::{
    collections::HashMap,
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    ExpectedItems, FalsePositiveRate, LookupError,
    bloom::{BloomFilter, BloomFilterOptions},
    read_through::{ReadThrough, ReadThroughStats, Source},
};

struct MockDatabase {
    rows: HashMap<String, String>,
    queries: AtomicUsize,
    latency: Duration,
    failing: AtomicBool,
}

impl MockDatabase {
    fn new(latency: Duration) -> Self {
        let rows = (0..100)
            .map(|i| (format!("user:{i}"), format!("user_data_{i}")))
            .collect();

        Self {
            rows,
            queries: AtomicUsize::new(0),
            latency,
            failing: AtomicBool::new(false),
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Source for MockDatabase {
    type Error = String;

    fn load(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.latency);

        if self.failing.load(Ordering::SeqCst) {
            return Err("database unavailable".to_string());
        }

        Ok(self.rows.get(key).cloned())
    }
}

fn preloaded_filter(db: &MockDatabase) -> BloomFilter {
    let filter = BloomFilter::new(BloomFilterOptions {
        expected_items: ExpectedItems::try_from(100).unwrap(),
        false_positive_rate: FalsePositiveRate::default(),
    });

    for key in db.rows.keys() {
        filter.insert(key.as_bytes());
    }

    filter
}

#[test]
fn second_lookup_is_served_from_cache() {
    let cache = ReadThrough::new(MockDatabase::new(Duration::ZERO));

    assert_eq!(cache.get("user:1").unwrap(), "user_data_1");
    assert_eq!(cache.get("user:1").unwrap(), "user_data_1");

    assert_eq!(cache.source().queries(), 1);
    assert_eq!(
        cache.stats(),
        ReadThroughStats {
            hits: 1,
            misses: 1,
            rejected: 0,
            loads: 1,
        }
    );
}

#[test]
fn missing_row_is_not_found_and_not_cached() {
    let cache = ReadThrough::new(MockDatabase::new(Duration::ZERO));

    assert_eq!(
        cache.get("user:999"),
        Err(LookupError::NotFound("user:999".to_string()))
    );
    assert_eq!(
        cache.get("user:999"),
        Err(LookupError::NotFound("user:999".to_string()))
    );

    assert_eq!(cache.source().queries(), 2);
}

#[test]
fn expired_entry_stampede_hits_source_once() {
    let cache = Arc::new(ReadThrough::new(MockDatabase::new(Duration::from_millis(300))));
    let barrier = Arc::new(Barrier::new(50));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get("user:12")
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok("user_data_12".to_string()));
    }

    assert_eq!(cache.source().queries(), 1);

    let stats = cache.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.hits + stats.misses, 50);
}

#[test]
fn source_error_is_shared_and_retried_later() {
    let db = MockDatabase::new(Duration::from_millis(100));
    db.failing.store(true, Ordering::SeqCst);
    let cache = Arc::new(ReadThrough::new(db));
    let barrier = Arc::new(Barrier::new(5));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get("user:3")
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(
            handle.join().unwrap(),
            Err(LookupError::Source("database unavailable".to_string()))
        );
    }

    cache.source().failing.store(false, Ordering::SeqCst);
    assert_eq!(cache.get("user:3").unwrap(), "user_data_3");
}

#[test]
fn bloom_filter_rejects_unknown_keys_without_querying() {
    let db = MockDatabase::new(Duration::from_millis(10));
    let filter = preloaded_filter(&db);
    let cache = ReadThrough::with_bloom_filter(db, filter);

    assert_eq!(cache.get("user:1").unwrap(), "user_data_1");
    assert_eq!(cache.get("user:1").unwrap(), "user_data_1");

    let attacks = 1_000;
    let blocked = (0..attacks)
        .filter(|i| {
            matches!(
                cache.get(&format!("attack:{i}")),
                Err(LookupError::NotFound(_))
            )
        })
        .count();

    assert_eq!(blocked, attacks);

    // false positives pass the filter and cost one query each
    let stats = cache.stats();
    assert!(stats.rejected >= 950, "rejected: {}", stats.rejected);
    assert_eq!(cache.source().queries() as u64, 1 + (attacks as u64 - stats.rejected));
}

#[test]
fn invalidate_forces_reload() {
    let cache = ReadThrough::new(MockDatabase::new(Duration::ZERO));

    assert_eq!(cache.get("user:5").unwrap(), "user_data_5");
    cache.invalidate("user:5");
    assert_eq!(cache.get("user:5").unwrap(), "user_data_5");

    assert_eq!(cache.source().queries(), 2);
}

/// Returns `v{version}`; the first load pauses until released.
struct VersionedSource {
    version: AtomicU64,
    loads: AtomicUsize,
    started: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Source for VersionedSource {
    type Error = String;

    fn load(&self, _key: &str) -> Result<Option<String>, Self::Error> {
        let value = format!("v{}", self.version.load(Ordering::SeqCst));

        if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
            let _ = self.started.lock().send(());
            let _ = self.release.lock().recv();
        }

        Ok(Some(value))
    }
}

#[test]
fn load_running_during_invalidate_does_not_overwrite_newer_value() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();

    let cache = Arc::new(ReadThrough::new(VersionedSource {
        version: AtomicU64::new(1),
        loads: AtomicUsize::new(0),
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    }));

    let first = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get("k"))
    };

    started_rx.recv().unwrap();

    cache.source().version.store(2, Ordering::SeqCst);
    cache.invalidate("k");
    assert_eq!(cache.get("k"), Ok("v2".to_string()));

    release_tx.send(()).unwrap();
    // the caller that ran the outdated load still gets what it loaded
    assert_eq!(first.join().unwrap(), Ok("v1".to_string()));

    assert_eq!(cache.get("k"), Ok("v2".to_string()));

    let stats = cache.stats();
    assert_eq!(stats.loads, 2);
    assert_eq!(stats.hits, 1);
}

#[test]
fn invalidate_without_load_in_flight_keeps_caching() {
    let cache = ReadThrough::new(MockDatabase::new(Duration::ZERO));

    cache.invalidate("user:7");
    assert_eq!(cache.get("user:7").unwrap(), "user_data_7");
    assert_eq!(cache.get("user:7").unwrap(), "user_data_7");

    assert_eq!(cache.source().queries(), 1);
}
