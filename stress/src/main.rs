use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use dashmap::DashMap;
use hdrhistogram::Histogram;

use stampede::bloom::{BloomFilter, BloomFilterOptions};
use stampede::read_through::{ReadThrough, Source};
use stampede::token_bucket::{KeyedTokenBucket, TokenBucketOptions};
use stampede::{BucketCapacity, ExpectedItems, FalsePositiveRate, LookupError, RefillRate};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Lookup {
    /// Read-through cache with coalesced loads.
    Coalesced,
    /// Cache-aside without coalescing: every concurrent miss queries the database.
    Naive,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "stampede-stress",
    about = "Cache stampede load harness for stampede"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Lookup::Coalesced)]
    lookup: Lookup,

    #[arg(long, value_enum, default_value_t = KeyDist::Hot)]
    key_dist: KeyDist,

    #[arg(long, default_value_t = 64)]
    threads: usize,

    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    /// Rows present in the simulated database.
    #[arg(long, default_value_t = 10_000)]
    key_space: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    /// Fraction of lookups for keys that do not exist (cache penetration traffic).
    #[arg(long, default_value_t = 0.0)]
    missing_fraction: f64,

    /// Put a bloom filter of existing keys in front of the cache.
    #[arg(long, default_value_t = false)]
    bloom: bool,

    #[arg(long, default_value_t = 300)]
    db_latency_ms: u64,

    /// Every `expire_ms` the hot key is evicted, triggering a stampede.
    #[arg(long, default_value_t = 1_000)]
    expire_ms: u64,

    /// Per-thread admission rate; unlimited when absent.
    #[arg(long)]
    admit_per_s: Option<u64>,

    #[arg(long, default_value_t = 1)]
    sample_every: u64,
}

struct SimulatedDatabase {
    rows: HashMap<String, String>,
    latency: Duration,
    queries: AtomicU64,
}

impl SimulatedDatabase {
    fn new(key_space: usize, latency: Duration) -> Self {
        let rows = (0..key_space)
            .map(|i| (format!("user:{i}"), format!("db-value-user:{i}")))
            .collect();

        Self {
            rows,
            latency,
            queries: AtomicU64::new(0),
        }
    }
}

impl Source for SimulatedDatabase {
    type Error = String;

    fn load(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(self.latency);
        Ok(self.rows.get(key).cloned())
    }
}

/// Cache-aside without coalescing, for comparison.
struct NaiveCache {
    db: Arc<SimulatedDatabase>,
    cache: DashMap<String, String>,
}

impl NaiveCache {
    fn get(&self, key: &str) -> Result<String, LookupError<String>> {
        if let Some(value) = self.cache.get(key) {
            return Ok(value.clone());
        }

        match self.db.load(key).map_err(LookupError::Source)? {
            Some(value) => {
                self.cache.insert(key.to_string(), value.clone());
                Ok(value)
            }
            None => Err(LookupError::NotFound(key.to_string())),
        }
    }
}

enum Cache {
    Coalesced(ReadThrough<Arc<SimulatedDatabase>>),
    Naive(NaiveCache),
}

impl Cache {
    fn get(&self, key: &str) -> Result<String, LookupError<String>> {
        match self {
            Cache::Coalesced(cache) => cache.get(key),
            Cache::Naive(cache) => cache.get(key),
        }
    }

    fn invalidate(&self, key: &str) {
        match self {
            Cache::Coalesced(cache) => cache.invalidate(key),
            Cache::Naive(cache) => {
                cache.cache.remove(key);
            }
        }
    }
}

#[derive(Default)]
struct Counts {
    found: AtomicU64,
    not_found: AtomicU64,
    throttled: AtomicU64,
    errors: AtomicU64,
}

fn build_cache(args: &Args, db: Arc<SimulatedDatabase>) -> Cache {
    match args.lookup {
        Lookup::Naive => Cache::Naive(NaiveCache {
            db,
            cache: DashMap::new(),
        }),
        Lookup::Coalesced if args.bloom => {
            let filter = BloomFilter::new(BloomFilterOptions {
                expected_items: ExpectedItems::try_from(args.key_space.max(1) as u64).unwrap(),
                false_positive_rate: FalsePositiveRate::default(),
            });
            for key in db.rows.keys() {
                filter.insert(key.as_bytes());
            }

            Cache::Coalesced(ReadThrough::with_bloom_filter(db, filter))
        }
        Lookup::Coalesced => Cache::Coalesced(ReadThrough::new(db)),
    }
}

fn pick_key(args: &Args, thread_rng: &mut impl FnMut() -> u64) -> String {
    let r = (thread_rng() % 10_000) as f64 / 10_000.0;
    if r < args.missing_fraction {
        return format!("missing:{}", thread_rng());
    }

    let key_space = args.key_space.max(1) as u64;
    let idx = match args.key_dist {
        KeyDist::Hot => 0,
        KeyDist::Uniform => thread_rng() % key_space,
        KeyDist::Skewed => {
            let r = (thread_rng() % 10_000) as f64 / 10_000.0;
            if r < args.hot_fraction {
                0
            } else {
                thread_rng() % key_space
            }
        }
    };

    format!("user:{idx}")
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn print_results(args: &Args, elapsed: Duration, ops: u64, hist: &Histogram<u64>, counts: &Counts, db_queries: u64) {
    println!(
        "lookup={:?} key_dist={:?} bloom={} threads={} duration_s={}",
        args.lookup, args.key_dist, args.bloom, args.threads, args.duration_s
    );
    println!(
        "key_space={} missing_fraction={} db_latency_ms={} expire_ms={} admit_per_s={:?}",
        args.key_space, args.missing_fraction, args.db_latency_ms, args.expire_ms, args.admit_per_s
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!(
        "found={} not_found={} throttled={} errors={} db_queries={}",
        counts.found.load(Ordering::Relaxed),
        counts.not_found.load(Ordering::Relaxed),
        counts.throttled.load(Ordering::Relaxed),
        counts.errors.load(Ordering::Relaxed),
        db_queries
    );
    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

fn main() {
    let args = Args::parse();

    let db = Arc::new(SimulatedDatabase::new(
        args.key_space.max(1),
        Duration::from_millis(args.db_latency_ms),
    ));
    let cache = Arc::new(build_cache(&args, Arc::clone(&db)));

    let admission = args.admit_per_s.map(|rate| {
        Arc::new(KeyedTokenBucket::new(TokenBucketOptions {
            capacity: BucketCapacity::try_from(rate.max(1)).unwrap(),
            refill_per_second: RefillRate::try_from(rate.max(1)).unwrap(),
        }))
    });

    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());
    let total_ops = Arc::new(AtomicU64::new(0));

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);

    let expirer = {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        let every = Duration::from_millis(args.expire_ms.max(1));
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(every);
                cache.invalidate("user:0");
            }
        })
    };

    let mut handles = Vec::with_capacity(args.threads);
    for t in 0..args.threads {
        let cache = Arc::clone(&cache);
        let admission = admission.clone();
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let total_ops = Arc::clone(&total_ops);
        let args = args.clone();

        handles.push(std::thread::spawn(move || {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;
            let thread_key = format!("thread-{t}");

            let mut rng_u64 = || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
                i = i.wrapping_add(1);
                total_ops.fetch_add(1, Ordering::Relaxed);

                if let Some(admission) = admission.as_ref()
                    && !admission.try_consume(&thread_key, 1)
                {
                    counts.throttled.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(Duration::from_millis(1));
                    continue;
                }

                let key = pick_key(&args, &mut rng_u64);
                let t0 = should_sample(i, args.sample_every).then(Instant::now);

                let result = cache.get(&key);

                if let Some(t0) = t0 {
                    let us = t0.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }

                match result {
                    Ok(_) => counts.found.fetch_add(1, Ordering::Relaxed),
                    Err(LookupError::NotFound(_)) => counts.not_found.fetch_add(1, Ordering::Relaxed),
                    Err(_) => counts.errors.fetch_add(1, Ordering::Relaxed),
                };
            }

            hist
        }));
    }

    let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for handle in handles {
        let thread_hist = handle.join().unwrap();
        hist.add(thread_hist).unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    let _ = expirer.join();

    let elapsed = started.elapsed();
    print_results(
        &args,
        elapsed,
        total_ops.load(Ordering::Relaxed),
        &hist,
        &counts,
        db.queries.load(Ordering::Relaxed),
    );
}
