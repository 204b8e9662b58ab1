//! Read-through cache guarded against stampedes and penetration.
//!
//! [`ReadThrough`] sits in front of a slow [`Source`] and layers the crate's gates:
//!
//! 1. **Bloom filter (optional):** keys the filter has never seen are rejected without
//!    touching the cache or the source
//! 2. **Cache:** hits are served from memory
//! 3. **Single flight:** concurrent misses for one key share a single
//!    [`Source::load`], and the loaded value is cached for everyone after them

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{LookupError, bloom::BloomFilter, single_flight::Group};

/// Backing store behind a [`ReadThrough`] cache.
pub trait Source {
    /// Error returned by a failed load. Shared with every caller of the load.
    type Error: Clone;

    /// Load the value for `key`. `Ok(None)` means the key does not exist.
    fn load(&self, key: &str) -> Result<Option<String>, Self::Error>;
}

impl<S: Source + ?Sized> Source for Arc<S> {
    type Error = S::Error;

    fn load(&self, key: &str) -> Result<Option<String>, Self::Error> {
        (**self).load(key)
    }
}

/// Counters of a [`ReadThrough`] cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadThroughStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that missed the cache (shared or not).
    pub misses: u64,
    /// Lookups rejected by the bloom filter.
    pub rejected: u64,
    /// Calls made to [`Source::load`].
    pub loads: u64,
}

/// Cache in front of a [`Source`], with coalesced loads.
///
/// # Invalidation
///
/// [`ReadThrough::invalidate`] drops the cached value and forgets an in-flight load so
/// the next lookup reloads. Every key carries a generation that `invalidate` bumps; a
/// load only writes to the cache if the generation it started under is still current,
/// so a load that was running during invalidation never overwrites a newer value. Its
/// own caller still receives what it loaded.
///
/// # Examples
///
/// ```
/// use stampede::read_through::{ReadThrough, Source};
///
/// struct Users;
///
/// impl Source for Users {
///     type Error = String;
///
///     fn load(&self, key: &str) -> Result<Option<String>, String> {
///         Ok(key.strip_prefix("user:").map(|id| format!("user_data_{id}")))
///     }
/// }
///
/// let cache = ReadThrough::new(Users);
///
/// assert_eq!(cache.get("user:1").unwrap(), "user_data_1");
/// assert_eq!(cache.get("user:1").unwrap(), "user_data_1");
/// assert_eq!(cache.stats().loads, 1);
/// assert_eq!(cache.stats().hits, 1);
/// ```
pub struct ReadThrough<S: Source> {
    source: S,
    filter: Option<BloomFilter>,
    cache: DashMap<String, String>,
    generations: DashMap<String, u64>,
    flights: Group<String, Option<String>, S::Error>,
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
    loads: AtomicU64,
}

impl<S: Source> ReadThrough<S> {
    /// Cache without a bloom filter.
    pub fn new(source: S) -> Self {
        Self {
            source,
            filter: None,
            cache: DashMap::new(),
            generations: DashMap::new(),
            flights: Group::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    } // end constructor

    /// Cache that first checks `filter`, which should already hold every existing key.
    pub fn with_bloom_filter(source: S, filter: BloomFilter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::new(source)
        }
    }

    /// Look up `key` through the filter, the cache and finally the source.
    pub fn get(&self, key: &str) -> Result<String, LookupError<S::Error>> {
        if let Some(filter) = self.filter.as_ref()
            && !filter.contains(key.as_bytes())
        {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(LookupError::NotFound(key.to_string()));
        }

        if let Some(value) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let loaded = self.flights.call(key.to_string(), || {
            self.loads.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("read_through.load, loading from source");

            let generation = *self.generations.entry(key.to_string()).or_insert(0);

            let value = self.source.load(key)?;
            if let Some(value) = value.as_ref() {
                self.store(key, value, generation);
            }

            Ok(value)
        })?;

        loaded.ok_or_else(|| LookupError::NotFound(key.to_string()))
    } // end method get

    /// Drop the cached value for `key` and forget any load in flight for it.
    ///
    /// A forgotten load that finishes later does not write to the cache.
    pub fn invalidate(&self, key: &str) {
        self.flights.forget(key);

        // The generation guard is held across the removal so `store` sees both or neither.
        let mut generation = self.generations.entry(key.to_string()).or_insert(0);
        *generation += 1;
        self.cache.remove(key);
    } // end method invalidate

    // Cache `value` only if `key` was not invalidated since the load started.
    fn store(&self, key: &str, value: &str, generation: u64) {
        if let Some(current) = self.generations.get(key)
            && *current == generation
        {
            self.cache.insert(key.to_string(), value.to_string());
            return;
        }

        tracing::debug!("read_through.store, dropped value loaded before invalidation");
    } // end method store

    /// Snapshot of the counters.
    pub fn stats(&self) -> ReadThroughStats {
        ReadThroughStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
        }
    }

    /// The backing source.
    pub fn source(&self) -> &S {
        &self.source
    }
} // end of impl
