//! Bloom filter membership gate.
//!
//! Placed in front of a cache, a filter preloaded with every key that exists in the
//! backing store turns lookups for keys that cannot exist into a cheap local rejection
//! instead of a cache miss followed by a wasted backend query.
//!
//! # Examples
//!
//! ```
//! use stampede::{ExpectedItems, FalsePositiveRate};
//! use stampede::bloom::{BloomFilter, BloomFilterOptions};
//!
//! let filter = BloomFilter::new(BloomFilterOptions {
//!     expected_items: ExpectedItems::try_from(1_000).unwrap(),
//!     false_positive_rate: FalsePositiveRate::default(),
//! });
//!
//! filter.insert(b"user:1");
//!
//! assert!(filter.contains(b"user:1"));
//! ```

mod bloom_filter;
pub use bloom_filter::*;
