//! Token bucket admission gate.
//!
//! A bucket holds up to `capacity` tokens and regains `refill_per_second` of them every
//! second. Each request takes tokens; a request that cannot be covered in full is
//! rejected without taking any. Bursts up to the capacity are admitted immediately,
//! after which throughput settles at the refill rate.
//!
//! - [`TokenBucket`]: a single gate
//! - [`KeyedTokenBucket`]: one lazily created gate per key, with optional idle cleanup
//!
//! # Examples
//!
//! ```
//! use stampede::{BucketCapacity, RefillRate};
//! use stampede::token_bucket::{KeyedTokenBucket, TokenBucketOptions};
//!
//! let limiter = KeyedTokenBucket::new(TokenBucketOptions {
//!     capacity: BucketCapacity::try_from(2).unwrap(),
//!     refill_per_second: RefillRate::try_from(1).unwrap(),
//! });
//!
//! assert!(limiter.try_consume("user_123", 2));
//! assert!(!limiter.try_consume("user_123", 1));
//!
//! // other keys have their own bucket
//! assert!(limiter.try_consume("user_456", 1));
//! ```

mod bucket;
pub use bucket::*;

mod keyed_token_bucket;
pub use keyed_token_bucket::*;
