use std::{
    fmt,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{BucketCapacity, RefillRate};

/// Configuration for [`TokenBucket`] and [`KeyedTokenBucket`](crate::token_bucket::KeyedTokenBucket).
#[derive(Clone, Debug)]
pub struct TokenBucketOptions {
    /// Maximum number of tokens held. A new bucket starts full.
    pub capacity: BucketCapacity,
    /// Whole tokens added back per second.
    pub refill_per_second: RefillRate,
}

struct BucketState {
    tokens: u64,
    last_refill: Instant,
    last_access: Instant,
}

/// Fixed-capacity, fixed-rate admission gate.
///
/// # Algorithm
///
/// 1. **Refill:** on every access, add `floor(elapsed_seconds × refill_per_second)`
///    tokens, capped at capacity
/// 2. **Admission:** a request for `count` tokens succeeds only if that many are
///    available, in which case they are removed
/// 3. **Rejection:** a failed request consumes nothing
///
/// Refill is lazy: no timer runs in the background. The refill timestamp only moves
/// forward by the time the added whole tokens account for, so the fraction of a token
/// earned so far carries over to the next refill.
///
/// # Examples
///
/// ```
/// use stampede::{BucketCapacity, RefillRate};
/// use stampede::token_bucket::{TokenBucket, TokenBucketOptions};
///
/// let bucket = TokenBucket::new(TokenBucketOptions {
///     capacity: BucketCapacity::try_from(3).unwrap(),
///     refill_per_second: RefillRate::try_from(1).unwrap(),
/// });
///
/// assert!(bucket.try_consume(2));
/// assert!(!bucket.try_consume(2));
/// assert!(bucket.try_consume(1));
/// ```
pub struct TokenBucket {
    capacity: BucketCapacity,
    refill_per_second: RefillRate,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(options: TokenBucketOptions) -> Self {
        let now = Instant::now();

        Self {
            capacity: options.capacity,
            refill_per_second: options.refill_per_second,
            state: Mutex::new(BucketState {
                tokens: *options.capacity,
                last_refill: now,
                last_access: now,
            }),
        }
    } // end constructor

    /// Take `count` tokens if they are all available.
    ///
    /// Returns `false` and leaves the bucket untouched otherwise. A `count` of zero is
    /// always admitted.
    pub fn try_consume(&self, count: u64) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();

        self.refill(&mut state, now);
        state.last_access = now;

        if state.tokens >= count {
            state.tokens -= count;
            true
        } else {
            false
        }
    } // end method try_consume

    /// Tokens currently available, after applying any pending refill.
    pub fn tokens(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// Configured capacity.
    pub fn capacity(&self) -> u64 {
        *self.capacity
    }

    /// Configured refill rate in tokens per second.
    pub fn refill_per_second(&self) -> u64 {
        *self.refill_per_second
    }

    /// Time since the last `try_consume`.
    pub(crate) fn idle_for(&self) -> Duration {
        self.state.lock().last_access.elapsed()
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let new_tokens = (elapsed.as_secs_f64() * *self.refill_per_second as f64) as u64;

        if new_tokens > 0 {
            state.tokens = state.tokens.saturating_add(new_tokens).min(*self.capacity);

            // Advance only by the time those whole tokens took, keeping the fraction.
            let spent = Duration::from_secs_f64(new_tokens as f64 / *self.refill_per_second as f64);
            state.last_refill += spent.min(elapsed);
        }
    } // end method refill

    /// Pretend the last refill and access happened `by` earlier.
    #[cfg(test)]
    pub(crate) fn rewind(&self, by: Duration) {
        let mut state = self.state.lock();

        if let Some(last_refill) = state.last_refill.checked_sub(by) {
            state.last_refill = last_refill;
        }
        if let Some(last_access) = state.last_access.checked_sub(by) {
            state.last_access = last_access;
        }
    }
} // end of impl

impl fmt::Display for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Capacity: {}, Rate: {}/s, Tokens: {}",
            self.capacity(),
            self.refill_per_second(),
            self.tokens()
        )
    }
}
