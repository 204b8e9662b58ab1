use std::{
    sync::{Arc, Weak, mpsc},
    thread,
    time::Duration,
};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::token_bucket::{TokenBucket, TokenBucketOptions};

const DEFAULT_STALE_AFTER_MS: u64 = 10 * 60 * 1000;
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 30 * 1000;
const MIN_CLEANUP_INTERVAL_MS: u64 = 1;

/// Per-key token buckets sharing one configuration.
///
/// Buckets are created lazily, full, on the first [`KeyedTokenBucket::try_consume`]
/// for a key.
///
/// # Thread Safety
///
/// - Uses [`DashMap`](dashmap::DashMap) for concurrent key access
/// - Each bucket serializes its own refill and consume
///
/// # Memory growth
///
/// Keys are not removed on their own. Use [`KeyedTokenBucket::run_cleanup_loop`] to
/// periodically drop buckets that have gone idle, or [`KeyedTokenBucket::remove`].
/// An idle bucket would have refilled to capacity anyway, so dropping it does not
/// change any later decision.
pub struct KeyedTokenBucket {
    options: TokenBucketOptions,
    buckets: DashMap<String, TokenBucket>,
    cleanup: Mutex<Option<mpsc::Sender<()>>>,
}

impl KeyedTokenBucket {
    /// Create an empty keyed limiter.
    pub fn new(options: TokenBucketOptions) -> Self {
        Self {
            options,
            buckets: DashMap::new(),
            cleanup: Mutex::new(None),
        }
    } // end constructor

    /// Take `count` tokens from the bucket for `key`.
    pub fn try_consume(&self, key: &str, count: u64) -> bool {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.try_consume(count);
        }

        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.options.clone()))
            .try_consume(count)
    } // end method try_consume

    /// Tokens available for `key`. Unknown keys report a full bucket.
    pub fn tokens(&self, key: &str) -> u64 {
        match self.buckets.get(key) {
            Some(bucket) => bucket.tokens(),
            None => *self.options.capacity,
        }
    }

    /// Drop the bucket for `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.buckets.remove(key).is_some()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Start the cleanup loop with default timings (10 minutes idle, every 30 seconds).
    pub fn run_cleanup_loop(self: &Arc<Self>) {
        self.run_cleanup_loop_with_config(DEFAULT_STALE_AFTER_MS, DEFAULT_CLEANUP_INTERVAL_MS);
    }

    /// Start a background thread that drops buckets idle for longer than
    /// `stale_after_ms`, checking every `cleanup_interval_ms`.
    ///
    /// The first pass runs immediately. An interval of zero is treated as one
    /// millisecond. Calling this while a loop is already running
    /// does nothing (the running loop keeps its configuration). The loop only holds a
    /// weak reference, so it ends on its own once the limiter is dropped.
    pub fn run_cleanup_loop_with_config(
        self: &Arc<Self>,
        stale_after_ms: u64,
        cleanup_interval_ms: u64,
    ) {
        let mut cleanup = self.cleanup.lock();

        if cleanup.is_some() {
            return;
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = Self::cleanup_interval(cleanup_interval_ms);

        let spawned = thread::Builder::new()
            .name("stampede-bucket-cleanup".to_string())
            .spawn(move || {
                loop {
                    let Some(limiter) = weak.upgrade() else {
                        break;
                    };

                    limiter.cleanup(stale_after_ms);
                    drop(limiter);

                    match stopped.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }

                tracing::debug!("token_bucket.cleanup, loop stopped");
            });

        match spawned {
            Ok(_) => *cleanup = Some(stop),
            Err(err) => tracing::warn!(
                error = ?err,
                "token_bucket.cleanup.error, failed to spawn cleanup thread"
            ),
        }
    } // end method run_cleanup_loop_with_config

    /// Stop the cleanup loop, if running. Safe to call repeatedly.
    pub fn stop_cleanup_loop(&self) {
        // dropping the sender wakes the loop and ends it
        self.cleanup.lock().take();
    }

    // A zero timeout would turn the loop into a busy spin.
    pub(crate) fn cleanup_interval(cleanup_interval_ms: u64) -> Duration {
        Duration::from_millis(cleanup_interval_ms.max(MIN_CLEANUP_INTERVAL_MS))
    }

    pub(crate) fn cleanup(&self, stale_after_ms: u64) {
        let stale_after = Duration::from_millis(stale_after_ms);
        let before = self.buckets.len();

        self.buckets.retain(|_, bucket| bucket.idle_for() <= stale_after);

        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::trace!(removed, "token_bucket.cleanup, dropped idle buckets");
        }
    } // end method cleanup
} // end of impl
