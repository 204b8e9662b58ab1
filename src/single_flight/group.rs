use std::{borrow::Borrow, collections::HashMap, hash::Hash, sync::Arc, thread};

use parking_lot::Mutex;

use crate::{
    FlightError,
    single_flight::{
        Flight,
        call::{Call, Outcome},
    },
};

type CallMap<K, V, E> = Mutex<HashMap<K, Arc<Call<V, E>>>>;

enum Registration<V, E> {
    /// Another caller owns the execution.
    Joined(Arc<Call<V, E>>),
    /// This caller registered the key and must run the unit of work.
    Initiated(Arc<Call<V, E>>),
}

/// Coalescing registry: at most one execution in flight per key.
///
/// Every caller that arrives while an execution for its key is running waits for that
/// execution and receives a clone of its outcome, success or failure alike. Once the
/// execution completes the key is removed, so the next caller starts a fresh
/// execution. Nothing is cached past completion.
///
/// # Sharing
///
/// Outcomes are cloned once per waiter. For large values, use `Arc<T>` as `V`.
///
/// Cloning a `Group` yields another handle to the same registry. Separately
/// constructed groups never interact.
///
/// # Failure
///
/// - An `Err(e)` from the unit of work is replayed to every sharing caller as
///   [`FlightError::Failed`] and then discarded like any other outcome, so the next
///   call retries.
/// - A panic in the unit of work unwinds into the executing caller. Before it leaves,
///   the key is removed and every waiter is released with [`FlightError::Panicked`].
/// - [`Group::forget`] releases current waiters with [`FlightError::Forgotten`].
///
/// # Examples
///
/// ```
/// use stampede::single_flight::Group;
///
/// let group: Group<String, u64, String> = Group::new();
///
/// let value = group.call("user:42".to_string(), || Ok(42));
/// assert_eq!(value, Ok(42));
/// assert_eq!(group.in_flight(), 0);
/// ```
pub struct Group<K, V, E> {
    calls: Arc<CallMap<K, V, E>>,
}

impl<K, V, E> Group<K, V, E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys with an execution currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<K, V, E> Default for Group<K, V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> Clone for Group<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<K, V, E> Group<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    /// Run `work` for `key`, or wait for the execution already in flight for it.
    ///
    /// The calling thread runs `work` itself when it is the first caller for the key.
    /// There is no timeout: a joiner blocks until the owning execution finishes or the
    /// key is forgotten.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
    /// use std::{thread, time::Duration};
    ///
    /// use stampede::single_flight::Group;
    ///
    /// let group: Group<&str, String, String> = Group::new();
    /// let loads = Arc::new(AtomicUsize::new(0));
    ///
    /// let handles: Vec<_> = (0..8)
    ///     .map(|_| {
    ///         let group = group.clone();
    ///         let loads = Arc::clone(&loads);
    ///         thread::spawn(move || {
    ///             group.call("config", || {
    ///                 loads.fetch_add(1, Ordering::SeqCst);
    ///                 thread::sleep(Duration::from_millis(50));
    ///                 Ok("loaded".to_string())
    ///             })
    ///         })
    ///     })
    ///     .collect();
    ///
    /// for handle in handles {
    ///     assert_eq!(handle.join().unwrap(), Ok("loaded".to_string()));
    /// }
    /// assert!(loads.load(Ordering::SeqCst) >= 1);
    /// ```
    pub fn call<F>(&self, key: K, work: F) -> Result<V, FlightError<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let call = match self.register(&key) {
            Registration::Joined(call) => {
                tracing::trace!("single_flight.join, waiting on in-flight call");
                return call.wait();
            }
            Registration::Initiated(call) => call,
        };

        tracing::trace!("single_flight.start, executing unit of work");

        let guard = FlightGuard {
            calls: Arc::clone(&self.calls),
            key,
            call,
            finished: false,
        };

        guard.finish(work().map_err(FlightError::Failed))
    } // end method call

    /// Like [`Group::call`], but returns immediately with a private [`Flight`] handle.
    ///
    /// The first caller for a key spawns one thread that runs `work` and resolves its
    /// handle with `shared == false`. Callers that join the execution get handles
    /// resolved with the same outcome and `shared == true`. Joining never spawns a
    /// thread.
    pub fn call_detached<F>(&self, key: K, work: F) -> Flight<V, E>
    where
        F: FnOnce() -> Result<V, E> + Send + 'static,
        K: Send + 'static,
        V: Send + 'static,
        E: Send + 'static,
    {
        let (sender, receiver) = async_channel::bounded(1);

        match self.register(&key) {
            Registration::Joined(call) => {
                tracing::trace!("single_flight.join, subscribing to in-flight call");
                call.subscribe(sender);

                Flight::new(receiver, true)
            }
            Registration::Initiated(call) => {
                let guard = FlightGuard {
                    calls: Arc::clone(&self.calls),
                    key,
                    call,
                    finished: false,
                };

                let spawned = thread::Builder::new()
                    .name("stampede-flight".to_string())
                    .spawn(move || {
                        tracing::trace!("single_flight.start, executing detached unit of work");

                        let outcome = guard.finish(work().map_err(FlightError::Failed));
                        let _ = sender.try_send(outcome);
                    });

                // The closure, and with it the guard, is dropped on failure, which
                // releases the key and resolves every handle.
                if let Err(err) = spawned {
                    tracing::warn!(error = ?err, "single_flight.spawn.error, failed to spawn flight thread");
                }

                Flight::new(receiver, false)
            }
        }
    } // end method call_detached

    /// Drop the in-flight execution for `key`, if any, so the next call starts fresh.
    ///
    /// Callers currently waiting on that execution are released with
    /// [`FlightError::Forgotten`]. The caller running the unit of work is unaffected:
    /// it still receives its own outcome, which is then discarded by the registry.
    ///
    /// Returns whether an execution was in flight.
    pub fn forget<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut calls = self.calls.lock();

        let Some(call) = calls.remove(key) else {
            return false;
        };

        call.complete(Err(FlightError::Forgotten));
        tracing::debug!("single_flight.forget, released waiters of in-flight call");

        true
    } // end method forget

    /// Whether an execution is currently in flight for `key`.
    pub fn is_in_flight<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.calls.lock().contains_key(key)
    }

    fn register(&self, key: &K) -> Registration<V, E> {
        let mut calls = self.calls.lock();

        if let Some(call) = calls.get(key) {
            return Registration::Joined(Arc::clone(call));
        }

        let call = Arc::new(Call::new());
        calls.insert(key.clone(), Arc::clone(&call));

        Registration::Initiated(call)
    } // end method register
} // end of impl

/// Owns the cleanup of one execution.
///
/// Dropping the guard always removes the key (if it still maps to this call). If the
/// guard is dropped before [`FlightGuard::finish`], the call is completed with
/// [`FlightError::Panicked`] first so no waiter is left blocked.
struct FlightGuard<K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    calls: Arc<CallMap<K, V, E>>,
    key: K,
    call: Arc<Call<V, E>>,
    finished: bool,
}

impl<K, V, E> FlightGuard<K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    fn finish(mut self, outcome: Outcome<V, E>) -> Outcome<V, E> {
        self.finished = true;

        if !self.call.complete(outcome.clone()) {
            tracing::debug!("single_flight.finish, call was forgotten before it completed");
        }

        outcome
    }
}

impl<K, V, E> Drop for FlightGuard<K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("single_flight.abandoned, unit of work ended without an outcome");
            self.call.complete(Err(FlightError::Panicked));
        }

        let mut calls = self.calls.lock();

        if calls
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.call))
        {
            calls.remove(&self.key);
        }
    }
}
