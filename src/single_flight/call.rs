use async_channel::Sender;
use parking_lot::{Condvar, Mutex};

use crate::FlightError;

pub(crate) type Outcome<V, E> = Result<V, FlightError<E>>;

struct CallState<V, E> {
    outcome: Option<Outcome<V, E>>,
    // Detached joiners, resolved by whoever completes the call.
    subscribers: Vec<Sender<Outcome<V, E>>>,
}

/// Per-key in-flight call record.
///
/// The outcome is a one-shot latch: the first `complete` wins and every later one is
/// ignored. Once set it stays set, so a waiter that shows up after completion returns
/// immediately instead of blocking.
pub(crate) struct Call<V, E> {
    state: Mutex<CallState<V, E>>,
    done: Condvar,
}

impl<V, E> Call<V, E>
where
    V: Clone,
    E: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CallState {
                outcome: None,
                subscribers: Vec::new(),
            }),
            done: Condvar::new(),
        }
    } // end constructor

    /// Block until the call has an outcome and return a copy of it.
    pub(crate) fn wait(&self) -> Outcome<V, E> {
        let mut state = self.state.lock();

        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return outcome.clone();
            }

            self.done.wait(&mut state);
        }
    } // end method wait

    /// Register a detached joiner. Resolved immediately when the outcome is already set.
    pub(crate) fn subscribe(&self, sender: Sender<Outcome<V, E>>) {
        let mut state = self.state.lock();

        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                // capacity one and a single send, only fails if the handle was dropped
                let _ = sender.try_send(outcome);
            }
            None => state.subscribers.push(sender),
        }
    } // end method subscribe

    /// Set the outcome and wake every waiter.
    ///
    /// Returns `false` when the call already had an outcome, in which case nothing changes.
    pub(crate) fn complete(&self, outcome: Outcome<V, E>) -> bool {
        let subscribers = {
            let mut state = self.state.lock();

            if state.outcome.is_some() {
                return false;
            }

            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.subscribers)
        };

        self.done.notify_all();

        for sender in subscribers {
            let _ = sender.try_send(outcome.clone());
        }

        true
    } // end method complete

    #[cfg(test)]
    pub(crate) fn is_complete(&self) -> bool {
        self.state.lock().outcome.is_some()
    }
} // end of impl
