use async_channel::{Receiver, TryRecvError};

use crate::{FlightError, single_flight::call::Outcome};

/// Resolved outcome of a detached call, as seen by one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightResult<V, E> {
    /// Value or error shared by every caller of the execution.
    pub outcome: Result<V, FlightError<E>>,
    /// `true` when this caller joined an execution started by someone else.
    pub shared: bool,
}

/// Private handle returned by [`Group::call_detached`](crate::single_flight::Group::call_detached).
///
/// Each caller gets its own handle, backed by a capacity-one channel that receives
/// exactly one outcome. The handle can be resolved by blocking ([`Flight::wait`]),
/// by awaiting from any executor ([`Flight::recv`]) or by polling ([`Flight::try_recv`]).
///
/// If the execution ends without ever producing an outcome (the unit of work panicked,
/// or its thread could not be spawned) the handle resolves to [`FlightError::Panicked`].
#[derive(Debug)]
pub struct Flight<V, E> {
    receiver: Receiver<Outcome<V, E>>,
    shared: bool,
}

impl<V, E> Flight<V, E> {
    pub(crate) fn new(receiver: Receiver<Outcome<V, E>>, shared: bool) -> Self {
        Self { receiver, shared }
    }

    /// Whether this handle joined an execution started by another caller.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Block the current thread until the outcome is available.
    pub fn wait(self) -> FlightResult<V, E> {
        let outcome = self
            .receiver
            .recv_blocking()
            .unwrap_or(Err(FlightError::Panicked));

        FlightResult {
            outcome,
            shared: self.shared,
        }
    }

    /// Wait for the outcome without blocking the executor.
    pub async fn recv(self) -> FlightResult<V, E> {
        let outcome = self
            .receiver
            .recv()
            .await
            .unwrap_or(Err(FlightError::Panicked));

        FlightResult {
            outcome,
            shared: self.shared,
        }
    }

    /// Take the outcome if it is ready, otherwise hand the handle back.
    pub fn try_recv(self) -> Result<FlightResult<V, E>, Self> {
        let outcome = match self.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Closed) => Err(FlightError::Panicked),
            Err(TryRecvError::Empty) => return Err(self),
        };

        Ok(FlightResult {
            outcome,
            shared: self.shared,
        })
    }
}
