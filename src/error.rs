/// Error type for invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StampedeError {
    /// Invalid token bucket capacity.
    #[error("invalid bucket capacity: {0}")]
    InvalidBucketCapacity(String),
    /// Invalid token refill rate.
    #[error("invalid refill rate: {0}")]
    InvalidRefillRate(String),
    /// Invalid expected item count for a bloom filter.
    #[error("invalid expected items: {0}")]
    InvalidExpectedItems(String),
    /// Invalid bloom filter false positive rate.
    #[error("invalid false positive rate: {0}")]
    InvalidFalsePositiveRate(String),
}

/// Outcome error of a coalesced call.
///
/// `Failed` carries the unit of work's own error verbatim; every caller that shared the
/// execution receives a clone of it. The other variants are produced by the registry
/// itself and never by the unit of work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlightError<E> {
    /// The unit of work returned an error.
    #[error("unit of work failed: {0}")]
    Failed(E),
    /// The key was forgotten while this caller was waiting on the shared execution.
    #[error("in-flight call was forgotten before it completed")]
    Forgotten,
    /// The unit of work panicked before producing an outcome.
    #[error("unit of work panicked")]
    Panicked,
}

impl<E> FlightError<E> {
    /// Returns the unit of work's error, if that is what this is.
    pub fn into_failed(self) -> Option<E> {
        match self {
            FlightError::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Error type for [`ReadThrough`](crate::read_through::ReadThrough) lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError<E> {
    /// The key is not present in the source (or was rejected by the bloom filter).
    #[error("key not found: {0}")]
    NotFound(String),
    /// The source failed to load the key.
    #[error("source error: {0}")]
    Source(E),
    /// The shared load was forgotten while this caller was waiting.
    #[error("load was invalidated before it completed")]
    Invalidated,
    /// The shared load panicked.
    #[error("load panicked")]
    Panicked,
}

impl<E> From<FlightError<E>> for LookupError<E> {
    fn from(err: FlightError<E>) -> Self {
        match err {
            FlightError::Failed(err) => LookupError::Source(err),
            FlightError::Forgotten => LookupError::Invalidated,
            FlightError::Panicked => LookupError::Panicked,
        }
    }
}
