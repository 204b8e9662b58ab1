//! Request coalescing ("single flight").
//!
//! A [`Group`] guarantees that at most one unit of work per key is executing at any
//! time. Callers that arrive while it runs wait for it and share its outcome, which
//! keeps a burst of identical requests (e.g. many readers missing the same expired
//! cache entry) from turning into a burst of identical backend calls.
//!
//! # Key Characteristics
//!
//! - **Per-key:** different keys never wait on each other
//! - **No retention:** the key is released as soon as the execution completes
//! - **Errors are outcomes:** a failure is shared exactly like a success
//! - **Process-scoped:** state lives in memory and is never shared across processes
//!
//! # Entry Points
//!
//! - [`Group::call`]: blocking, the first caller runs the work on its own thread
//! - [`Group::call_detached`]: returns a [`Flight`] handle, the work runs on a spawned thread
//! - [`Group::forget`]: invalidate a key so the next call re-executes
//!
//! # Examples
//!
//! ```
//! use stampede::single_flight::Group;
//!
//! let group: Group<String, String, String> = Group::new();
//!
//! let flight = group.call_detached("report".to_string(), || Ok("done".to_string()));
//! let result = flight.wait();
//!
//! assert_eq!(result.outcome, Ok("done".to_string()));
//! assert!(!result.shared);
//! ```

mod call;

mod flight;
pub use flight::*;

mod group;
pub use group::*;
