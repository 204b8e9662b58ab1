#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod single_flight;

pub mod token_bucket;

pub mod bloom;

pub mod read_through;

mod error;
pub use error::*;

mod common;
pub use common::{BucketCapacity, ExpectedItems, FalsePositiveRate, RefillRate};

#[cfg(test)]
mod tests;
