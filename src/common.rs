use std::ops::Deref;

use crate::StampedeError;

/// Maximum number of tokens a bucket can hold.
///
/// Must be at least 1. A new bucket starts full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketCapacity(u64);

impl Deref for BucketCapacity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for BucketCapacity {
    type Error = StampedeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(StampedeError::InvalidBucketCapacity(
                "Bucket capacity must be at least 1".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Tokens added back to a bucket per second.
///
/// Must be at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefillRate(u64);

impl Deref for RefillRate {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for RefillRate {
    type Error = StampedeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(StampedeError::InvalidRefillRate(
                "Refill rate must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Number of distinct items a bloom filter is sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpectedItems(u64);

impl Deref for ExpectedItems {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for ExpectedItems {
    type Error = StampedeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(StampedeError::InvalidExpectedItems(
                "Expected items must be at least 1".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Target false positive probability of a bloom filter, strictly between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FalsePositiveRate(f64);

impl Default for FalsePositiveRate {
    /// Returns a false positive rate of 1%.
    fn default() -> Self {
        Self(0.01)
    }
}

impl Deref for FalsePositiveRate {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<f64> for FalsePositiveRate {
    type Error = StampedeError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value > 0f64 && value < 1f64 {
            Ok(Self(value))
        } else {
            Err(StampedeError::InvalidFalsePositiveRate(
                "False positive rate must be between 0 and 1 (exclusive)".to_string(),
            ))
        }
    }
}
