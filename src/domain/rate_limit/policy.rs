//! Bucket policy value object.

use std::time::Duration;

use thiserror::Error;

/// Errors raised when a bucket policy is constructed with invalid values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("capacity must be a finite number greater than zero, got {0}")]
    InvalidCapacity(f64),

    #[error("refill rate must be a finite non-negative number, got {0}")]
    InvalidRefillRate(f64),

    #[error("ttl must be at least one second")]
    InvalidTtl,
}

/// Immutable token bucket configuration.
///
/// Built once at startup and shared by reference across every concurrent
/// `allow` call for the lifetime of the limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketPolicy {
    capacity: f64,
    refill_rate: f64,
    ttl_secs: u64,
}

impl BucketPolicy {
    /// Creates a policy, rejecting non-positive capacity, negative refill
    /// rate, and a zero TTL.
    pub fn new(capacity: f64, refill_rate: f64, ttl: Duration) -> Result<Self, PolicyError> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(PolicyError::InvalidCapacity(capacity));
        }
        if !refill_rate.is_finite() || refill_rate < 0.0 {
            return Err(PolicyError::InvalidRefillRate(refill_rate));
        }
        let ttl_secs = ttl.as_secs();
        if ttl_secs == 0 {
            return Err(PolicyError::InvalidTtl);
        }

        Ok(Self {
            capacity,
            refill_rate,
            ttl_secs,
        })
    }

    /// Maximum number of tokens a bucket can hold.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Idle time after which the store discards a bucket.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// TTL in whole seconds, as handed to the store.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Capacity rounded down, for display in response headers.
    pub fn limit(&self) -> u32 {
        self.capacity.floor().min(u32::MAX as f64) as u32
    }
}
