//! Bucket store port - key-value backend holding bucket state.
//!
//! A thin contract over a TTL-expiring key-value service. It offers no
//! compare-and-swap: an atomic batch only guarantees that its writes become
//! visible together.

use std::time::Duration;

use async_trait::async_trait;

/// A single `SET key value` with an expiry, used inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetWithExpiry {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
}

impl SetWithExpiry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }
}

/// Errors that can occur in bucket store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BucketStoreError {
    /// The backend rejected or failed the command.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Port for bucket state persistence.
///
/// Every operation is globally visible; implementations must not cache.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Read a key. `Ok(None)` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, BucketStoreError>;

    /// Overwrite a key and reset its expiry to now + `ttl`.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), BucketStoreError>;

    /// Apply all writes as one indivisible unit.
    async fn atomic_batch(&self, ops: Vec<SetWithExpiry>) -> Result<(), BucketStoreError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), BucketStoreError>;
}
