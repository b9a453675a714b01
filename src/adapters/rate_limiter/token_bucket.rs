//! Store-backed token bucket limiter.
//!
//! Runs the read → refill → decide → write protocol against any
//! [`BucketStore`]:
//! 1. GET the tokens and last-updated keys (failures fall back to defaults)
//! 2. Refill by elapsed seconds times the refill rate, capped at capacity
//! 3. With at least one token, commit `tokens - 1` and `now` in one atomic batch
//! 4. Otherwise deny without writing, so the refill clock keeps running
//!
//! The read and the write are separate round trips. Concurrent calls for the
//! same identifier can observe the same state and both be admitted; use
//! `ScriptedRedisLimiter` where exact quotas matter.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::rate_limit::{format_tokens, BucketKeys, BucketPolicy, BucketState, Decision};
use crate::ports::{
    BucketStore, Clock, RateLimitDenied, RateLimitError, RateLimitResult, RateLimitStatus,
    RateLimiter, SetWithExpiry,
};

/// Token bucket limiter over a generic bucket store.
#[derive(Clone)]
pub struct StoreTokenBucketLimiter {
    store: Arc<dyn BucketStore>,
    policy: Arc<BucketPolicy>,
    clock: Arc<dyn Clock>,
}

impl StoreTokenBucketLimiter {
    /// Create a new limiter.
    pub fn new(store: Arc<dyn BucketStore>, policy: Arc<BucketPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    /// The policy this limiter enforces.
    pub fn policy(&self) -> &BucketPolicy {
        &self.policy
    }

    /// Read a key, treating a store error as absence.
    async fn read_or_absent(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Bucket read failed, using default");
                None
            }
        }
    }

    async fn load(&self, keys: &BucketKeys, now: i64) -> BucketState {
        let tokens = self.read_or_absent(&keys.tokens).await;
        let last_updated = self.read_or_absent(&keys.last_updated).await;
        BucketState::from_stored(tokens.as_deref(), last_updated.as_deref(), &self.policy, now)
    }

    async fn commit(&self, keys: &BucketKeys, next: &BucketState) -> Result<(), RateLimitError> {
        let ttl = self.policy.ttl();
        let ops = vec![
            SetWithExpiry::new(keys.tokens.as_str(), format_tokens(next.tokens), ttl),
            SetWithExpiry::new(keys.last_updated.as_str(), next.last_updated.to_string(), ttl),
        ];

        self.store.atomic_batch(ops).await.map_err(|e| {
            tracing::error!(key = %keys.tokens, error = %e, "Failed to commit bucket state");
            RateLimitError::Unavailable(e.to_string())
        })
    }
}

#[async_trait]
impl RateLimiter for StoreTokenBucketLimiter {
    async fn check(&self, identifier: &str) -> Result<RateLimitResult, RateLimitError> {
        let keys = BucketKeys::for_identifier(identifier);
        let now = self.clock.now_unix_secs();
        let limit = self.policy.limit();

        let decision = self.load(&keys, now).await.resolve(&self.policy, now);

        match decision {
            Decision::Allow { next } => {
                self.commit(&keys, &next).await?;
                Ok(RateLimitResult::Allowed(RateLimitStatus {
                    limit,
                    remaining: decision.remaining(),
                }))
            }
            Decision::Deny {
                available,
                retry_after_secs,
            } => {
                tracing::debug!(identifier, tokens = available, "Request rejected");
                Ok(RateLimitResult::Denied(RateLimitDenied {
                    limit,
                    retry_after_secs,
                }))
            }
        }
    }

    async fn status(&self, identifier: &str) -> Result<RateLimitStatus, RateLimitError> {
        let keys = BucketKeys::for_identifier(identifier);
        let now = self.clock.now_unix_secs();
        let available = self.load(&keys, now).await.refilled(&self.policy, now);

        Ok(RateLimitStatus {
            limit: self.policy.limit(),
            remaining: available.floor().max(0.0) as u32,
        })
    }

    async fn health(&self) -> Result<(), RateLimitError> {
        self.store
            .ping()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))
    }
}

impl std::fmt::Debug for StoreTokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTokenBucketLimiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
