//! Rate limiting port for protecting downstream services.
//!
//! This port defines the interface for per-client token bucket rate limiting.
//! Implementations keep no in-process state; every call is a fresh
//! read-modify-write against a shared store.

use std::time::Duration;

use async_trait::async_trait;

/// Port for rate limiting operations.
///
/// Implementations must be thread-safe and support concurrent access for the
/// same and different identifiers.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check if a request is allowed, consuming a token if so.
    ///
    /// Returns `Allowed` with the remaining quota or `Denied` with retry info.
    /// A failure to commit the consumed token is an error, never `Allowed`.
    async fn check(&self, identifier: &str) -> Result<RateLimitResult, RateLimitError>;

    /// Get current bucket status without consuming a token.
    async fn status(&self, identifier: &str) -> Result<RateLimitStatus, RateLimitError>;

    /// Probe the backing store without touching any bucket.
    async fn health(&self) -> Result<(), RateLimitError>;

    /// Returns whether the request is admitted.
    async fn allow(&self, identifier: &str) -> Result<bool, RateLimitError> {
        Ok(self.check(identifier).await?.is_allowed())
    }

    /// Like [`RateLimiter::check`], aborting the store calls once `deadline`
    /// elapses.
    ///
    /// An elapsed deadline is reported as [`RateLimitError::TimedOut`], never
    /// as an allow or a deny.
    async fn check_within(
        &self,
        identifier: &str,
        deadline: Duration,
    ) -> Result<RateLimitResult, RateLimitError> {
        tokio::time::timeout(deadline, self.check(identifier))
            .await
            .map_err(|_| RateLimitError::TimedOut(deadline))?
    }

    /// Like [`RateLimiter::allow`], bounded by `deadline`.
    async fn allow_within(
        &self,
        identifier: &str,
        deadline: Duration,
    ) -> Result<bool, RateLimitError> {
        Ok(self.check_within(identifier, deadline).await?.is_allowed())
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    /// Request is allowed; includes current status.
    Allowed(RateLimitStatus),
    /// Request is denied; includes denial details.
    Denied(RateLimitDenied),
}

impl RateLimitResult {
    /// Returns true if the request was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }
}

/// Current bucket status.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    /// Bucket capacity in whole tokens.
    pub limit: u32,
    /// Whole tokens remaining.
    pub remaining: u32,
}

/// Details of a rate limit denial.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDenied {
    /// Bucket capacity in whole tokens.
    pub limit: u32,
    /// Seconds until the client should retry.
    pub retry_after_secs: u64,
}

/// Errors that can occur during rate limiting operations.
///
/// Always distinct from a denial: callers map these to a server-error class.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    /// Rate limiter backend is unavailable.
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),

    /// The caller's deadline elapsed before the store answered.
    #[error("rate limiter timed out after {0:?}")]
    TimedOut(Duration),
}
