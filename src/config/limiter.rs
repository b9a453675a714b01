//! Rate limiter configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::rate_limit::BucketPolicy;

/// Which limiter implementation enforces the policy.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LimiterStrategy {
    /// Whole protocol in one Redis Lua script; exact under concurrency.
    #[default]
    Scripted,
    /// Separate GETs and a MULTI/EXEC commit; may over-admit under races.
    ReadThenWrite,
}

/// Token bucket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    /// Maximum tokens per client
    pub capacity: f64,

    /// Tokens added per second
    pub refill_rate: f64,

    /// Idle seconds before a client's bucket is discarded
    pub ttl_secs: u64,

    /// Limiter implementation
    #[serde(default)]
    pub strategy: LimiterStrategy,

    /// Redirect target for allowed requests; when unset the request is served
    pub success_url: Option<String>,

    /// Message returned with 429 responses
    #[serde(default = "default_failure_message")]
    pub failure_message: String,

    /// Honour X-Forwarded-For / X-Real-IP when identifying clients
    #[serde(default = "default_trust_forwarded_headers")]
    pub trust_forwarded_headers: bool,
}

impl LimiterConfig {
    /// Build the immutable bucket policy.
    pub fn policy(&self) -> Result<BucketPolicy, ValidationError> {
        Ok(BucketPolicy::new(
            self.capacity,
            self.refill_rate,
            Duration::from_secs(self.ttl_secs),
        )?)
    }

    /// Validate limiter configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.policy()?;
        if let Some(url) = &self.success_url {
            let has_host = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .is_some_and(|rest| !rest.is_empty());
            if !has_host {
                return Err(ValidationError::InvalidSuccessUrl);
            }
        }
        Ok(())
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_rate: 1.0,
            ttl_secs: 60,
            strategy: LimiterStrategy::default(),
            success_url: None,
            failure_message: default_failure_message(),
            trust_forwarded_headers: default_trust_forwarded_headers(),
        }
    }
}

fn default_failure_message() -> String {
    "Rate limit exceeded. Please try again later.".to_string()
}

fn default_trust_forwarded_headers() -> bool {
    true
}
