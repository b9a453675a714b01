//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `bucket_store` - Redis and in-memory bucket state storage
//! - `rate_limiter` - Token bucket limiters over those stores
//! - `clock` - System and manual time sources
//! - `http` - axum middleware, handlers and router

pub mod bucket_store;
pub mod clock;
pub mod http;
pub mod rate_limiter;

pub use bucket_store::{InMemoryBucketStore, RedisBucketStore};
pub use clock::{ManualClock, SystemClock};
pub use rate_limiter::{ScriptedRedisLimiter, StoreTokenBucketLimiter};
