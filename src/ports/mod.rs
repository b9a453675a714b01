//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `RateLimiter` - Per-client allow/deny decisions
//! - `BucketStore` - TTL-expiring key-value storage for bucket state
//! - `Clock` - Wall-clock time source

mod bucket_store;
mod clock;
mod rate_limiter;

pub use bucket_store::{BucketStore, BucketStoreError, SetWithExpiry};
pub use clock::Clock;
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitResult, RateLimitStatus, RateLimiter,
};
