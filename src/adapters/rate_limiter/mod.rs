//! Rate limiter adapters.
//!
//! Implementations of the RateLimiter port.
//!
//! ## Available Adapters
//!
//! - `StoreTokenBucketLimiter` - Two-phase read/write over any `BucketStore`
//! - `ScriptedRedisLimiter` - Atomic Lua script evaluated by Redis
//!
//! ## Usage
//!
//! ```ignore
//! use token_bucket_limiter::adapters::rate_limiter::StoreTokenBucketLimiter;
//!
//! let limiter = StoreTokenBucketLimiter::new(store, policy, clock);
//! if limiter.allow("192.168.1.100").await? {
//!     // serve
//! }
//! ```

mod redis_script;
mod token_bucket;

pub use redis_script::ScriptedRedisLimiter;
pub use token_bucket::StoreTokenBucketLimiter;
