//! Bucket store adapters.
//!
//! Implementations of the BucketStore port.
//!
//! ## Available Adapters
//!
//! - `RedisBucketStore` - Redis-backed for production multi-server
//! - `InMemoryBucketStore` - In-memory with emulated expiry for tests

mod in_memory;
mod redis;

pub use self::in_memory::InMemoryBucketStore;
pub use self::redis::RedisBucketStore;

pub(crate) use self::redis::map_redis_error;
