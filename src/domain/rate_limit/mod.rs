//! Rate limit domain module.
//!
//! Pure token bucket logic with no I/O.
//!
//! # Module Structure
//!
//! - `policy` - Immutable bucket configuration
//! - `keys` - Store key layout per identifier
//! - `bucket` - Bucket state and the refill/consume decision

mod bucket;
mod keys;
mod policy;

pub use bucket::{format_tokens, parse_last_updated, parse_tokens, BucketState, Decision};
pub use keys::{BucketKeys, KEY_PREFIX};
pub use policy::{BucketPolicy, PolicyError};
