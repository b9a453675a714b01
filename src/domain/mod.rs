//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `rate_limit` - Token bucket policy, key layout and decision logic

pub mod rate_limit;
