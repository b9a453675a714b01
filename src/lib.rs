//! Token Bucket Limiter - distributed per-client rate limiting
//!
//! This crate enforces a per-client request quota with a token bucket whose
//! state lives in Redis, so any number of stateless instances share one view
//! of every client's quota.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
