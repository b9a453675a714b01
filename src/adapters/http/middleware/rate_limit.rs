//! Rate limiting middleware for axum.
//!
//! This module provides middleware that enforces the per-client token bucket
//! using the `RateLimiter` port.
//!
//! # Responses
//!
//! - `400 Bad Request` - no client identifier could be extracted; the limiter
//!   is not called
//! - `429 Too Many Requests` - bucket empty; body carries the configured
//!   message and the identifier, plus a `Retry-After` header
//! - `503 Service Unavailable` - limiter backend failed or timed out
//! - `307 Temporary Redirect` - allowed, when a success URL is configured
//!
//! Allowed responses carry `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get, middleware};
//!
//! let app = Router::new()
//!     .route("/api", get(handler))
//!     .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
//!     .with_state(state);
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};

use crate::adapters::http::AppState;
use crate::config::{LimiterConfig, RedisConfig};
use crate::ports::{RateLimitResult, RateLimitStatus};

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Bucket capacity in whole tokens.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Whole tokens remaining after this request.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
}

/// Response body for requests without a usable client identifier.
pub const MISSING_IDENTIFIER_MESSAGE: &str = "Unable to determine IP";

/// Response body for limiter backend failures.
pub const UNAVAILABLE_MESSAGE: &str = "Rate limiter unavailable";

/// How the middleware treats requests around the limiter.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Message returned with 429 responses.
    pub failure_message: String,
    /// Redirect target for allowed requests.
    pub success_url: Option<String>,
    /// Honour forwarding headers when identifying clients.
    pub trust_forwarded_headers: bool,
    /// Deadline for each limiter call.
    pub limiter_timeout: Duration,
}

impl RateLimitSettings {
    /// Build settings from the limiter and Redis configuration.
    pub fn from_config(limiter: &LimiterConfig, redis: &RedisConfig) -> Self {
        Self {
            failure_message: limiter.failure_message.clone(),
            success_url: limiter.success_url.clone(),
            trust_forwarded_headers: limiter.trust_forwarded_headers,
            limiter_timeout: redis.timeout(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self::from_config(&LimiterConfig::default(), &RedisConfig::default())
    }
}

/// Rate limiting middleware keyed by client address.
///
/// This middleware:
/// 1. Extracts the client IP from forwarding headers or `ConnectInfo`
/// 2. Consumes one token for that IP, bounded by the limiter timeout
/// 3. Rejects with 429 when the bucket is empty, 503 when the limiter fails
/// 4. Otherwise redirects to the success URL or runs the inner handler
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let settings = &state.settings;
    let path = request.uri().path().to_string();

    let Some(ip) = extract_client_ip(
        &request,
        connect_info.as_ref(),
        settings.trust_forwarded_headers,
    ) else {
        tracing::error!(path = %path, "Unable to determine IP");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": MISSING_IDENTIFIER_MESSAGE })),
        )
            .into_response();
    };

    match state
        .limiter
        .check_within(&ip, settings.limiter_timeout)
        .await
    {
        Ok(RateLimitResult::Allowed(status)) => {
            tracing::info!(ip = %ip, path = %path, "Request allowed");
            let mut response = match &settings.success_url {
                Some(url) => Redirect::temporary(url).into_response(),
                None => next.run(request).await,
            };
            add_rate_limit_headers(&mut response, &status);
            response
        }
        Ok(RateLimitResult::Denied(denied)) => {
            tracing::info!(ip = %ip, path = %path, "Rate limit exceeded");
            rate_limit_response(&settings.failure_message, &ip, denied.retry_after_secs)
        }
        Err(e) => {
            tracing::error!(ip = %ip, path = %path, error = %e, "Rate limiter unavailable");
            unavailable_response(&ip)
        }
    }
}

/// Extract client IP from request, checking forwarded headers first.
///
/// Order of precedence when `trust_forwarded` is set:
/// 1. X-Forwarded-For header (first IP in list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
fn extract_client_ip<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded: bool,
) -> Option<String> {
    if trust_forwarded {
        if let Some(first_ip) = request
            .headers()
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|forwarded| forwarded.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return Some(first_ip.to_string());
        }

        if let Some(real_ip) = request
            .headers()
            .get("X-Real-IP")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return Some(real_ip.to_string());
        }
    }

    connect_info.map(|ci| ci.0.ip().to_string())
}

/// Create a 429 Too Many Requests response.
///
/// The body never exposes token counts.
fn rate_limit_response(message: &str, ip: &str, retry_after_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": message,
            "ip": ip,
        })),
    )
        .into_response();

    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));

    response
}

/// Create a 503 response for limiter failures.
fn unavailable_response(ip: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": UNAVAILABLE_MESSAGE,
            "ip": ip,
        })),
    )
        .into_response()
}

/// Add rate limit headers to a response.
fn add_rate_limit_headers(response: &mut Response, status: &RateLimitStatus) {
    let headers = response.headers_mut();
    headers.insert(
        headers::X_RATELIMIT_LIMIT.clone(),
        HeaderValue::from(status.limit),
    );
    headers.insert(
        headers::X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(status.remaining),
    );
}
