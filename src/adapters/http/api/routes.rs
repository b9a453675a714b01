//! Axum router configuration.
//!
//! This module wires the rate limiter in front of the API and leaves the
//! health probe outside of it.

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::handlers::{api, health, not_found};
use crate::adapters::http::middleware::rate_limit_middleware;
use crate::adapters::http::AppState;

/// Routes that consume a token per request.
///
/// # Routes
///
/// - `GET /api` - Sample protected endpoint
/// - any other path - 404, still rate limited
pub fn limited_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api", get(api))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
}

/// Routes that never touch a bucket.
///
/// # Routes
///
/// - `GET /health` - Store reachability probe
pub fn probe_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Create the complete application router.
///
/// # Example
///
/// ```ignore
/// let app = app_router(state, Duration::from_secs(30));
/// axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
/// ```
pub fn app_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(probe_routes())
        .merge(limited_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
