//! HTTP handlers for the API and health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::adapters::http::AppState;

/// Body of a successful API call.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: &'static str,
}

/// Body of the health probe.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Serve a rate-limited API request.
///
/// GET /api
pub async fn api() -> impl IntoResponse {
    Json(ApiResponse {
        message: "Request processed successfully!",
    })
}

/// Report whether the bucket store is reachable.
///
/// GET /health
///
/// Never consumes tokens.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.limiter.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                reason: None,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    reason: Some("Redis connection failed"),
                }),
            )
        }
    }
}

/// Fallback for unknown paths behind the rate limiter.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
}
