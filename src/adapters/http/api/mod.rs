//! API and health endpoints.

mod handlers;
mod routes;

pub use handlers::{api, health, not_found, ApiResponse, HealthResponse};
pub use routes::{app_router, limited_routes, probe_routes};
