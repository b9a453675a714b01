//! HTTP adapters - the rate-limited service surface.

pub mod api;
pub mod middleware;

use std::sync::Arc;

use crate::ports::RateLimiter;

pub use api::app_router;
pub use middleware::RateLimitSettings;

/// Application state shared by the middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    /// Rate limiter (injected)
    pub limiter: Arc<dyn RateLimiter>,
    /// Behaviour around the limiter
    pub settings: Arc<RateLimitSettings>,
}

impl AppState {
    pub fn new(limiter: Arc<dyn RateLimiter>, settings: RateLimitSettings) -> Self {
        Self {
            limiter,
            settings: Arc::new(settings),
        }
    }
}
