//! Rate-limited HTTP service.
//!
//! Loads configuration from the environment, connects to Redis, and serves the
//! rate-limited API until SIGINT or SIGTERM.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use token_bucket_limiter::adapters::http::{app_router, AppState, RateLimitSettings};
use token_bucket_limiter::adapters::{
    RedisBucketStore, ScriptedRedisLimiter, StoreTokenBucketLimiter, SystemClock,
};
use token_bucket_limiter::config::{
    AppConfig, ConfigError, LimiterStrategy, ServerConfig, ValidationError,
};
use token_bucket_limiter::ports::{BucketStore, BucketStoreError, Clock, RateLimiter};

/// Errors that abort startup or serving.
#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to connect to Redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis did not respond within {0:?}")]
    RedisTimeout(Duration),

    #[error("Redis ping failed: {0}")]
    RedisPing(#[from] BucketStoreError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = AppConfig::load();

    let log_level = config
        .as_ref()
        .map(|c| c.server.log_level.clone())
        .unwrap_or_else(|_| ServerConfig::default().log_level);
    init_tracing(&log_level);

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server startup failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .init();
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    config.validate()?;
    let policy = Arc::new(config.limiter.policy()?);
    let redis_timeout = config.redis.timeout();

    let client = redis::Client::open(config.redis.url.as_str())?;
    let conn = tokio::time::timeout(redis_timeout, client.get_multiplexed_tokio_connection())
        .await
        .map_err(|_| StartupError::RedisTimeout(redis_timeout))??;

    let store = RedisBucketStore::new(conn.clone());
    tokio::time::timeout(redis_timeout, store.ping())
        .await
        .map_err(|_| StartupError::RedisTimeout(redis_timeout))??;
    tracing::info!("Connected to Redis");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter: Arc<dyn RateLimiter> = match config.limiter.strategy {
        LimiterStrategy::Scripted => Arc::new(ScriptedRedisLimiter::new(conn, policy.clone(), clock)),
        LimiterStrategy::ReadThenWrite => Arc::new(StoreTokenBucketLimiter::new(
            Arc::new(store),
            policy.clone(),
            clock,
        )),
    };
    tracing::info!(
        capacity = policy.capacity(),
        refill_rate = policy.refill_rate(),
        ttl_secs = policy.ttl_secs(),
        strategy = ?config.limiter.strategy,
        "Rate limiter initialized"
    );

    let state = AppState::new(
        limiter,
        RateLimitSettings::from_config(&config.limiter, &config.redis),
    );
    let app = app_router(state, config.server.request_timeout());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server is running");

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutting down server...");
        let _ = stopping_tx.send(());
    })
    .into_future();

    let grace = config.server.shutdown_timeout();
    let forced = async move {
        if stopping_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result?,
        _ = forced => tracing::warn!(?grace, "Server forced to shutdown"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
