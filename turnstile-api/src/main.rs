//! Turnstile API Server Entry Point
//!
//! Bootstraps configuration, the in-memory idempotency store, and the
//! Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use turnstile_api::{
    create_api_router, default_idempotency_state, ApiConfig, ApiError, ApiResult, AppState,
    UserRepo,
};
use turnstile_core::{InMemoryIdempotencyStore, SystemClock};

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("turnstile=info,tower_http=info")),
        )
        .init();

    let config = ApiConfig::from_env();

    let store = Arc::new(InMemoryIdempotencyStore::new(
        Arc::new(SystemClock),
        config.reservation_ttl,
    ));

    if let Some(interval) = config.sweep_interval {
        let store = store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let swept = store.sweep();
                if swept > 0 {
                    tracing::debug!(swept, "evicted expired idempotency records");
                }
            }
        });
    }

    let idempotency = default_idempotency_state(&config, store);
    let state = AppState::new(Arc::new(UserRepo::new()));
    let app = create_api_router(state, &config, idempotency);

    let addr = config.bind_addr()?;
    tracing::info!(%addr, "Starting Turnstile API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
