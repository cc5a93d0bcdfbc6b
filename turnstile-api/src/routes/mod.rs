//! REST API Routes Module
//!
//! Route handlers and the top-level router assembly:
//! - User CRUD routes with idempotency-guarded writes
//! - Health check endpoints (Kubernetes-compatible)
//!
//! Middleware ordering on the user routes: API-key auth runs first, then
//! the idempotency layer, then (for the list route) rate limiting closest
//! to the handler. Health endpoints bypass all three.

pub mod health;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use turnstile_core::{RouteIdempotencyConfig, RouteRegistry};

use crate::config::ApiConfig;
use crate::middleware::{
    api_key_middleware, idempotency_middleware, rate_limit_middleware, ApiKeyState,
    IdempotencyState, RateLimitState,
};
use crate::state::AppState;

// Re-export route creation functions for convenience
pub use health::create_router as health_router;

/// Replay window for user creation, matching the published API contract.
const CREATE_USER_EXPIRE_AFTER: Duration = Duration::from_secs(3600);

/// Build the idempotency registry for the routes this service exposes.
///
/// Declarative startup-time equivalent of per-operation idempotency
/// markers: every unsafe write is listed here.
pub fn default_registry(config: &ApiConfig) -> RouteRegistry {
    let mut registry = RouteRegistry::new();
    registry.register(
        "POST",
        "/usuarios",
        RouteIdempotencyConfig::enabled(CREATE_USER_EXPIRE_AFTER),
    );
    registry.register(
        "PUT",
        "/usuarios/:id",
        RouteIdempotencyConfig::enabled(config.default_expire_after),
    );
    registry.register(
        "DELETE",
        "/usuarios/:id",
        RouteIdempotencyConfig::enabled(config.default_expire_after),
    );
    registry
}

/// Create the complete API router.
pub fn create_api_router(
    state: AppState,
    config: &ApiConfig,
    idempotency: IdempotencyState,
) -> Router {
    let api_key_state = ApiKeyState::new(config.api_key.clone());
    let rate_limit_state = RateLimitState::new(config);

    let user_routes = Router::new()
        .route(
            "/usuarios",
            // Only the list operation carries the rate limit; route_layer
            // binds it to the GET handler before POST is added.
            get(user::list_users)
                .route_layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
                .post(user::create_user),
        )
        .route(
            "/usuarios/:id",
            get(user::get_user)
                .put(user::update_user)
                .delete(user::delete_user),
        )
        .route("/usuarios/:id/tarefas", get(user::list_user_tasks))
        .layer(from_fn_with_state(idempotency, idempotency_middleware))
        .layer(from_fn_with_state(api_key_state, api_key_middleware))
        .with_state(state);

    Router::new()
        .nest("/health", health::create_router())
        .merge(user_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Convenience constructor wiring the default in-memory idempotency stack.
pub fn default_idempotency_state(
    config: &ApiConfig,
    store: Arc<turnstile_core::InMemoryIdempotencyStore>,
) -> IdempotencyState {
    let coordinator = Arc::new(turnstile_core::Coordinator::new(
        store,
        config.unavailable_policy,
    ));
    IdempotencyState::new(
        Arc::new(default_registry(config)),
        coordinator,
        config.max_cached_body_bytes,
    )
}
