//! Turnstile API - REST layer with idempotency-guarded writes
//!
//! This crate exposes the user-management REST surface and wires the
//! idempotency engine from `turnstile-core` into Axum middleware. Unsafe
//! writes (POST/PUT/DELETE) are deduplicated per client-supplied
//! `X-Idempotency-Key`; duplicate requests replay the recorded response
//! and concurrent duplicates are answered with 409.

pub mod config;
pub mod error;
pub mod middleware;
pub mod repo;
pub mod routes;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{
    api_key_middleware, idempotency_middleware, rate_limit_middleware, ApiKeyState,
    IdempotencyState, RateLimitState, API_KEY_HEADER, IDEMPOTENCY_KEY_HEADER,
    IDEMPOTENCY_REPLAY_HEADER,
};
pub use repo::UserRepo;
pub use routes::{create_api_router, default_idempotency_state, default_registry};
pub use state::AppState;
pub use types::*;
