//! Middleware modules for the Turnstile API
//!
//! - `auth`: API-key authentication and rate limiting
//! - `idempotency`: idempotency key handling for safe retries
//!
//! # Middleware Order
//!
//! When applying middleware, order matters. The recommended order is:
//!
//! ```ignore
//! Router::new()
//!     .route("/usuarios", post(handler))
//!     // Innermost (runs last on request, first on response)
//!     .layer(middleware::from_fn_with_state(idempotency_state, idempotency_middleware))
//!     // Auth runs before idempotency
//!     .layer(middleware::from_fn_with_state(api_key_state, api_key_middleware))
//!     // Outermost
//! ```

mod auth;
pub mod idempotency;

pub use auth::{
    api_key_middleware, rate_limit_middleware, ApiKeyError, ApiKeyState, RateLimitError,
    RateLimitState, API_KEY_HEADER,
};

pub use idempotency::{
    idempotency_middleware, IdempotencyError, IdempotencyState, IDEMPOTENCY_KEY_HEADER,
    IDEMPOTENCY_REPLAY_HEADER,
};
