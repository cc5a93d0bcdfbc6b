//! Idempotency Middleware for the Turnstile API
//!
//! Bridges the coordination engine in `turnstile-core` into Axum's request
//! lifecycle. Clients include an `X-Idempotency-Key` header on write
//! requests; for routes registered as idempotent the middleware will:
//!
//! 1. Reject the request with 400 when the header is missing or blank
//! 2. Replay the recorded response when the key already completed
//! 3. Answer 409 when the original request is still executing
//! 4. Otherwise reserve the key, run the handler, and record its response
//!
//! Requests to routes without idempotency configuration pass through
//! untouched.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use turnstile_core::{
    Coordinator, Decision, HandlerOutcome, RouteRegistry, StoredResponse,
};

use crate::error::ApiError;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Header carrying the client's idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Marker header set on replayed responses.
pub const IDEMPOTENCY_REPLAY_HEADER: &str = "x-idempotency-replay";

/// Maximum accepted token length.
pub const MAX_KEY_LENGTH: usize = 256;

// ============================================================================
// STATE
// ============================================================================

/// Shared state for the idempotency middleware.
#[derive(Clone)]
pub struct IdempotencyState {
    pub registry: Arc<RouteRegistry>,
    pub coordinator: Arc<Coordinator>,
    /// Maximum response body size buffered for replay.
    pub max_cached_body_bytes: usize,
}

impl IdempotencyState {
    pub fn new(
        registry: Arc<RouteRegistry>,
        coordinator: Arc<Coordinator>,
        max_cached_body_bytes: usize,
    ) -> Self {
        Self {
            registry,
            coordinator,
            max_cached_body_bytes,
        }
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Axum middleware enforcing at-most-once execution of idempotent routes.
pub async fn idempotency_middleware(
    State(state): State<IdempotencyState>,
    request: Request,
    next: Next,
) -> Result<Response, IdempotencyError> {
    let method = request.method().as_str().to_owned();
    let path = request.uri().path().to_owned();
    let route = state.registry.lookup(&method, &path);

    let token = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);

    if route.as_ref().map(|config| config.enabled).unwrap_or(false) {
        if let Some(token) = token.as_deref() {
            if token.len() > MAX_KEY_LENGTH {
                return Err(IdempotencyError::InvalidKey(format!(
                    "Idempotency key must be at most {} characters",
                    MAX_KEY_LENGTH
                )));
            }
        }
    }

    // The decision is carried across the handler invocation as a plain
    // local value; nothing idempotency-related lives in request extensions
    // or globals.
    let decision = state
        .coordinator
        .begin(route.as_ref(), &method, &path, token.as_deref())
        .await;

    match decision {
        Decision::NotIdempotent => Ok(next.run(request).await),
        Decision::Rejected(_) => Err(IdempotencyError::MissingKey),
        Decision::InFlight => Err(IdempotencyError::InFlight),
        Decision::Unavailable => Err(IdempotencyError::Unavailable),
        Decision::Replay(stored) => replay_response(stored),
        Decision::Admitted(admission) => {
            let response = next.run(request).await;

            // Buffer the response so it can be recorded and still returned.
            let (parts, body) = response.into_parts();
            match axum::body::to_bytes(body, state.max_cached_body_bytes).await {
                Ok(bytes) => {
                    let stored = StoredResponse {
                        status: parts.status.as_u16(),
                        body: bytes.to_vec(),
                        content_type: parts
                            .headers
                            .get(CONTENT_TYPE)
                            .and_then(|h| h.to_str().ok())
                            .map(str::to_owned),
                    };
                    state
                        .coordinator
                        .finish(admission, HandlerOutcome::Responded(stored))
                        .await;
                    Ok(Response::from_parts(parts, Body::from(bytes)))
                }
                Err(err) => {
                    // No storable result: release the reservation so a
                    // retry may execute.
                    state
                        .coordinator
                        .finish(admission, HandlerOutcome::Failed)
                        .await;
                    Err(IdempotencyError::Internal(format!(
                        "Failed to buffer response body: {}",
                        err
                    )))
                }
            }
        }
    }
}

fn replay_response(stored: StoredResponse) -> Result<Response, IdempotencyError> {
    let status = StatusCode::from_u16(stored.status).map_err(|_| {
        IdempotencyError::Internal(format!(
            "Recorded response has invalid status {}",
            stored.status
        ))
    })?;

    let mut builder = Response::builder()
        .status(status)
        .header(IDEMPOTENCY_REPLAY_HEADER, "true");
    if let Some(content_type) = stored.content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(stored.body))
        .map_err(|err| IdempotencyError::Internal(format!("Failed to build replay response: {}", err)))
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Errors surfaced by the idempotency middleware.
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    /// The route requires an idempotency key and none was provided.
    #[error("the X-Idempotency-Key header is required for this operation")]
    MissingKey,

    /// The provided key has an unacceptable format.
    #[error("invalid idempotency key: {0}")]
    InvalidKey(String),

    /// A request with the same key is still executing.
    #[error("a request with this idempotency key is already in progress")]
    InFlight,

    /// The store is unavailable and the policy is fail-closed.
    #[error("idempotency store unavailable")]
    Unavailable,

    /// Internal error (body buffering, response building).
    #[error("idempotency middleware internal error: {0}")]
    Internal(String),
}

impl IntoResponse for IdempotencyError {
    fn into_response(self) -> Response {
        let error = match self {
            IdempotencyError::MissingKey => ApiError::new(
                crate::error::ErrorCode::MissingField,
                "The X-Idempotency-Key header is required for this operation",
            ),
            IdempotencyError::InvalidKey(message) => ApiError::invalid_format(message),
            IdempotencyError::InFlight => ApiError::idempotency_conflict(
                "A request with this idempotency key is already in progress",
            ),
            IdempotencyError::Unavailable => ApiError::service_unavailable(
                "Idempotency store unavailable; request rejected",
            ),
            IdempotencyError::Internal(message) => {
                tracing::error!(error = %message, "idempotency middleware internal error");
                ApiError::internal_error("Internal server error")
            }
        };
        error.into_response()
    }
}

// ============================================================================
// TESTS
// ============================================================================
