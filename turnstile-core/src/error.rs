//! Error types for the idempotency engine.

use thiserror::Error;

/// The client supplied no usable idempotency token.
///
/// Raised by [`crate::key::CacheKey::derive`] when the token is empty or
/// consists only of whitespace. The HTTP layer translates this into a
/// 400 response before the handler is ever invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("idempotency token must not be empty or whitespace")]
pub struct InvalidKeyInput;

/// Failures surfaced by an idempotency store.
///
/// Store operations never silently degrade to "no record": unavailability
/// is reported so the coordinator can apply its fail-open/fail-closed
/// policy explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing resource cannot be reached or refused the operation.
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
}
