//! Turnstile Core - Idempotency Coordination Engine
//!
//! This crate implements the request-scoped decision process that guards
//! unsafe HTTP write operations against duplicate execution:
//!
//! - [`key`]: derives a stable [`CacheKey`] identifying "the same logical
//!   operation" from method, path, and the client's idempotency token
//! - [`store`]: a time-bounded, concurrency-safe mapping from cache key to
//!   an in-flight reservation or a completed result
//! - [`coordinator`]: the per-request state machine deciding short-circuit
//!   vs. pass-through vs. conflict, and committing the outcome afterwards
//! - [`registry`]: per-route idempotency configuration, populated at startup
//!
//! The crate is framework-agnostic: the HTTP layer lives in `turnstile-api`.

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod record;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Admission, Coordinator, Decision, HandlerOutcome, UnavailablePolicy};
pub use error::{InvalidKeyInput, StoreError};
pub use key::CacheKey;
pub use record::{IdempotencyRecord, StoredResponse};
pub use registry::{RouteIdempotencyConfig, RouteRegistry};
pub use store::{IdempotencyStore, InMemoryIdempotencyStore, ReserveOutcome};
