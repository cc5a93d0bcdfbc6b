//! Per-request coordination.
//!
//! [`Coordinator::begin`] runs before the handler and decides whether the
//! request passes through, short-circuits with a replayed response, or is
//! rejected. [`Coordinator::finish`] runs after the handler and commits or
//! abandons the reservation. The coordinator never mutates records itself;
//! every transition goes through the store's atomic operations.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidKeyInput, StoreError};
use crate::key::CacheKey;
use crate::record::StoredResponse;
use crate::registry::RouteIdempotencyConfig;
use crate::store::{IdempotencyStore, ReserveOutcome};

/// Behavior when the store itself is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Proceed without dedup guarantees (legacy best-effort behavior).
    FailOpen,
    /// Reject the request with a service-unavailable indication.
    FailClosed,
}

impl UnavailablePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "fail_open" | "fail-open" | "open" => Some(Self::FailOpen),
            "fail_closed" | "fail-closed" | "closed" => Some(Self::FailClosed),
            _ => None,
        }
    }
}

/// Ticket for an admitted request, carried from the pre-handler phase to
/// the completion phase.
#[derive(Debug, Clone)]
pub struct Admission {
    pub key: CacheKey,
    pub expire_after: Duration,
    /// False when the request was admitted fail-open: no reservation is
    /// held, so there is nothing to complete or abandon afterwards.
    pub reserved: bool,
}

/// Decision for one inbound request.
#[derive(Debug)]
pub enum Decision {
    /// Route is not configured idempotent; pass through untouched.
    NotIdempotent,
    /// The idempotency token is missing or blank; reject before the handler.
    Rejected(InvalidKeyInput),
    /// Execute the handler, then call [`Coordinator::finish`].
    Admitted(Admission),
    /// A prior execution completed; respond with its recorded result.
    Replay(StoredResponse),
    /// The original request is still executing; respond with a conflict.
    InFlight,
    /// Store unavailable under fail-closed policy.
    Unavailable,
}

/// How the admitted handler invocation ended.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// The handler produced a response (success or application error);
    /// record it for replay.
    Responded(StoredResponse),
    /// The invocation failed before producing a storable result; release
    /// the reservation so a retry may execute.
    Failed,
}

/// Orchestrates the pre-handler check and the post-handler commit.
pub struct Coordinator {
    store: Arc<dyn IdempotencyStore>,
    policy: UnavailablePolicy,
}

impl Coordinator {
    pub fn new(store: Arc<dyn IdempotencyStore>, policy: UnavailablePolicy) -> Self {
        Self { store, policy }
    }

    /// Decide how to treat an inbound request.
    pub async fn begin(
        &self,
        route: Option<&RouteIdempotencyConfig>,
        method: &str,
        path: &str,
        token: Option<&str>,
    ) -> Decision {
        let Some(config) = route.filter(|config| config.enabled) else {
            return Decision::NotIdempotent;
        };

        let key = match CacheKey::derive(method, path, token.unwrap_or_default()) {
            Ok(key) => key,
            Err(err) => return Decision::Rejected(err),
        };

        match self.store.try_reserve(&key).await {
            Ok(ReserveOutcome::Admitted) => Decision::Admitted(Admission {
                key,
                expire_after: config.expire_after,
                reserved: true,
            }),
            Ok(ReserveOutcome::InFlight) => {
                tracing::debug!(key = %key, "duplicate request while original is in flight");
                Decision::InFlight
            }
            Ok(ReserveOutcome::Replay(response)) => {
                tracing::debug!(key = %key, status = response.status, "replaying recorded response");
                Decision::Replay(response)
            }
            Err(StoreError::Unavailable(reason)) => match self.policy {
                UnavailablePolicy::FailOpen => {
                    tracing::warn!(
                        key = %key,
                        %reason,
                        "idempotency store unavailable; admitting without dedup guarantees"
                    );
                    Decision::Admitted(Admission {
                        key,
                        expire_after: config.expire_after,
                        reserved: false,
                    })
                }
                UnavailablePolicy::FailClosed => {
                    tracing::error!(key = %key, %reason, "idempotency store unavailable; rejecting request");
                    Decision::Unavailable
                }
            },
        }
    }

    /// Commit or release the reservation for an admitted request.
    pub async fn finish(&self, admission: Admission, outcome: HandlerOutcome) {
        if !admission.reserved {
            tracing::debug!(key = %admission.key, "no reservation held (fail-open admission); nothing to finish");
            return;
        }

        let result = match outcome {
            HandlerOutcome::Responded(response) => {
                self.store
                    .complete(&admission.key, response, admission.expire_after)
                    .await
            }
            HandlerOutcome::Failed => self.store.abandon(&admission.key).await,
        };

        if let Err(err) = result {
            tracing::error!(key = %admission.key, %err, "failed to finalize idempotency reservation");
        }
    }
}
