//! Stored record model.
//!
//! A cache key maps to one of three logical states: no record (never
//! requested, or expired and purged), a reservation held by an in-flight
//! request, or a completed result that can be replayed until it expires.
//! Absence of an entry encodes the first state; this enum encodes the
//! other two. Only the store mutates records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response captured from a completed handler invocation.
///
/// The body is kept as raw bytes so a replay is byte-for-byte identical to
/// the original response regardless of content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// State of a cache key that has a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IdempotencyRecord {
    /// A request with this key is currently executing; no result yet.
    Reserved { reserved_at: DateTime<Utc> },
    /// A prior execution finished; the result is replayable until `expires_at`.
    Completed {
        response: StoredResponse,
        expires_at: DateTime<Utc>,
    },
}

impl IdempotencyRecord {
    /// Whether this record should be treated as absent.
    ///
    /// Completed results expire at their recorded deadline. Reservations
    /// expire after `reservation_ttl` so a handler that hangs or a process
    /// that dies mid-flight cannot block the key forever.
    pub fn is_expired(&self, now: DateTime<Utc>, reservation_ttl: Duration) -> bool {
        match self {
            IdempotencyRecord::Reserved { reserved_at } => {
                now >= crate::clock::deadline(*reserved_at, reservation_ttl)
            }
            IdempotencyRecord::Completed { expires_at, .. } => now > *expires_at,
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, IdempotencyRecord::Reserved { .. })
    }
}
