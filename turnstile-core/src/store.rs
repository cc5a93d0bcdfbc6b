//! Idempotency store.
//!
//! The store owns all record state transitions. The critical operation is
//! [`IdempotencyStore::try_reserve`]: a single atomic check-and-set, so two
//! concurrent duplicates can never both observe "no record" and both run the
//! side effect. Handler execution is never held under a store lock; only the
//! record transition is synchronized, so unrelated keys proceed in parallel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::{deadline, Clock};
use crate::error::StoreError;
use crate::key::CacheKey;
use crate::record::{IdempotencyRecord, StoredResponse};

/// Outcome of an atomic reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// No live record existed; a reservation is now held by the caller.
    Admitted,
    /// Another request with this key is still executing.
    InFlight,
    /// A prior execution completed; replay its response.
    Replay(StoredResponse),
}

/// Time-bounded, concurrency-safe mapping from cache key to record.
///
/// All operations are safe to call from many requests simultaneously.
/// Unavailability is reported as [`StoreError::Unavailable`], never as an
/// empty result, so the coordinator can apply its configured policy.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically inspect the record for `key` and, if it is absent or
    /// expired, install a reservation.
    async fn try_reserve(&self, key: &CacheKey) -> Result<ReserveOutcome, StoreError>;

    /// Transition a reservation to a completed result that expires
    /// `expire_after` from now. Logs an anomaly and leaves the state
    /// untouched when the record is not currently reserved (e.g. the
    /// reservation expired mid-flight).
    async fn complete(
        &self,
        key: &CacheKey,
        response: StoredResponse,
        expire_after: Duration,
    ) -> Result<(), StoreError>;

    /// Release a reservation without recording a result, so a failed
    /// attempt does not lock out retries. No-op for non-reserved records.
    async fn abandon(&self, key: &CacheKey) -> Result<(), StoreError>;
}

/// In-memory store used by the API server and in tests.
///
/// Backed by a [`DashMap`]; the entry API holds the shard lock across the
/// check-and-set, which provides the per-key atomicity `try_reserve`
/// requires. Expiry is evaluated lazily on read; [`sweep`](Self::sweep)
/// can additionally purge expired records to bound memory.
pub struct InMemoryIdempotencyStore {
    records: DashMap<CacheKey, IdempotencyRecord>,
    clock: Arc<dyn Clock>,
    reservation_ttl: Duration,
}

impl InMemoryIdempotencyStore {
    pub fn new(clock: Arc<dyn Clock>, reservation_ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            reservation_ttl,
        }
    }

    /// Remove every expired record. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records
            .retain(|_, record| !record.is_expired(now, self.reservation_ttl));
        before.saturating_sub(self.records.len())
    }

    /// Number of live records (expired ones included until swept).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_reserve(&self, key: &CacheKey) -> Result<ReserveOutcome, StoreError> {
        let now = self.clock.now();
        match self.records.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now, self.reservation_ttl) {
                    entry.insert(IdempotencyRecord::Reserved { reserved_at: now });
                    return Ok(ReserveOutcome::Admitted);
                }
                match entry.get() {
                    IdempotencyRecord::Reserved { .. } => Ok(ReserveOutcome::InFlight),
                    IdempotencyRecord::Completed { response, .. } => {
                        Ok(ReserveOutcome::Replay(response.clone()))
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(IdempotencyRecord::Reserved { reserved_at: now });
                Ok(ReserveOutcome::Admitted)
            }
        }
    }

    async fn complete(
        &self,
        key: &CacheKey,
        response: StoredResponse,
        expire_after: Duration,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        match self.records.entry(key.clone()) {
            Entry::Occupied(mut entry) if entry.get().is_reserved() => {
                entry.insert(IdempotencyRecord::Completed {
                    response,
                    expires_at: deadline(now, expire_after),
                });
                Ok(())
            }
            Entry::Occupied(_) => {
                tracing::warn!(key = %key, "complete called on a record that is not reserved");
                Ok(())
            }
            Entry::Vacant(_) => {
                tracing::warn!(key = %key, "complete called with no record; reservation expired mid-flight?");
                Ok(())
            }
        }
    }

    async fn abandon(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.records.remove_if(key, |_, record| record.is_reserved());
        Ok(())
    }
}
