//! Distributed advisory lock manager (spec.md §4.1).
//!
//! The lock is a single entry `"locked" -> [ownerId, leaseExpiryMs]`
//! living inside the record it protects, so acquire/mutate/release can
//! be folded into one atomic [`crate::store::KvStore::operate`] call in
//! the common, uncontended case -- the teacher's `service/operation.rs`
//! composes its classification + apply steps the same way, one
//! `Vec<Op>` per round trip.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use subkeys_core::{Clock, RecordKey};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::store::{KvStore, MapKey, MapOp, MapOpResult, MapValue, RecordOp, RecordOpResult, StoreError};

fn lock_key() -> MapKey {
    MapKey::Str("locked".to_string())
}

static PROCESS_ID: OnceLock<Uuid> = OnceLock::new();

/// A stable identifier for *this* owner within the lock's lifetime
/// (spec.md §4.1 "`ownerId = processUuid + "-" + threadOrTaskId`, stable
/// per execution context, so the lock is reentrant within the same
/// holder").
#[must_use]
pub fn owner_id(task_or_thread_id: impl std::fmt::Display) -> String {
    let process = PROCESS_ID.get_or_init(Uuid::new_v4);
    format!("{process}-{task_or_thread_id}")
}

/// Record-level advisory lock manager over one [`KvStore`].
pub struct LockManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: IndexConfig,
}

impl LockManager {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: IndexConfig) -> Self {
        Self { store, clock, config }
    }

    fn lease_expiry(&self) -> i64 {
        self.clock.now_millis() + self.config.max_lock_time_ms as i64
    }

    fn acquire_op(&self, owner_id: &str, create_only: bool) -> RecordOp {
        RecordOp::Map {
            bin: self.config.lock_bin,
            op: MapOp::Put {
                key: lock_key(),
                value: MapValue::Lock { owner_id: owner_id.to_string(), lease_expiry_ms: self.lease_expiry() },
                create_only,
            },
        }
    }

    fn release_op(&self, owner_id: &str) -> RecordOp {
        RecordOp::Map {
            bin: self.config.lock_bin,
            op: MapOp::RemoveByValueRange {
                begin: MapValue::Lock { owner_id: owner_id.to_string(), lease_expiry_ms: i64::MIN },
                end: MapValue::Lock { owner_id: owner_id.to_string(), lease_expiry_ms: i64::MAX },
            },
        }
    }

    async fn read_holder(&self, key: &RecordKey) -> Result<Option<MapValue>> {
        let results = self
            .store
            .operate(
                key,
                vec![RecordOp::Map { bin: self.config.lock_bin, op: MapOp::GetByKey(lock_key()) }],
                false,
            )
            .await?;
        match results.into_iter().next().and_then(|r| r.as_map().cloned()) {
            Some(MapOpResult::Entry(Some((_, value)))) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Acquires the lock on `key`, running `extra_ops` under it without
    /// releasing. Blocks (sleep-polling every `lockRetryMs`) while a live
    /// foreign lease holds the lock, up to `lockTimeoutMs`; takes over an
    /// expired one.
    pub async fn acquire(
        &self,
        key: &RecordKey,
        owner_id: &str,
        extra_ops: Vec<RecordOp>,
    ) -> Result<Vec<RecordOpResult>> {
        let deadline = self.clock.now_millis() + self.config.lock_timeout_ms as i64;
        loop {
            let mut ops = vec![self.acquire_op(owner_id, true)];
            ops.extend(extra_ops.clone());
            match self.store.operate(key, ops, false).await {
                Ok(mut results) => {
                    results.remove(0);
                    return Ok(results);
                }
                Err(StoreError::ElementExists) => {
                    match self.handle_contention(key, owner_id, deadline).await? {
                        ContentionOutcome::Reentrant => {
                            // Already the holder: re-stamp the lease and run extra_ops.
                            let mut ops = vec![self.acquire_op(owner_id, false)];
                            ops.extend(extra_ops.clone());
                            let mut results = self.store.operate(key, ops, false).await?;
                            results.remove(0);
                            return Ok(results);
                        }
                        ContentionOutcome::RetryImmediately => continue,
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Releases `owner_id`'s lock entry on `key`. Returns `true` iff an
    /// entry was actually removed (spec.md §4.1 "Returns true iff exactly
    /// one entry was removed").
    pub async fn release(&self, key: &RecordKey, owner_id: &str) -> Result<bool> {
        let results = self.store.operate(key, vec![self.release_op(owner_id)], false).await?;
        match results.into_iter().next().and_then(|r| r.as_map().cloned()) {
            Some(MapOpResult::Removed(n)) => Ok(n == 1),
            _ => Ok(false),
        }
    }

    /// `performOperationsUnderLock` (spec.md §4.1): composes
    /// `[acquire, ops…, release]` so they run as one atomic multi-op
    /// whenever the lock is uncontended. Under contention the acquire and
    /// release legs fall back to separate round trips, which is still
    /// race-free because the lock itself serializes every other caller
    /// out for the whole interval.
    pub async fn with_lock(
        &self,
        key: &RecordKey,
        owner_id: &str,
        ops: Vec<RecordOp>,
    ) -> Result<Vec<RecordOpResult>> {
        let deadline = self.clock.now_millis() + self.config.lock_timeout_ms as i64;
        loop {
            let mut full = vec![self.acquire_op(owner_id, true)];
            full.extend(ops.clone());
            full.push(self.release_op(owner_id));
            match self.store.operate(key, full, false).await {
                Ok(mut results) => {
                    results.remove(0);
                    results.pop();
                    return Ok(results);
                }
                Err(StoreError::ElementExists) => match self.handle_contention(key, owner_id, deadline).await? {
                    ContentionOutcome::Reentrant => {
                        let mut full = vec![self.acquire_op(owner_id, false)];
                        full.extend(ops.clone());
                        full.push(self.release_op(owner_id));
                        let mut results = self.store.operate(key, full, false).await?;
                        results.remove(0);
                        results.pop();
                        return Ok(results);
                    }
                    ContentionOutcome::RetryImmediately => continue,
                },
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Inspects the current holder on `ELEMENT_EXISTS` and resolves the
    /// contention per spec.md §4.1: reentrant success, live-lease
    /// retry-until-timeout, or expired-lease takeover.
    async fn handle_contention(
        &self,
        key: &RecordKey,
        owner_id: &str,
        deadline: i64,
    ) -> Result<ContentionOutcome> {
        let mut takeover_attempt = 0u32;
        loop {
            let Some(MapValue::Lock { owner_id: holder, lease_expiry_ms }) = self.read_holder(key).await? else {
                // Entry vanished between the failed CREATE_ONLY and this read
                // (released or taken over concurrently); just retry the acquire.
                return Ok(ContentionOutcome::RetryImmediately);
            };
            if holder == owner_id {
                return Ok(ContentionOutcome::Reentrant);
            }
            let now = self.clock.now_millis();
            if lease_expiry_ms > now {
                if now >= deadline {
                    tracing::warn!(
                        key = %key.key,
                        holder = %holder,
                        waiter = %owner_id,
                        timeout_ms = self.config.lock_timeout_ms,
                        "lock acquire timed out"
                    );
                    return Err(IndexError::LockTimeout { timeout_ms: self.config.lock_timeout_ms });
                }
                tokio::time::sleep(Duration::from_millis(self.config.lock_retry_ms)).await;
                continue;
            }

            // Expired: take over, guarded by a CAS-style remove-then-create on
            // the exact stale value observed. If another holder already
            // renewed or took over, the remove matches nothing and the
            // create-only put fails again, so we loop back and re-observe.
            let stale = MapValue::Lock { owner_id: holder.clone(), lease_expiry_ms };
            let takeover = vec![
                RecordOp::Map {
                    bin: self.config.lock_bin,
                    op: MapOp::RemoveByValueRange { begin: stale.clone(), end: stale },
                },
                self.acquire_op(owner_id, true),
            ];
            match self.store.operate(key, takeover, false).await {
                Ok(_) => {
                    tracing::warn!(key = %key.key, stale_holder = %holder, new_holder = %owner_id, "took over expired lock lease");
                    return Ok(ContentionOutcome::RetryImmediately);
                }
                Err(StoreError::ElementExists) => {
                    // Lost the takeover race to another taker; bounded the same
                    // way the other structural races are (spec.md §7
                    // "RaceRetryable": bounded attempts, small sleep).
                    takeover_attempt += 1;
                    if takeover_attempt > self.config.max_structural_retries {
                        return Err(IndexError::RetriesExhausted {
                            attempts: takeover_attempt,
                            reason: "expired-lease takeover kept losing the race".to_string(),
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.structural_retry_delay_ms)).await;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

enum ContentionOutcome {
    Reentrant,
    RetryImmediately,
}
