//! Store adapter: the thin, generic contract over the host key-value
//! database (spec.md §2 "Store adapter", §1 "Out of scope").
//!
//! Everything above this module -- lock manager, id allocator,
//! block-chain engine, range-scan engine -- is built purely by composing
//! [`KvStore::operate`] calls; nothing here knows about blocks, parents,
//! or sort keys. Transport, authentication, and retry-on-network-error are
//! the concrete adapter's job, not this crate's (spec.md §1).

pub mod memory;
pub mod model;

use std::collections::HashMap;

use async_trait::async_trait;
use subkeys_core::RecordKey;

pub use model::{MapKey, MapOp, MapOpResult, MapValue, RecordOp, RecordOpResult, RecordSnapshot, SortKey};

/// Errors the store adapter can report. Anything not named here is a
/// generic store failure, propagated unchanged per spec.md §7 ("StoreError:
/// anything else from the store adapter is propagated unchanged").
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The target record does not exist.
    #[error("key not found")]
    KeyNotFound,
    /// `operate(..., create_only_record = true)` was issued against an
    /// already-existing record (spec.md §4.4 `initializeBlocks`'s
    /// `KEY_EXISTS`).
    #[error("record already exists")]
    KeyExists,
    /// A `MapOp::Put { create_only: true, .. }` collided with an existing
    /// map entry (spec.md §4.1 acquire's `ELEMENT_EXISTS`).
    #[error("map entry already exists")]
    ElementExists,
    /// Any other adapter failure (network, serialization, ...).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Generic contract over the host key-value store.
///
/// Implementations own transport, auth, and retry-on-network-error
/// (spec.md §1). `Send + Sync` so it can be shared as `Arc<dyn KvStore>`
/// across concurrently executing index operations, exactly as the
/// teacher's `ServerStorage`/`MapDataStore` traits are shared.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Executes `ops` against `key` as a single atomic unit, Aerospike
    /// `Operate()`-style: every op runs, in order, against one record
    /// snapshot, and either all effects land or none do.
    ///
    /// `create_only_record` mirrors `CREATE_ONLY` at the record level
    /// (not the map-entry level -- see [`MapOp::Put`] for that): if `true`
    /// and the record already exists, the whole call fails with
    /// [`StoreError::KeyExists`] without running any op.
    async fn operate(
        &self,
        key: &RecordKey,
        ops: Vec<RecordOp>,
        create_only_record: bool,
    ) -> Result<Vec<RecordOpResult>, StoreError>;

    /// Reads every bin of a record. `None` if it does not exist.
    async fn get(&self, key: &RecordKey) -> Result<Option<RecordSnapshot>, StoreError>;

    /// Deletes a record outright. Returns `true` if it existed.
    async fn delete(&self, key: &RecordKey) -> Result<bool, StoreError>;

    /// Writes the caller's opaque payload bins for a child data record
    /// (spec.md §3 "Child data records" -- the library never reads this
    /// content). `expiry_epoch_ms` of 0 means no record-level expiry.
    async fn put_payload(
        &self,
        key: &RecordKey,
        bins: HashMap<String, Vec<u8>>,
        expiry_epoch_ms: i64,
    ) -> Result<(), StoreError>;

    /// Batch-reads payload bins for several child data records in one
    /// round trip, preserving the order of `keys` (spec.md §4.7 step 6).
    async fn batch_get_payload(
        &self,
        keys: &[RecordKey],
    ) -> Result<Vec<(RecordKey, Option<HashMap<String, Vec<u8>>>)>, StoreError>;
}
