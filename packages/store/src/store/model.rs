//! Wire model for the store adapter: map keys/values, the CDT op algebra,
//! and the atomic multi-op envelope (`RecordOp`/`RecordOpResult`).
//!
//! This is the Rust shape of the host store's key-ordered map CDT ops
//! (spec.md §2 "Store adapter"): `put`, `size`, `getByKey`, `getByIndex`,
//! `getByIndexRange`, `getByKeyRelativeIndexRange`, `removeByKey`,
//! `removeByValue(Range)`, `clear`, `putItems`, composed into a single
//! atomic `operate()` call the way Aerospike's `Operate()` does.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A key in a key-ordered map bin: either the caller's sort key K (via
/// [`SortKey`]) or a block id in the root map.
///
/// `Max` is a synthetic sentinel used only by the delete algorithm
/// (spec.md §4.6) to guarantee a block's map is never momentarily empty
/// while its last real entry is being removed; it never appears in a
/// result returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKey {
    Int(i64),
    Str(String),
    Max,
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        match (self, other) {
            (MapKey::Max, MapKey::Max) => Equal,
            (MapKey::Max, _) => Greater,
            (_, MapKey::Max) => Less,
            (MapKey::Int(a), MapKey::Int(b)) => a.cmp(b),
            (MapKey::Str(a), MapKey::Str(b)) => a.cmp(b),
            // Mixed Int/Str comparisons are never exercised: a single block
            // chain's K is fixed to one variant for its whole lifetime. Order
            // arbitrarily but consistently so `Ord` stays total.
            (MapKey::Int(_), MapKey::Str(_)) => Less,
            (MapKey::Str(_), MapKey::Int(_)) => Greater,
        }
    }
}

impl MapKey {
    /// Renders a data [`MapKey`] the way it appears inside a derived data
    /// record key (`str(K)` in spec.md §6). Never called with `Max`, the
    /// delete algorithm's internal sentinel.
    #[must_use]
    pub fn to_key_string(&self) -> String {
        match self {
            MapKey::Int(i) => i.to_string(),
            MapKey::Str(s) => s.clone(),
            MapKey::Max => unreachable!("MAX sentinel never reaches a data key"),
        }
    }
}

/// Converts a caller's sort key type to and from the wire [`MapKey`].
///
/// Implemented for the two primitive types spec.md §6 allows for `P.userKey`
/// and, by extension, for K: strings and integers with a total order.
pub trait SortKey: Clone + Ord + Send + Sync + 'static {
    fn to_map_key(&self) -> MapKey;
    fn from_map_key(key: &MapKey) -> Option<Self>;
}

impl SortKey for i64 {
    fn to_map_key(&self) -> MapKey {
        MapKey::Int(*self)
    }

    fn from_map_key(key: &MapKey) -> Option<Self> {
        match key {
            MapKey::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl SortKey for String {
    fn to_map_key(&self) -> MapKey {
        MapKey::Str(self.clone())
    }

    fn from_map_key(key: &MapKey) -> Option<Self> {
        match key {
            MapKey::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// The value half of a key-ordered map entry.
///
/// Hardcoded to the two shapes this crate ever stores, the same way the
/// teacher's `MapDataStore` hardcodes `RecordValue` to its CRDT variants
/// instead of taking a generic value type: block maps hold
/// `BlockEntry { expiry, digest }` (spec.md §3), the root map holds
/// `BlockId`, and the lock bin holds `Lock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapValue {
    /// `[expiryEpochMs, digest]` entry inside a block's main map.
    BlockEntry { expiry_epoch_ms: i64, digest: String },
    /// `blockId` entry inside the root map `R(P)`.
    BlockId(u64),
    /// `[ownerId, leaseExpiryMs]` entry inside a block's lock bin.
    Lock { owner_id: String, lease_expiry_ms: i64 },
}

impl MapValue {
    /// Whether this value falls in `[begin, end]`, Aerospike's
    /// `removeByValueRange` semantics. Only two shapes of range are ever
    /// issued by this crate: an exact `BlockId` match (root-map fixups,
    /// spec.md §4.4/§4.6) and an owner-scoped `Lock` range covering every
    /// possible lease (lock release, spec.md §4.1) -- so this is a direct
    /// match on variant rather than a general-purpose total order.
    #[must_use]
    pub fn in_range(&self, begin: &MapValue, end: &MapValue) -> bool {
        match (self, begin, end) {
            (MapValue::BlockId(v), MapValue::BlockId(b), MapValue::BlockId(e)) => {
                v >= b && v <= e
            }
            (
                MapValue::Lock { owner_id, lease_expiry_ms },
                MapValue::Lock { owner_id: bo, lease_expiry_ms: blease },
                MapValue::Lock { owner_id: eo, lease_expiry_ms: elease },
            ) => owner_id == bo && owner_id == eo && lease_expiry_ms >= blease && lease_expiry_ms <= elease,
            _ => false,
        }
    }
}

/// One CDT operation against a key-ordered map bin.
#[derive(Debug, Clone)]
pub enum MapOp {
    /// Insert or replace `key -> value`. `create_only` mirrors Aerospike's
    /// `MapWriteFlags::CREATE_ONLY`: fails with `StoreError::ElementExists`
    /// if the key is already present. Result: `Count` (map size after the
    /// op, Aerospike's default put return type).
    Put { key: MapKey, value: MapValue, create_only: bool },
    /// Bulk insert/replace, used by split to move half a block's map in a
    /// single op. Result: `Count`.
    PutItems(Vec<(MapKey, MapValue)>),
    /// Result: `Count`.
    Size,
    /// Exact-key lookup. Result: `Entry`.
    GetByKey(MapKey),
    /// Exact-key lookup reporting the entry's 0-based index instead of its
    /// value. Result: `Index`.
    GetByKeyIndex(MapKey),
    /// Result: `Entry` (`None` if `index` is out of range).
    GetByIndex(i64),
    /// Result: `Entries`, in map (ascending key) order.
    GetByIndexRange { index: i64, count: Option<u32> },
    /// Returns entries starting at position `floor(key) + offset`, per
    /// spec.md §4.7's relative-range semantics. Result: `Entries`.
    GetByKeyRelativeIndexRange { key: MapKey, offset: i64, count: Option<u32> },
    /// Result: `Index` (the removed entry's former index, `None` if absent).
    RemoveByKey(MapKey),
    /// Removes every entry whose value falls in `[begin, end]`
    /// ([`MapValue::in_range`]). Result: `Removed`.
    RemoveByValueRange { begin: MapValue, end: MapValue },
    /// Result: `Count` (always 0 after clearing).
    Clear,
}

/// Result of one [`MapOp`], aligned by position with the op list passed to
/// [`super::KvStore::operate`].
#[derive(Debug, Clone, PartialEq)]
pub enum MapOpResult {
    Count(i64),
    Entry(Option<(MapKey, MapValue)>),
    Entries(Vec<(MapKey, MapValue)>),
    Index(Option<i64>),
    Removed(u32),
}

/// One operation inside an atomic multi-op against a whole record (map
/// bin ops plus the plain string/int bins a block or counter record
/// carries: `next`, `prev`, the id counter, the transient lock bin).
#[derive(Debug, Clone)]
pub enum RecordOp {
    /// Operates on the named key-ordered map bin.
    Map { bin: &'static str, op: MapOp },
    /// Sets a plain string bin (`next`/`prev`; empty string means "none",
    /// per spec.md §3).
    SetString { bin: &'static str, value: String },
    /// Reads a plain string bin. Result is `""` if the bin/record is absent.
    GetString { bin: &'static str },
    /// Atomically adds `delta` to an integer bin and returns the new value
    /// (the id allocator's `add(+1)`, spec.md §4.2).
    AddInt { bin: &'static str, delta: i64 },
}

/// Result of one [`RecordOp`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOpResult {
    Map(MapOpResult),
    StringSet,
    StringValue(String),
    IntValue(i64),
}

impl RecordOpResult {
    #[must_use]
    pub fn as_map(&self) -> Option<&MapOpResult> {
        match self {
            RecordOpResult::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            RecordOpResult::StringValue(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RecordOpResult::IntValue(i) => Some(*i),
            _ => None,
        }
    }
}

/// A point-in-time read of every bin in a record, used for plain `get`
/// (no CDT op) reads: routing, scans, and payload fetches.
#[derive(Debug, Clone, Default)]
pub struct RecordSnapshot {
    pub maps: HashMap<&'static str, Vec<(MapKey, MapValue)>>,
    pub strings: HashMap<&'static str, String>,
    pub ints: HashMap<&'static str, i64>,
    pub payload: HashMap<String, Vec<u8>>,
}
