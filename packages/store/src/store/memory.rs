//! In-memory reference [`KvStore`], backed by `DashMap` per record and a
//! `BTreeMap` per map bin.
//!
//! Grounded on the teacher's `storage/engines/hashmap.rs` `HashMapStorage`
//! (same `DashMap<String, _>` shape, `&self` interior-mutability methods).
//! Exists so the block-chain engine, lock manager, and scan engine can be
//! unit- and property-tested without a real store round trip. Not
//! recommended for production use: no persistence, no partitioning.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use subkeys_core::RecordKey;

use super::model::{MapKey, MapOp, MapOpResult, MapValue, RecordOp, RecordOpResult, RecordSnapshot};
use super::{KvStore, StoreError};

#[derive(Debug, Clone, Default)]
struct RecordSlot {
    maps: HashMap<&'static str, BTreeMap<MapKey, MapValue>>,
    strings: HashMap<&'static str, String>,
    ints: HashMap<&'static str, i64>,
    payload: HashMap<String, Vec<u8>>,
}

/// Rank of `key` within `map`: its own index if present, else the count
/// of entries strictly less than it (Aerospike's `getByKeyRelativeIndexRange`
/// semantics, spec.md §4.7).
fn rank(map: &BTreeMap<MapKey, MapValue>, key: &MapKey) -> usize {
    map.iter().take_while(|(k, _)| *k < key).count()
}

fn apply_map_op(
    map: &mut BTreeMap<MapKey, MapValue>,
    op: MapOp,
) -> Result<MapOpResult, StoreError> {
    match op {
        MapOp::Put { key, value, create_only } => {
            if create_only && map.contains_key(&key) {
                return Err(StoreError::ElementExists);
            }
            map.insert(key, value);
            Ok(MapOpResult::Count(map.len() as i64))
        }
        MapOp::PutItems(items) => {
            for (k, v) in items {
                map.insert(k, v);
            }
            Ok(MapOpResult::Count(map.len() as i64))
        }
        MapOp::Size => Ok(MapOpResult::Count(map.len() as i64)),
        MapOp::GetByKey(key) => Ok(MapOpResult::Entry(
            map.get(&key).map(|v| (key.clone(), v.clone())),
        )),
        MapOp::GetByKeyIndex(key) => {
            if map.contains_key(&key) {
                Ok(MapOpResult::Index(Some(rank(map, &key) as i64)))
            } else {
                Ok(MapOpResult::Index(None))
            }
        }
        MapOp::GetByIndex(index) => {
            if index < 0 {
                return Ok(MapOpResult::Entry(None));
            }
            Ok(MapOpResult::Entry(
                map.iter().nth(index as usize).map(|(k, v)| (k.clone(), v.clone())),
            ))
        }
        MapOp::GetByIndexRange { index, count } => {
            let start = index.max(0) as usize;
            let entries: Vec<_> = match count {
                Some(c) => map.iter().skip(start).take(c as usize).map(|(k, v)| (k.clone(), v.clone())).collect(),
                None => map.iter().skip(start).map(|(k, v)| (k.clone(), v.clone())).collect(),
            };
            Ok(MapOpResult::Entries(entries))
        }
        MapOp::GetByKeyRelativeIndexRange { key, offset, count } => {
            let base = rank(map, &key) as i64;
            let start = (base + offset).max(0) as usize;
            let entries: Vec<_> = match count {
                Some(c) => map.iter().skip(start).take(c as usize).map(|(k, v)| (k.clone(), v.clone())).collect(),
                None => map.iter().skip(start).map(|(k, v)| (k.clone(), v.clone())).collect(),
            };
            Ok(MapOpResult::Entries(entries))
        }
        MapOp::RemoveByKey(key) => {
            if map.contains_key(&key) {
                let idx = rank(map, &key) as i64;
                map.remove(&key);
                Ok(MapOpResult::Index(Some(idx)))
            } else {
                Ok(MapOpResult::Index(None))
            }
        }
        MapOp::RemoveByValueRange { begin, end } => {
            let before = map.len();
            map.retain(|_, v| !v.in_range(&begin, &end));
            Ok(MapOpResult::Removed((before - map.len()) as u32))
        }
        MapOp::Clear => {
            map.clear();
            Ok(MapOpResult::Count(0))
        }
    }
}

fn apply_ops(slot: &mut RecordSlot, ops: Vec<RecordOp>) -> Result<Vec<RecordOpResult>, StoreError> {
    ops.into_iter()
        .map(|op| match op {
            RecordOp::Map { bin, op } => {
                let map = slot.maps.entry(bin).or_default();
                apply_map_op(map, op).map(RecordOpResult::Map)
            }
            RecordOp::SetString { bin, value } => {
                slot.strings.insert(bin, value);
                Ok(RecordOpResult::StringSet)
            }
            RecordOp::GetString { bin } => {
                Ok(RecordOpResult::StringValue(slot.strings.get(bin).cloned().unwrap_or_default()))
            }
            RecordOp::AddInt { bin, delta } => {
                let value = slot.ints.entry(bin).or_insert(0);
                *value += delta;
                Ok(RecordOpResult::IntValue(*value))
            }
        })
        .collect()
}

/// In-memory `KvStore`. Cheap to clone (shares the underlying `DashMap`
/// via `Arc` internally is not needed -- wrap in `Arc<MemoryStore>` at the
/// call site, matching how `Arc<dyn KvStore>` is threaded everywhere else).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<RecordKey, RecordSlot>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/debug helper: total number of live records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn operate(
        &self,
        key: &RecordKey,
        ops: Vec<RecordOp>,
        create_only_record: bool,
    ) -> Result<Vec<RecordOpResult>, StoreError> {
        match self.entries.entry(key.clone()) {
            DashEntry::Vacant(v) => {
                let mut slot = RecordSlot::default();
                let results = apply_ops(&mut slot, ops)?;
                v.insert(slot);
                Ok(results)
            }
            DashEntry::Occupied(mut o) => {
                if create_only_record {
                    return Err(StoreError::KeyExists);
                }
                // Apply against a scratch copy first so a mid-sequence
                // failure (e.g. CREATE_ONLY losing a race) leaves the
                // stored record untouched -- operate() is all-or-nothing.
                let mut trial = o.get().clone();
                let results = apply_ops(&mut trial, ops)?;
                *o.get_mut() = trial;
                Ok(results)
            }
        }
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<RecordSnapshot>, StoreError> {
        Ok(self.entries.get(key).map(|slot| RecordSnapshot {
            maps: slot
                .maps
                .iter()
                .map(|(bin, m)| (*bin, m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
                .collect(),
            strings: slot.strings.clone(),
            ints: slot.ints.clone(),
            payload: slot.payload.clone(),
        }))
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn put_payload(
        &self,
        key: &RecordKey,
        bins: HashMap<String, Vec<u8>>,
        _expiry_epoch_ms: i64,
    ) -> Result<(), StoreError> {
        self.entries.entry(key.clone()).or_default().payload = bins;
        Ok(())
    }

    async fn batch_get_payload(
        &self,
        keys: &[RecordKey],
    ) -> Result<Vec<(RecordKey, Option<HashMap<String, Vec<u8>>>)>, StoreError> {
        Ok(keys
            .iter()
            .map(|k| {
                let payload = self.entries.get(k).map(|slot| slot.payload.clone());
                (k.clone(), payload)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: &str) -> RecordKey {
        RecordKey::new("ns", "set", n)
    }

    #[tokio::test]
    async fn create_only_record_fails_on_existing() {
        let store = MemoryStore::new();
        let k = key("a");
        store.operate(&k, vec![], false).await.unwrap();
        let err = store.operate(&k, vec![], true).await.unwrap_err();
        assert!(matches!(err, StoreError::KeyExists));
    }

    #[tokio::test]
    async fn map_put_create_only_rejects_duplicate_key() {
        let store = MemoryStore::new();
        let k = key("b");
        let entry = MapValue::BlockEntry { expiry_epoch_ms: i64::MAX, digest: "d".into() };
        store
            .operate(
                &k,
                vec![RecordOp::Map {
                    bin: "map",
                    op: MapOp::Put { key: MapKey::Int(1), value: entry.clone(), create_only: true },
                }],
                false,
            )
            .await
            .unwrap();

        let err = store
            .operate(
                &k,
                vec![RecordOp::Map {
                    bin: "map",
                    op: MapOp::Put { key: MapKey::Int(1), value: entry, create_only: true },
                }],
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ElementExists));
    }

    #[tokio::test]
    async fn relative_index_range_floors_to_predecessor() {
        let store = MemoryStore::new();
        let k = key("root");
        for id in [100i64, 400, 700] {
            store
                .operate(
                    &k,
                    vec![RecordOp::Map {
                        bin: "map",
                        op: MapOp::Put { key: MapKey::Int(id), value: MapValue::BlockId(id as u64), create_only: false },
                    }],
                    false,
                )
                .await
                .unwrap();
        }
        let results = store
            .operate(
                &k,
                vec![RecordOp::Map {
                    bin: "map",
                    op: MapOp::GetByKeyRelativeIndexRange {
                        key: MapKey::Int(500),
                        offset: -1,
                        count: Some(1),
                    },
                }],
                false,
            )
            .await
            .unwrap();
        let MapOpResult::Entries(entries) = results[0].as_map().unwrap().clone() else {
            panic!("expected Entries");
        };
        assert_eq!(entries, vec![(MapKey::Int(400), MapValue::BlockId(400))]);
    }

    #[tokio::test]
    async fn relative_index_range_clamps_below_first_entry() {
        let store = MemoryStore::new();
        let k = key("root2");
        store
            .operate(
                &k,
                vec![RecordOp::Map {
                    bin: "map",
                    op: MapOp::Put { key: MapKey::Int(100), value: MapValue::BlockId(100), create_only: false },
                }],
                false,
            )
            .await
            .unwrap();
        let results = store
            .operate(
                &k,
                vec![RecordOp::Map {
                    bin: "map",
                    op: MapOp::GetByKeyRelativeIndexRange { key: MapKey::Int(1), offset: -1, count: Some(1) },
                }],
                false,
            )
            .await
            .unwrap();
        let MapOpResult::Entries(entries) = results[0].as_map().unwrap().clone() else {
            panic!("expected Entries");
        };
        assert_eq!(entries, vec![(MapKey::Int(100), MapValue::BlockId(100))]);
    }

    #[tokio::test]
    async fn remove_by_value_range_removes_exact_block_id() {
        let store = MemoryStore::new();
        let k = key("root3");
        store
            .operate(
                &k,
                vec![
                    RecordOp::Map { bin: "map", op: MapOp::Put { key: MapKey::Int(1), value: MapValue::BlockId(9), create_only: false } },
                    RecordOp::Map { bin: "map", op: MapOp::Put { key: MapKey::Int(2), value: MapValue::BlockId(10), create_only: false } },
                ],
                false,
            )
            .await
            .unwrap();
        store
            .operate(
                &k,
                vec![RecordOp::Map {
                    bin: "map",
                    op: MapOp::RemoveByValueRange { begin: MapValue::BlockId(9), end: MapValue::BlockId(9) },
                }],
                false,
            )
            .await
            .unwrap();
        let snap = store.get(&k).await.unwrap().unwrap();
        let remaining = &snap.maps["map"];
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1, MapValue::BlockId(10));
    }
}
