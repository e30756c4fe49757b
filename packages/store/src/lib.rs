//! `subkeys-store` — an external, sorted, paginable secondary index over a
//! remote key-value store, plus the distributed advisory lock manager it
//! is built on.
//!
//! For any parent key `P` and a user-chosen sort key type `K`, this crate
//! maintains a doubly-linked chain of key-ordered "blocks" summarized by a
//! root map (`min(block) -> blockId`), supporting forward/backward
//! pagination and scaling past the host store's per-record size ceiling by
//! chaining blocks together once any one of them grows past
//! `maxElementsPerBlock`.
//!
//! Structural consistency under concurrent insert/delete/split is kept
//! without any global transaction, using only the host store's atomic
//! multi-operation primitive and per-record advisory locks — see
//! [`lock`] for the locking protocol and [`engine`] for the chain
//! algorithms built on top of it.
//!
//! Transport, authentication, and retry-on-network-error are the
//! [`store::KvStore`] implementation's job, not this crate's.

pub mod config;
pub mod engine;
pub mod error;
pub mod id_allocator;
pub mod index;
pub mod lock;
pub mod scan;
pub mod store;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::SubkeyIndex;
pub use scan::{Continuation, ScanEntry, ScanPage};
pub use store::{KvStore, SortKey, StoreError};

#[cfg(any(test, feature = "test-util"))]
pub use store::memory::MemoryStore;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {}
}

/// End-to-end scenarios mirroring the concrete worked examples used to
/// validate the design (split, scan, pagination, minimum-key deletion,
/// concurrent lock contention, and a non-numeric sort key).
#[cfg(test)]
mod scenario_tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use subkeys_core::{FixedClock, ParentKey};

    use crate::config::IndexConfig;
    use crate::store::memory::MemoryStore;
    use crate::store::KvStore;
    use crate::SubkeyIndex;

    fn config() -> IndexConfig {
        IndexConfig { max_elements_per_block: 7, ..IndexConfig::default() }
    }

    fn bins(tag: i64) -> HashMap<String, Vec<u8>> {
        HashMap::from([("tag".to_string(), tag.to_le_bytes().to_vec())])
    }

    async fn seeded_index() -> (SubkeyIndex<i64>, ParentKey) {
        let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(0)), config()).unwrap();
        let parent = ParentKey::new("ns", "seg", "p").unwrap();
        for k in [100, 200, 300, 400, 500, 600, 700] {
            idx.put(&parent, k, None, bins(k)).await.unwrap();
        }
        (idx, parent)
    }

    #[tokio::test]
    async fn split_on_insertion_yields_two_balanced_blocks() {
        let (idx, parent) = seeded_index().await;
        idx.put(&parent, 50, None, bins(50)).await.unwrap();

        let page = idx.get_range(&parent, None, true, true, 100).await.unwrap();
        let keys: Vec<i64> = page.entries.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![50, 100, 200, 300, 400, 500, 600, 700]);
    }

    #[tokio::test]
    async fn first_split_assigns_the_new_block_id_spec_expects() {
        use subkeys_core::KeyLayout;

        use crate::store::MapValue;

        let store = Arc::new(MemoryStore::new());
        let idx = SubkeyIndex::new(store.clone(), Arc::new(FixedClock::new(0)), config()).unwrap();
        let parent = ParentKey::new("ns", "seg", "p").unwrap();
        for k in [100, 200, 300, 400, 500, 600, 700] {
            idx.put(&parent, k, None, bins(k)).await.unwrap();
        }
        idx.put(&parent, 50, None, bins(50)).await.unwrap();

        // A fresh C(P) starts at 0; without seeding it when the head block
        // is created, the first ever `allocate()` call (made by this
        // split) would return 1 and collide with the head block's own
        // record key, failing the whole put with KeyExists.
        let layout = KeyLayout { root_namespace: String::new(), root_set: String::new() };
        let root_key = layout.root_key(&parent);
        let root = store.get(&root_key).await.unwrap().unwrap();
        let mut entries = root.maps.get("map").unwrap().clone();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let ids: Vec<(i64, u64)> = entries
            .into_iter()
            .map(|(k, v)| match (k, v) {
                (crate::store::MapKey::Int(k), MapValue::BlockId(id)) => (k, id),
                _ => panic!("unexpected root map entry shape"),
            })
            .collect();
        assert_eq!(ids, vec![(50, 1), (400, 2)]);

        // A second split on the same parent must allocate 3, not collide
        // with either existing block: block 2 (400,500,600,700) grows to
        // 8 entries and splits once.
        for k in [750, 800, 850, 900] {
            idx.put(&parent, k, None, bins(k)).await.unwrap();
        }
        let root = store.get(&root_key).await.unwrap().unwrap();
        let mut entries = root.maps.get("map").unwrap().clone();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let ids: Vec<u64> = entries
            .into_iter()
            .map(|(_, v)| match v {
                MapValue::BlockId(id) => id,
                _ => panic!("unexpected root map entry shape"),
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn full_forward_scan_returns_every_key_in_order() {
        let (idx, parent) = seeded_index().await;
        idx.put(&parent, 50, None, bins(50)).await.unwrap();

        let page = idx.get_range(&parent, None, true, true, 100).await.unwrap();
        assert!(page.continuation.is_at_end());
        assert_eq!(page.entries.len(), 8);
    }

    #[tokio::test]
    async fn bounded_pagination_round_trips_through_continuation() {
        let (idx, parent) = seeded_index().await;
        idx.put(&parent, 50, None, bins(50)).await.unwrap();

        let first = idx.get_range(&parent, None, true, true, 3).await.unwrap();
        assert_eq!(first.entries.iter().map(|e| e.key).collect::<Vec<_>>(), vec![50, 100, 200]);
        assert!(!first.continuation.is_at_end());

        let second = idx.continue_range(&first.continuation, 3).await.unwrap();
        assert_eq!(second.entries.iter().map(|e| e.key).collect::<Vec<_>>(), vec![300, 400, 500]);
        assert!(!second.continuation.is_at_end());

        let third = idx.continue_range(&second.continuation, 3).await.unwrap();
        assert_eq!(third.entries.iter().map(|e| e.key).collect::<Vec<_>>(), vec![600, 700]);
        assert!(third.continuation.is_at_end());
    }

    #[tokio::test]
    async fn deleting_the_minimum_advances_the_root_entry() {
        let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(0)), config()).unwrap();
        let parent = ParentKey::new("ns", "seg", "p").unwrap();
        for k in (1000..=20_000).step_by(1000) {
            idx.put(&parent, k, None, bins(k)).await.unwrap();
        }

        assert!(idx.delete(&parent, &1000).await.unwrap());

        let page = idx.get_range(&parent, Some(&0), true, true, 1).await.unwrap();
        assert_eq!(page.entries[0].key, 2000);
    }

    #[tokio::test]
    async fn concurrent_increments_under_lock_sum_correctly() {
        use crate::lock::{owner_id, LockManager};
        use crate::store::{MapOp, RecordOp};
        use subkeys_core::{RecordKey, SystemClock};

        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockManager::new(store.clone(), Arc::new(SystemClock), IndexConfig::default()));
        let counter_key = RecordKey::new("ns", "seg", "shared-counter");

        let mut handles = Vec::new();
        let mut expected_total: i64 = 0;
        for writer in 0..20i64 {
            let delta = 5 + writer;
            expected_total += delta;
            let locks = locks.clone();
            let counter_key = counter_key.clone();
            handles.push(tokio::spawn(async move {
                let owner = owner_id(format!("writer-{writer}"));
                locks
                    .with_lock(&counter_key, &owner, vec![RecordOp::AddInt { bin: "value", delta }])
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = store.get(&counter_key).await.unwrap().unwrap();
        assert_eq!(snapshot.ints["value"], expected_total);

        // Sanity check that the lock bin is empty (every holder released).
        let results = locks
            .acquire(&counter_key, &owner_id("verifier"), vec![RecordOp::Map { bin: "lck", op: MapOp::Size }])
            .await
            .unwrap();
        assert_eq!(results[0].as_map().unwrap().clone(), crate::store::MapOpResult::Count(1));
        locks.release(&counter_key, &owner_id("verifier")).await.unwrap();
    }

    #[tokio::test]
    async fn ad_tech_inversion_returns_sorted_user_records() {
        let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(0)), IndexConfig::default()).unwrap();
        let segment = ParentKey::new("ns", "segment", "DOGS").unwrap();

        for (user, email) in [("Tim", "tim@example.com"), ("Fred", "fred@example.com"), ("John", "john@example.com")] {
            let mut bins = HashMap::new();
            bins.insert("email".to_string(), email.as_bytes().to_vec());
            idx.put(&segment, user.to_string(), None, bins).await.unwrap();
        }

        let page = idx.get_range(&segment, None, true, true, 100).await.unwrap();
        let mut emails: Vec<String> = page
            .entries
            .iter()
            .map(|e| String::from_utf8(e.payload["email"].clone()).unwrap())
            .collect();
        assert_eq!(emails.len(), 3);
        let mut sorted = emails.clone();
        sorted.sort();
        emails.sort();
        assert_eq!(emails, sorted);
    }
}

/// Quantified invariants from spec.md §8: ordering, completeness,
/// uniqueness, idempotent re-put, pagination round-trip, and TTL
/// filtering, checked against arbitrary key sets rather than one fixed
/// example.
#[cfg(test)]
mod property_tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use proptest::collection::hash_set;
    use proptest::prelude::*;
    use subkeys_core::{FixedClock, ParentKey};

    use crate::config::IndexConfig;
    use crate::store::memory::MemoryStore;
    use crate::SubkeyIndex;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn small_config() -> IndexConfig {
        IndexConfig { max_elements_per_block: 7, ..IndexConfig::default() }
    }

    fn bins(tag: i64) -> HashMap<String, Vec<u8>> {
        HashMap::from([("tag".to_string(), tag.to_le_bytes().to_vec())])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(40))]

        /// Ordering, completeness, uniqueness: a full forward scan after
        /// inserting an arbitrary set of distinct keys returns exactly
        /// that set, strictly increasing, with no key repeated.
        #[test]
        fn full_scan_is_sorted_and_complete(keys in hash_set(-2_000i64..2_000, 1..60)) {
            rt().block_on(async {
                let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(0)), small_config()).unwrap();
                let parent = ParentKey::new("ns", "set", "p").unwrap();
                for &k in &keys {
                    idx.put(&parent, k, None, bins(k)).await.unwrap();
                }

                let page = idx.get_range(&parent, None, true, true, keys.len() as u32 + 1).await.unwrap();
                prop_assert!(page.continuation.is_at_end());

                let returned: Vec<i64> = page.entries.iter().map(|e| e.key).collect();
                for pair in returned.windows(2) {
                    prop_assert!(pair[0] < pair[1]);
                }

                let mut expected: Vec<i64> = keys.iter().copied().collect();
                expected.sort_unstable();
                prop_assert_eq!(returned, expected);
                Ok(())
            })?;
        }

        /// Idempotent re-put: writing the same key twice leaves exactly
        /// one entry, and the second value wins.
        #[test]
        fn re_put_same_key_keeps_one_entry_with_latest_value(key in -1_000i64..1_000, first in 0u8..255, second in 0u8..255) {
            rt().block_on(async {
                let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(0)), small_config()).unwrap();
                let parent = ParentKey::new("ns", "set", "p").unwrap();

                idx.put(&parent, key, None, HashMap::from([("v".to_string(), vec![first])])).await.unwrap();
                idx.put(&parent, key, None, HashMap::from([("v".to_string(), vec![second])])).await.unwrap();

                let page = idx.get_range(&parent, None, true, true, 10).await.unwrap();
                prop_assert_eq!(page.entries.len(), 1);
                prop_assert_eq!(page.entries[0].payload["v"].clone(), vec![second]);
                Ok(())
            })?;
        }

        /// Pagination round-trip: concatenating bounded pages equals one
        /// unbounded forward scan, for an arbitrary key set and page size.
        #[test]
        fn paginated_scan_concatenates_to_full_scan(keys in hash_set(0i64..2_000, 1..50), page_size in 1u32..9) {
            rt().block_on(async {
                let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(0)), small_config()).unwrap();
                let parent = ParentKey::new("ns", "set", "p").unwrap();
                for &k in &keys {
                    idx.put(&parent, k, None, bins(k)).await.unwrap();
                }

                let mut paginated = Vec::new();
                let mut page = idx.get_range(&parent, None, true, true, page_size).await.unwrap();
                paginated.extend(page.entries.iter().map(|e| e.key));
                while !page.continuation.is_at_end() {
                    page = idx.continue_range(&page.continuation, page_size).await.unwrap();
                    paginated.extend(page.entries.iter().map(|e| e.key));
                }

                let full = idx.get_range(&parent, None, true, true, keys.len() as u32 + 1).await.unwrap();
                let full_keys: Vec<i64> = full.entries.iter().map(|e| e.key).collect();

                prop_assert_eq!(paginated, full_keys);
                Ok(())
            })?;
        }

        /// TTL filtering: an entry whose expiry has passed is absent from
        /// a range scan regardless of where it sits among live keys.
        #[test]
        fn expired_entries_are_excluded_from_scan(
            live_keys in hash_set(0i64..500, 1..20),
            expired_key in 1_000i64..2_000,
        ) {
            rt().block_on(async {
                let clock = Arc::new(FixedClock::new(0));
                let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), clock.clone(), small_config()).unwrap();
                let parent = ParentKey::new("ns", "set", "p").unwrap();
                for &k in &live_keys {
                    idx.put(&parent, k, None, bins(k)).await.unwrap();
                }
                idx.put(&parent, expired_key, Some(5), bins(expired_key)).await.unwrap();
                clock.advance(10);

                let page = idx.get_range(&parent, None, true, true, live_keys.len() as u32 + 5).await.unwrap();
                let returned: Vec<i64> = page.entries.iter().map(|e| e.key).collect();
                prop_assert!(!returned.contains(&expired_key));
                prop_assert_eq!(returned.len(), live_keys.len());
                Ok(())
            })?;
        }
    }
}
