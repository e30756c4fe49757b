//! Public facade (spec.md §6 "Public contract"): `Put`, `Put2Key`,
//! `Delete`, `Get`, `GetRange`, `Continue`, `RebuildRoot`, generic over a
//! caller-chosen sort key `K`.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use subkeys_core::{Clock, Digest, ParentKey, RecordKey};

use crate::config::IndexConfig;
use crate::engine::{BlockChainEngine, DeleteOutcome};
use crate::error::Result;
use crate::scan::{Continuation, ScanPage};
use crate::store::{KvStore, SortKey};

/// An external block-chain index over one host key-value store, scoped to
/// sort keys of type `K`.
///
/// One `SubkeyIndex` can be shared across any number of parent keys `P`;
/// it carries no per-parent state of its own (spec.md §5 "The library owns
/// no long-lived background resources; all state is in the store").
pub struct SubkeyIndex<K> {
    engine: BlockChainEngine,
    _sort_key: PhantomData<fn() -> K>,
}

impl<K: SortKey> SubkeyIndex<K> {
    /// # Errors
    /// Returns [`crate::error::IndexError::Configuration`] if `config` is
    /// invalid (spec.md §7 "ConfigurationError").
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { engine: BlockChainEngine::new(store, clock, config), _sort_key: PhantomData })
    }

    fn data_key(&self, parent: &ParentKey, key: &K) -> RecordKey {
        self.engine.layout.data_key(parent, &key.to_map_key().to_key_string())
    }

    fn digest_of(record_key: &RecordKey) -> Digest {
        Digest::of_pair(&format!("{}/{}", record_key.namespace, record_key.set), &record_key.key)
    }

    /// `Put(P, K, writePolicy, bins…)`: writes at the deterministic data
    /// key derived from `(P, K)`.
    pub async fn put(&self, parent: &ParentKey, key: K, ttl_ms: Option<i64>, bins: HashMap<String, Vec<u8>>) -> Result<()> {
        let expiry = resolve_expiry(ttl_ms, self.engine.clock.now_millis());
        let data_key = self.data_key(parent, &key);
        let digest = Self::digest_of(&data_key);
        self.engine.put(parent, key, expiry, &digest, data_key, bins).await
    }

    /// `Put(P, K, writePolicy, altDataKey, bins…)`: writes at a caller-
    /// supplied record key instead of the deterministic one ("two-key
    /// mode", spec.md §3 "Optionally, the caller supplies an alternate
    /// digest ... for pointing at an independent record"). The alternate
    /// record remains caller-owned: `delete` only ever removes the
    /// deterministic data record, never `alt_key`.
    pub async fn put2_key(
        &self,
        parent: &ParentKey,
        key: K,
        ttl_ms: Option<i64>,
        alt_key: RecordKey,
        bins: HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        let expiry = resolve_expiry(ttl_ms, self.engine.clock.now_millis());
        let digest = Self::digest_of(&alt_key);
        self.engine.put(parent, key, expiry, &digest, alt_key, bins).await
    }

    /// `Delete(P, K, writePolicy) -> bool`.
    pub async fn delete(&self, parent: &ParentKey, key: &K) -> Result<bool> {
        Ok(matches!(self.engine.delete(parent, key).await?, DeleteOutcome::Deleted))
    }

    /// `Get(P, K, readPolicy) -> record`. Reads the deterministic data
    /// record directly; does not consult the block chain, matching
    /// spec.md §3's digest-addressable child data records.
    pub async fn get(&self, parent: &ParentKey, key: &K) -> Result<Option<HashMap<String, Vec<u8>>>> {
        let data_key = self.data_key(parent, key);
        Ok(self.engine.store.get(&data_key).await?.map(|snapshot| snapshot.payload))
    }

    /// `GetRange(P, firstKey|nil, includeFirst, forwards, max) -> (records[], continuation)`.
    pub async fn get_range(
        &self,
        parent: &ParentKey,
        first_key: Option<&K>,
        include_first: bool,
        forwards: bool,
        max: u32,
    ) -> Result<ScanPage<K>> {
        let now = self.engine.clock.now_millis();
        self.engine.get_range(parent, first_key, include_first, forwards, max, now).await
    }

    /// `GetRange(continuation, max) -> (records[], continuation)`.
    pub async fn continue_range(&self, continuation: &Continuation, max: u32) -> Result<ScanPage<K>> {
        let now = self.engine.clock.now_millis();
        self.engine.continue_range(continuation, max, now).await
    }

    /// `RebuildRoot(P)`.
    pub async fn rebuild_root(&self, parent: &ParentKey) -> Result<()> {
        self.engine.rebuild_root(parent).await
    }
}

/// `writePolicy.ttl <= 0 ⇒ LONG_MAX` (spec.md §4.4 step 1).
fn resolve_expiry(ttl_ms: Option<i64>, now_ms: i64) -> i64 {
    match ttl_ms {
        Some(ttl) if ttl > 0 => now_ms.saturating_add(ttl),
        _ => i64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use subkeys_core::FixedClock;

    fn index() -> SubkeyIndex<i64> {
        SubkeyIndex::new(Arc::new(MemoryStore::new()), Arc::new(FixedClock::new(1_000)), IndexConfig::default()).unwrap()
    }

    fn bins(v: &str) -> HashMap<String, Vec<u8>> {
        HashMap::from([("v".to_string(), v.as_bytes().to_vec())])
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let idx = index();
        let parent = ParentKey::new("ns", "set", "p").unwrap();
        idx.put(&parent, 42, None, bins("hello")).await.unwrap();
        let got = idx.get(&parent, &42).await.unwrap().unwrap();
        assert_eq!(got.get("v").unwrap(), b"hello");
    }

    #[tokio::test]
    async fn delete_reports_false_for_absent_key() {
        let idx = index();
        let parent = ParentKey::new("ns", "set", "p").unwrap();
        assert!(!idx.delete(&parent, &1).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_inserted_key() {
        let idx = index();
        let parent = ParentKey::new("ns", "set", "p").unwrap();
        idx.put(&parent, 1, None, bins("a")).await.unwrap();
        assert!(idx.delete(&parent, &1).await.unwrap());
        assert!(idx.get(&parent, &1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_absent_from_range_scan() {
        let clock = Arc::new(FixedClock::new(1_000));
        let idx = SubkeyIndex::new(Arc::new(MemoryStore::new()), clock.clone(), IndexConfig::default()).unwrap();
        let parent = ParentKey::new("ns", "set", "p").unwrap();
        idx.put(&parent, 1, Some(10), bins("short-lived")).await.unwrap();
        clock.advance(20);
        let page = idx.get_range(&parent, None, true, true, 100).await.unwrap();
        assert!(page.entries.is_empty());
    }
}
