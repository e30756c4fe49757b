//! Block-chain engine: block layout, root-map maintenance, routing, split,
//! and empty-block unlink (spec.md §4.3-§4.6, §4.8). The public facade in
//! [`crate::index`] is the only caller; every structural invariant listed
//! in spec.md §3 is upheld here.

mod delete;
mod insert;
mod rebuild;
mod split;

use std::sync::Arc;

use subkeys_core::{Clock, KeyLayout, ParentKey, RecordKey};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::id_allocator::{IdAllocator, HEAD_BLOCK_ID};
use crate::lock::{owner_id, LockManager};
use crate::store::{KvStore, MapOpResult, MapValue, RecordOp, SortKey};

pub use delete::DeleteOutcome;
pub use split::SplitOutcome;

/// Result of [`BlockChainEngine::route_block`] (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// `R(P)` does not exist yet; the caller must initialize the chain.
    New,
    Found(u64),
}

pub struct BlockChainEngine {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: IndexConfig,
    pub(crate) layout: KeyLayout,
    pub(crate) locks: LockManager,
    pub(crate) ids: IdAllocator,
}

impl BlockChainEngine {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: IndexConfig) -> Self {
        let layout = KeyLayout { root_namespace: config.root_map_namespace.clone(), root_set: config.root_map_set.clone() };
        let locks = LockManager::new(store.clone(), clock.clone(), config.clone());
        let ids = IdAllocator::new(store.clone(), layout.clone());
        Self { store, clock, config, layout, locks, ids }
    }

    /// A fresh owner identity for one top-level engine call. Spec.md §4.1's
    /// reentrance guarantee only needs to hold across locks taken within a
    /// single logical operation (no engine method here ever tries to
    /// re-acquire a lock it still holds from a prior, already-released
    /// call), so a random per-call task id is sufficient.
    pub(crate) fn call_owner(&self) -> String {
        owner_id(Uuid::new_v4())
    }

    pub(crate) fn block_key(&self, parent: &ParentKey, block_id: u64) -> RecordKey {
        self.layout.block_key(parent, block_id)
    }

    pub(crate) fn root_key(&self, parent: &ParentKey) -> RecordKey {
        self.layout.root_key(parent)
    }

    /// `routeBlock(P, K) -> blockId` (spec.md §4.3).
    pub async fn route_block<K: SortKey>(&self, parent: &ParentKey, k: &K) -> Result<RouteOutcome> {
        let root_key = self.root_key(parent);
        if self.store.get(&root_key).await?.is_none() {
            return Ok(RouteOutcome::New);
        }

        let map_key = k.to_map_key();
        let results = self
            .store
            .operate(
                &root_key,
                vec![
                    RecordOp::Map { bin: self.config.root_map_bin, op: crate::store::MapOp::GetByKey(map_key.clone()) },
                    RecordOp::Map {
                        bin: self.config.root_map_bin,
                        op: crate::store::MapOp::GetByKeyRelativeIndexRange { key: map_key.clone(), offset: -1, count: Some(1) },
                    },
                ],
                false,
            )
            .await?;

        if let Some(MapOpResult::Entry(Some((_, MapValue::BlockId(id))))) = results[0].as_map().cloned() {
            return Ok(RouteOutcome::Found(id));
        }

        match results[1].as_map() {
            Some(MapOpResult::Entries(entries)) => match entries.first() {
                Some((entry_key, MapValue::BlockId(id))) if *entry_key < map_key => Ok(RouteOutcome::Found(*id)),
                _ => Ok(RouteOutcome::Found(HEAD_BLOCK_ID)),
            },
            _ => Ok(RouteOutcome::Found(HEAD_BLOCK_ID)),
        }
    }

    /// Updates `R(P)`'s entry for `block_id` to `new_min`, per spec.md
    /// §4.4 step 5 / §4.6's post-interpretation: `removeByValue(id)` then
    /// `put(new_min -> id)`. Idempotent -- safe to re-run on retry.
    pub(crate) async fn fixup_root_entry(&self, parent: &ParentKey, block_id: u64, new_min: crate::store::MapKey) -> Result<()> {
        let root_key = self.root_key(parent);
        self.store
            .operate(
                &root_key,
                vec![
                    RecordOp::Map {
                        bin: self.config.root_map_bin,
                        op: crate::store::MapOp::RemoveByValueRange { begin: MapValue::BlockId(block_id), end: MapValue::BlockId(block_id) },
                    },
                    RecordOp::Map {
                        bin: self.config.root_map_bin,
                        op: crate::store::MapOp::Put { key: new_min, value: MapValue::BlockId(block_id), create_only: false },
                    },
                ],
                false,
            )
            .await?;
        Ok(())
    }
}
