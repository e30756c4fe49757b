//! Delete algorithm and empty-block removal (spec.md §4.6).

use subkeys_core::ParentKey;

use crate::error::Result;
use crate::id_allocator::HEAD_BLOCK_ID;
use crate::store::{MapKey, MapOp, MapOpResult, MapValue, RecordOp, SortKey};

use super::{BlockChainEngine, RouteOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// No such K in this chain; matches spec.md §7 "StructuralMiss" (not
    /// an error -- returned as `false`).
    Absent,
    Deleted,
}

impl BlockChainEngine {
    /// `Delete(P, K, writePolicy) -> bool`.
    pub async fn delete<K: SortKey>(&self, parent: &ParentKey, k: &K) -> Result<DeleteOutcome> {
        let block_id = match self.route_block(parent, k).await? {
            RouteOutcome::New => return Ok(DeleteOutcome::Absent),
            RouteOutcome::Found(id) => id,
        };

        let block_key = self.block_key(parent, block_id);
        let owner = self.call_owner();
        let map_key = k.to_map_key();

        // The MAX sentinel guarantees the map is never momentarily empty
        // while the last real element is being removed.
        let results = self
            .locks
            .with_lock(
                &block_key,
                &owner,
                vec![
                    RecordOp::Map {
                        bin: self.config.block_map_bin,
                        op: MapOp::Put {
                            key: MapKey::Max,
                            value: MapValue::BlockEntry { expiry_epoch_ms: i64::MAX, digest: String::new() },
                            create_only: false,
                        },
                    },
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::RemoveByKey(map_key.clone()) },
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::GetByIndex(0) },
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::RemoveByKey(MapKey::Max) },
                ],
            )
            .await?;

        let removed_index = match results[1].as_map() {
            Some(MapOpResult::Index(Some(i))) => *i,
            _ => -1,
        };
        if removed_index == -1 {
            return Ok(DeleteOutcome::Absent);
        }

        let post_min_key = match results[2].as_map() {
            Some(MapOpResult::Entry(Some((key, _)))) => key.clone(),
            _ => MapKey::Max,
        };

        if post_min_key == MapKey::Max {
            self.remove_empty_block(parent, block_id).await?;
        } else if removed_index == 0 {
            self.fixup_root_entry(parent, block_id, post_min_key).await?;
        }

        let data_key = self.layout.data_key(parent, &map_key.to_key_string());
        self.store.delete(&data_key).await?;

        Ok(DeleteOutcome::Deleted)
    }

    /// Unlinks and deletes an empty, non-head block (spec.md §4.6
    /// `removeEmptyBlock`).
    pub(crate) async fn remove_empty_block(&self, parent: &ParentKey, block_id: u64) -> Result<()> {
        if block_id == HEAD_BLOCK_ID {
            // Policy: never remove the head -- it stays as a left sentinel.
            return Ok(());
        }

        let block_key = self.block_key(parent, block_id);
        let owner = self.call_owner();

        let results = self
            .locks
            .acquire(
                &block_key,
                &owner,
                vec![
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::Size },
                    RecordOp::GetString { bin: self.config.block_map_next_bin },
                    RecordOp::GetString { bin: self.config.block_map_prev_bin },
                ],
            )
            .await?;

        let size = match results[0].as_map() {
            Some(MapOpResult::Count(c)) => *c,
            _ => 0,
        };
        if size > 0 {
            // Race: something re-populated this block since the delete
            // that triggered us. Leave it alone.
            self.locks.release(&block_key, &owner).await?;
            return Ok(());
        }

        let next = results[1].as_string().unwrap_or_default().to_string();
        let prev = results[2].as_string().unwrap_or_default().to_string();
        let prev_id = prev.parse::<u64>().ok();
        let next_id = next.parse::<u64>().ok();

        // Lock neighbors in ascending id order to avoid deadlocking with a
        // concurrent removeEmptyBlock on the other neighbor.
        let mut neighbor_ids: Vec<u64> = [prev_id, next_id].into_iter().flatten().collect();
        neighbor_ids.sort_unstable();
        neighbor_ids.dedup();

        for neighbor_id in neighbor_ids {
            let neighbor_key = self.block_key(parent, neighbor_id);
            let neighbor_owner = self.call_owner();
            let mut ops = Vec::new();
            if Some(neighbor_id) == prev_id {
                ops.push(RecordOp::SetString { bin: self.config.block_map_next_bin, value: next.clone() });
            }
            if Some(neighbor_id) == next_id {
                ops.push(RecordOp::SetString { bin: self.config.block_map_prev_bin, value: prev.clone() });
            }
            self.locks.with_lock(&neighbor_key, &neighbor_owner, ops).await?;
        }

        let root_key = self.root_key(parent);
        self.store
            .operate(
                &root_key,
                vec![RecordOp::Map {
                    bin: self.config.root_map_bin,
                    op: MapOp::RemoveByValueRange { begin: MapValue::BlockId(block_id), end: MapValue::BlockId(block_id) },
                }],
                false,
            )
            .await?;

        self.locks.release(&block_key, &owner).await?;
        self.store.delete(&block_key).await?;
        tracing::info!(namespace = %parent.namespace, set = %parent.set, block_id, "removed empty block");
        Ok(())
    }
}
