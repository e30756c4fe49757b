//! Split algorithm (spec.md §4.5): crash-safe write order
//! create-second -> update-root -> shrink-first -> patch-next-prev.

use subkeys_core::ParentKey;

use crate::error::Result;
use crate::store::{MapKey, MapOp, MapOpResult, MapValue, RecordOp};

use super::BlockChainEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitOutcome {
    /// Another splitter already won the race; nothing to do.
    AlreadySplit,
    Split { new_block_id: u64 },
}

impl BlockChainEngine {
    /// Splits `block_id` if it is still over `maxElementsPerBlock` once the
    /// lock is held (another splitter may have already won the race).
    pub async fn split(&self, parent: &ParentKey, block_id: u64) -> Result<SplitOutcome> {
        let block_key = self.block_key(parent, block_id);
        let owner = self.call_owner();

        // Step 1: acquire the lock and read map/next/prev under it. The
        // lock stays held across (a)-(c); only released after (c).
        let read_ops = vec![
            RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::GetByIndexRange { index: 0, count: None } },
            RecordOp::GetString { bin: self.config.block_map_next_bin },
            RecordOp::GetString { bin: self.config.block_map_prev_bin },
        ];
        let results = self.locks.acquire(&block_key, &owner, read_ops).await?;

        let entries: Vec<(MapKey, MapValue)> = match results[0].as_map() {
            Some(MapOpResult::Entries(e)) => e.clone(),
            _ => Vec::new(),
        };
        let old_next = results[1].as_string().unwrap_or_default().to_string();

        // Step 2: recheck size; another splitter may have already won.
        if entries.len() as u32 <= self.config.max_elements_per_block {
            self.locks.release(&block_key, &owner).await?;
            return Ok(SplitOutcome::AlreadySplit);
        }

        // Step 3: split point and halves.
        let split_point = (entries.len() + 1) / 2;
        let first_half = entries[..split_point].to_vec();
        let second_half = entries[split_point..].to_vec();
        let new_min_key = second_half[0].0.clone();

        // Step 4: allocate the new block id.
        let new_id = self.ids.allocate(parent).await?;
        let new_block_key = self.block_key(parent, new_id);

        // Step 5(a): create B' with the second half, linked to oldNext/oldId.
        self.store
            .operate(
                &new_block_key,
                vec![
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::PutItems(second_half) },
                    RecordOp::SetString { bin: self.config.block_map_next_bin, value: old_next.clone() },
                    RecordOp::SetString { bin: self.config.block_map_prev_bin, value: block_id.to_string() },
                ],
                true,
            )
            .await?;

        // Step 5(b): publish the new block's minimum in R(P). From this
        // instant, routing for K >= new_min_key returns new_id.
        let root_key = self.root_key(parent);
        self.store
            .operate(
                &root_key,
                vec![RecordOp::Map {
                    bin: self.config.root_map_bin,
                    op: MapOp::Put { key: new_min_key, value: MapValue::BlockId(new_id), create_only: false },
                }],
                false,
            )
            .await?;

        // Step 5(c): shrink the old block to the first half, still under lock.
        self.store
            .operate(
                &block_key,
                vec![
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::Clear },
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::PutItems(first_half) },
                    RecordOp::SetString { bin: self.config.block_map_next_bin, value: new_id.to_string() },
                ],
                false,
            )
            .await?;

        self.locks.release(&block_key, &owner).await?;

        // Step 5(d): patch the successor's prev pointer, unlocked -- only a
        // split touches an existing block's back-pointer, and only one
        // splitter ever holds this block's lock at a time.
        if !old_next.is_empty() {
            if let Ok(next_id) = old_next.parse::<u64>() {
                let next_key = self.block_key(parent, next_id);
                self.store
                    .operate(
                        &next_key,
                        vec![RecordOp::SetString { bin: self.config.block_map_prev_bin, value: new_id.to_string() }],
                        false,
                    )
                    .await?;
            }
        }

        tracing::info!(
            namespace = %parent.namespace,
            set = %parent.set,
            old_block = block_id,
            new_block = new_id,
            first_half = first_half.len(),
            second_half = second_half.len(),
            "split block"
        );
        Ok(SplitOutcome::Split { new_block_id: new_id })
    }
}
