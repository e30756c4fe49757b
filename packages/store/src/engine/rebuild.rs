//! `RebuildRoot` (spec.md §4.8): walks the chain from block 1, regenerates
//! `R(P)` from scratch, and repairs `prev` pointers. Not safe under
//! concurrent writers -- no locks are taken.

use subkeys_core::ParentKey;

use crate::error::Result;
use crate::id_allocator::HEAD_BLOCK_ID;
use crate::store::{MapKey, MapOp, MapValue, RecordOp};

use super::BlockChainEngine;

impl BlockChainEngine {
    pub async fn rebuild_root(&self, parent: &ParentKey) -> Result<()> {
        let mut current_id = HEAD_BLOCK_ID;
        let mut prev_id: Option<u64> = None;
        let mut new_entries: Vec<(MapKey, MapValue)> = Vec::new();

        loop {
            let block_key = self.block_key(parent, current_id);
            let Some(snapshot) = self.store.get(&block_key).await? else { break };

            let map = snapshot.maps.get(self.config.block_map_bin).cloned().unwrap_or_default();
            if let Some((min_key, _)) = map.first() {
                new_entries.push((min_key.clone(), MapValue::BlockId(current_id)));
            }

            let expected_prev = prev_id.map(|id| id.to_string()).unwrap_or_default();
            let actual_prev = snapshot.strings.get(self.config.block_map_prev_bin).cloned().unwrap_or_default();
            if actual_prev != expected_prev {
                self.store
                    .operate(
                        &block_key,
                        vec![RecordOp::SetString { bin: self.config.block_map_prev_bin, value: expected_prev }],
                        false,
                    )
                    .await?;
            }

            let next = snapshot.strings.get(self.config.block_map_next_bin).cloned().unwrap_or_default();
            prev_id = Some(current_id);
            match next.parse::<u64>() {
                Ok(next_id) => current_id = next_id,
                Err(_) => break,
            }
        }

        if new_entries.is_empty() && prev_id.is_none() {
            // The head itself has never been created: nothing to rebuild.
            return Ok(());
        }

        let root_key = self.root_key(parent);
        self.store
            .operate(
                &root_key,
                vec![
                    RecordOp::Map { bin: self.config.root_map_bin, op: MapOp::Clear },
                    RecordOp::Map { bin: self.config.root_map_bin, op: MapOp::PutItems(new_entries) },
                ],
                false,
            )
            .await?;
        Ok(())
    }
}
