//! Insert algorithm (spec.md §4.4).

use std::collections::HashMap;
use std::time::Duration;

use subkeys_core::{Digest, ParentKey, RecordKey};

use crate::error::{IndexError, Result};
use crate::id_allocator::HEAD_BLOCK_ID;
use crate::store::{MapOp, MapOpResult, MapValue, RecordOp, SortKey};

use super::{BlockChainEngine, RouteOutcome};

impl BlockChainEngine {
    /// `Put(P, K, writePolicy, bins…)`.
    ///
    /// `expiry_epoch_ms` is the already-resolved TTL (`writePolicy.ttl <= 0`
    /// maps to `i64::MAX` at the facade, spec.md §4.4 step 1).
    ///
    /// `data_key` is where the payload bins (and, on delete, the record
    /// itself) live: the deterministic `data_key` for plain `Put`, or the
    /// caller's own record for `Put2Key` (spec.md §6 "alternate data
    /// record key").
    pub async fn put<K: SortKey>(
        &self,
        parent: &ParentKey,
        k: K,
        expiry_epoch_ms: i64,
        digest: &Digest,
        data_key: RecordKey,
        payload: HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        let block_data = MapValue::BlockEntry { expiry_epoch_ms, digest: digest.to_hex() };
        let map_key = k.to_map_key();

        let mut attempt = 0u32;
        let block_id = loop {
            match self.route_block(parent, &k).await? {
                RouteOutcome::New => {
                    if self.initialize_blocks(parent, map_key.clone(), block_data.clone()).await? {
                        self.write_payload(&data_key, expiry_epoch_ms, payload.clone()).await?;
                        return Ok(());
                    }
                    // KEY_EXISTS: another writer raced us to create the head; retry routing,
                    // bounded the same way the spec's other structural races are (§7
                    // "RaceRetryable": bounded attempts, small sleep).
                    attempt += 1;
                    if attempt > self.config.max_structural_retries {
                        return Err(IndexError::RetriesExhausted {
                            attempts: attempt,
                            reason: "head block creation kept losing the race".to_string(),
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.structural_retry_delay_ms)).await;
                }
                RouteOutcome::Found(id) => break id,
            }
        };

        let block_key = self.block_key(parent, block_id);
        let owner = self.call_owner();
        let results = self
            .locks
            .with_lock(
                &block_key,
                &owner,
                vec![
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::Size },
                    RecordOp::Map {
                        bin: self.config.block_map_bin,
                        op: MapOp::Put { key: map_key.clone(), value: block_data, create_only: false },
                    },
                    RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::GetByKeyIndex(map_key.clone()) },
                ],
            )
            .await?;

        let original_count = match results[0].as_map() {
            Some(MapOpResult::Count(c)) => *c,
            _ => 0,
        };
        let updated_count = match results[1].as_map() {
            Some(MapOpResult::Count(c)) => *c,
            _ => original_count,
        };
        let inserted_index = match results[2].as_map() {
            Some(MapOpResult::Index(Some(i))) => *i,
            _ => 0,
        };

        if original_count != updated_count && inserted_index == 0 && original_count > 0 {
            self.fixup_root_entry(parent, block_id, map_key.clone()).await?;
        }

        if updated_count > i64::from(self.config.max_elements_per_block) {
            self.split(parent, block_id).await?;
        }

        self.write_payload(&data_key, expiry_epoch_ms, payload).await?;
        Ok(())
    }

    /// `initializeBlocks(P, K, blockData)` (spec.md §4.4 step 3b). Returns
    /// `false` on `KEY_EXISTS` so the caller retries routing instead of
    /// treating the race as an error.
    async fn initialize_blocks(&self, parent: &ParentKey, k: crate::store::MapKey, block_data: MapValue) -> Result<bool> {
        let head_key = self.block_key(parent, HEAD_BLOCK_ID);
        let ops = vec![
            RecordOp::Map { bin: self.config.block_map_bin, op: MapOp::Put { key: k.clone(), value: block_data, create_only: false } },
            RecordOp::SetString { bin: self.config.block_map_next_bin, value: String::new() },
            RecordOp::SetString { bin: self.config.block_map_prev_bin, value: String::new() },
        ];
        match self.store.operate(&head_key, ops, true).await {
            Ok(_) => {}
            Err(crate::store::StoreError::KeyExists) => return Ok(false),
            Err(other) => return Err(other.into()),
        }

        // Seed C(P) to HEAD_BLOCK_ID so the first split's allocate() call
        // returns HEAD_BLOCK_ID + 1 instead of colliding with the head
        // block we just created.
        self.ids.seed(parent).await?;

        let root_key = self.root_key(parent);
        self.store
            .operate(
                &root_key,
                vec![RecordOp::Map {
                    bin: self.config.root_map_bin,
                    op: MapOp::Put { key: k, value: MapValue::BlockId(HEAD_BLOCK_ID), create_only: false },
                }],
                false,
            )
            .await?;
        Ok(true)
    }

    async fn write_payload(&self, data_key: &RecordKey, expiry_epoch_ms: i64, payload: HashMap<String, Vec<u8>>) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        self.store.put_payload(data_key, payload, expiry_epoch_ms).await?;
        Ok(())
    }
}
