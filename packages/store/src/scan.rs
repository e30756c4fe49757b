//! Range-scan engine (spec.md §4.7): directional traversal across blocks
//! with continuation tokens and TTL-aware filtering.
//!
//! The spec's relative-range boundary arithmetic (§4.7 "Relative-range
//! semantics") is folded into one simplification here: rather than issuing
//! a separately-tuned `getByKeyRelativeIndexRange` per direction/bound
//! combination, each visited block's whole map is fetched in one
//! `get()` round trip and the boundary/direction/TTL predicate is applied
//! in Rust. `routeBlock`'s own relative-range op (spec.md §4.3) is still
//! used faithfully for routing -- this simplification is scoped to
//! scanning only, where it trades one extra op-shape per block for a
//! single, uniform, testable filter instead of four hand-tuned offset
//! formulas.

use std::collections::HashMap;

use subkeys_core::{ParentKey, RecordKey};

use crate::engine::{BlockChainEngine, RouteOutcome};
use crate::error::Result;
use crate::store::{MapKey, MapValue, SortKey};

/// One entry returned by a range scan.
#[derive(Debug, Clone)]
pub struct ScanEntry<K> {
    pub key: K,
    pub payload: HashMap<String, Vec<u8>>,
}

/// A page of scan results plus the token to resume from.
#[derive(Debug, Clone)]
pub struct ScanPage<K> {
    pub entries: Vec<ScanEntry<K>>,
    pub continuation: Continuation,
}

/// Opaque resume token: `{parentKey, lastBlockKey, lastReturnedKey, forwards}`
/// (spec.md GLOSSARY "Continuation").
#[derive(Debug, Clone)]
pub struct Continuation {
    parent: ParentKey,
    current_block_id: u64,
    last_returned_key: Option<MapKey>,
    forwards: bool,
    at_end: bool,
}

impl Continuation {
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.at_end
    }
}

impl BlockChainEngine {
    /// `GetRange(P, firstKey|nil, includeFirst, forwards, max)`.
    pub async fn get_range<K: SortKey>(
        &self,
        parent: &ParentKey,
        first_key: Option<&K>,
        include_first: bool,
        forwards: bool,
        max: u32,
        now_ms: i64,
    ) -> Result<ScanPage<K>> {
        let start_block = match first_key {
            None => self.chain_end_block(parent, forwards).await?,
            Some(k) => match self.route_block(parent, k).await? {
                RouteOutcome::New => None,
                RouteOutcome::Found(id) => Some(id),
            },
        };

        let Some(block_id) = start_block else {
            return Ok(ScanPage {
                entries: Vec::new(),
                continuation: Continuation { parent: parent.clone(), current_block_id: 0, last_returned_key: None, forwards, at_end: true },
            });
        };

        let boundary = first_key.map(SortKey::to_map_key);
        self.scan_from(parent, block_id, boundary, include_first, forwards, max, now_ms).await
    }

    /// `GetRange(continuation, max)`.
    pub async fn continue_range<K: SortKey>(&self, continuation: &Continuation, max: u32, now_ms: i64) -> Result<ScanPage<K>> {
        if continuation.at_end {
            return Ok(ScanPage { entries: Vec::new(), continuation: continuation.clone() });
        }
        self.scan_from(
            &continuation.parent,
            continuation.current_block_id,
            continuation.last_returned_key.clone(),
            false,
            continuation.forwards,
            max,
            now_ms,
        )
        .await
    }

    /// Picks the head (forwards) or tail (backwards) block of the chain
    /// when no `firstKey` is given (spec.md §4.7 step 1).
    async fn chain_end_block(&self, parent: &ParentKey, forwards: bool) -> Result<Option<u64>> {
        let root_key = self.root_key(parent);
        let Some(snapshot) = self.store.get(&root_key).await? else { return Ok(None) };
        let mut entries = snapshot.maps.get(self.config.root_map_bin).cloned().unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let chosen = if forwards { entries.first() } else { entries.last() };
        Ok(match chosen {
            Some((_, MapValue::BlockId(id))) => Some(*id),
            _ => None,
        })
    }

    async fn fetch_block(&self, parent: &ParentKey, block_id: u64) -> Result<Option<(Vec<(MapKey, MapValue)>, String, String)>> {
        let block_key = self.block_key(parent, block_id);
        let Some(snapshot) = self.store.get(&block_key).await? else { return Ok(None) };
        let mut entries = snapshot.maps.get(self.config.block_map_bin).cloned().unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let next = snapshot.strings.get(self.config.block_map_next_bin).cloned().unwrap_or_default();
        let prev = snapshot.strings.get(self.config.block_map_prev_bin).cloned().unwrap_or_default();
        Ok(Some((entries, next, prev)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_from<K: SortKey>(
        &self,
        parent: &ParentKey,
        mut block_id: u64,
        mut boundary: Option<MapKey>,
        mut include_boundary: bool,
        forwards: bool,
        max: u32,
        now_ms: i64,
    ) -> Result<ScanPage<K>> {
        let mut collected: Vec<(MapKey, MapValue)> = Vec::new();
        let mut last_block_id = block_id;
        let mut at_end = false;

        loop {
            let Some((entries, next, prev)) = self.fetch_block(parent, block_id).await? else {
                at_end = true;
                break;
            };
            last_block_id = block_id;

            let mut ordered = entries;
            if !forwards {
                ordered.reverse();
            }

            let filtered: Vec<(MapKey, MapValue)> = ordered
                .into_iter()
                .filter(|(key, _)| *key != MapKey::Max)
                .filter(|(key, _)| match &boundary {
                    None => true,
                    Some(b) => {
                        if forwards {
                            if include_boundary { key >= b } else { key > b }
                        } else if include_boundary {
                            key <= b
                        } else {
                            key < b
                        }
                    }
                })
                .filter(|(_, value)| match value {
                    MapValue::BlockEntry { expiry_epoch_ms, .. } => *expiry_epoch_ms > now_ms,
                    _ => true,
                })
                .collect();

            let remaining_needed = (max as usize).saturating_sub(collected.len());
            let take_n = filtered.len().min(remaining_needed);
            let exhausted_this_block = take_n == filtered.len();
            collected.extend(filtered.into_iter().take(take_n));

            if collected.len() as u32 >= max {
                if exhausted_this_block {
                    let hop = if forwards { &next } else { &prev };
                    at_end = hop.is_empty();
                }
                break;
            }

            let hop = if forwards { next } else { prev };
            if hop.is_empty() {
                at_end = true;
                break;
            }
            match hop.parse::<u64>() {
                Ok(id) => {
                    block_id = id;
                    boundary = None;
                    include_boundary = true;
                }
                Err(_) => {
                    at_end = true;
                    break;
                }
            }
        }

        let last_returned_key = collected.last().map(|(k, _)| k.clone());

        let data_keys: Vec<RecordKey> = collected.iter().map(|(k, _)| self.layout.data_key(parent, &k.to_key_string())).collect();
        let fetched = self.store.batch_get_payload(&data_keys).await?;

        let entries = collected
            .into_iter()
            .zip(fetched)
            .filter_map(|((map_key, _), (_, payload))| K::from_map_key(&map_key).map(|key| ScanEntry { key, payload: payload.unwrap_or_default() }))
            .collect();

        Ok(ScanPage {
            entries,
            continuation: Continuation { parent: parent.clone(), current_block_id: last_block_id, last_returned_key, forwards, at_end },
        })
    }
}
