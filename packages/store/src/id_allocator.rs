//! Per-parent monotonic block-id allocator (spec.md §4.2): atomic
//! `add(+1)` on a dedicated counter record, `C(P)`.

use std::sync::Arc;

use subkeys_core::{KeyLayout, ParentKey};

use crate::error::Result;
use crate::store::{KvStore, RecordOp};

/// Block id 1 is reserved for the permanent head and is never handed out
/// by [`IdAllocator::allocate`] -- the head is created directly by the
/// engine's `initialize_blocks`, which also seeds `C(P)` to 1 so the
/// first real `allocate()` call returns 2 instead of colliding with the
/// head's own block id.
pub const HEAD_BLOCK_ID: u64 = 1;

const COUNTER_BIN: &str = "id";

pub struct IdAllocator {
    store: Arc<dyn KvStore>,
    layout: KeyLayout,
}

impl IdAllocator {
    pub fn new(store: Arc<dyn KvStore>, layout: KeyLayout) -> Self {
        Self { store, layout }
    }

    /// Returns the next block id for `parent`. Relies on `C(P)` having
    /// already been seeded to 1 by `initialize_blocks` when the head was
    /// created, so the first real call here returns 2, never colliding
    /// with [`HEAD_BLOCK_ID`].
    pub async fn allocate(&self, parent: &ParentKey) -> Result<u64> {
        let key = self.layout.id_counter_key(parent);
        let results = self.store.operate(&key, vec![RecordOp::AddInt { bin: COUNTER_BIN, delta: 1 }], false).await?;
        let value = results[0].as_int().expect("AddInt always returns IntValue");
        Ok(value as u64)
    }

    /// Seeds `C(P)` to `HEAD_BLOCK_ID` (spec.md §4.2: the counter starts
    /// at the head's own id so the next `add(+1)` skips past it). Called
    /// once, by `initialize_blocks`, when the head block is created.
    pub(crate) async fn seed(&self, parent: &ParentKey) -> Result<()> {
        let key = self.layout.id_counter_key(parent);
        self.store
            .operate(&key, vec![RecordOp::AddInt { bin: COUNTER_BIN, delta: HEAD_BLOCK_ID as i64 }], false)
            .await?;
        Ok(())
    }
}
