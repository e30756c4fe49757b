//! Configuration for the block-chain index, in the shape of the teacher's
//! `ServerConfig` (`service/config.rs`): a plain struct with a
//! hand-written `Default`, constructed by the embedding application (no
//! file/env parsing here -- spec.md §6 "no CLI, no wire protocol, no
//! environment variables").

/// Enumerated options from spec.md §6.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Namespace for `R(P)`. Empty means "same as P.namespace".
    pub root_map_namespace: String,
    /// Set name for `R(P)`. Empty means `P.set + "-meta"`.
    pub root_map_set: String,
    /// Bin holding the root map.
    pub root_map_bin: &'static str,
    /// Bin holding a block's main map.
    pub block_map_bin: &'static str,
    /// Bin holding a block's `next` pointer.
    pub block_map_next_bin: &'static str,
    /// Bin holding a block's `prev` pointer.
    pub block_map_prev_bin: &'static str,
    /// Bin used for the transient advisory lock entry.
    pub lock_bin: &'static str,
    /// Split threshold: a block splits once it holds more than this many
    /// entries.
    pub max_elements_per_block: u32,
    /// Whether to persist the primary key alongside the digest in child
    /// data records (`sendKey`, spec.md §6).
    pub send_key: bool,
    /// Lock lease duration in milliseconds (`maxLockTimeMs`, spec.md §6).
    pub max_lock_time_ms: u64,
    /// Sleep between lock-acquisition retries while a lease is still live
    /// (spec.md §4.1 "sleep `lockRetryMs` and retry").
    pub lock_retry_ms: u64,
    /// Deadline for lock acquisition before surfacing `LockTimeout`
    /// (spec.md §4.1 `timeoutMs`).
    pub lock_timeout_ms: u64,
    /// Bounded-retry budget for structural races (block creation,
    /// split-vs-split), spec.md §7 "internal retries ... bounded attempts
    /// (default 3)".
    pub max_structural_retries: u32,
    /// Sleep between structural-race retries (spec.md §7 "small sleep (5ms)").
    pub structural_retry_delay_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root_map_namespace: String::new(),
            root_map_set: String::new(),
            root_map_bin: "map",
            block_map_bin: "map",
            block_map_next_bin: "next",
            block_map_prev_bin: "prev",
            lock_bin: "lck",
            max_elements_per_block: 10_000,
            send_key: false,
            max_lock_time_ms: 100,
            lock_retry_ms: 5,
            lock_timeout_ms: 1_000,
            max_structural_retries: 3,
            structural_retry_delay_ms: 5,
        }
    }
}

impl IndexConfig {
    /// Validates options that must hold before any store round trip
    /// (spec.md §7 "ConfigurationError": `max <= 0`).
    pub fn validate(&self) -> Result<(), crate::error::IndexError> {
        if self.max_elements_per_block == 0 {
            return Err(crate::error::IndexError::configuration(
                "max_elements_per_block must be greater than 0",
            ));
        }
        Ok(())
    }
}
