//! Top-level error type for the block-chain index, mirroring the
//! teacher's `OperationError`/`ClassifyError` shape in
//! `service/operation.rs`: structured variants plus an `#[from] anyhow`
//! catch-all, classified per spec.md §7.

use subkeys_core::KeyError;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors surfaced by the public facade (spec.md §7 "Error Handling Design").
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Unsupported `userKey` type, `maxElementsPerBlock <= 0`, or similar
    /// caller mistakes caught before any store round trip. Synchronous,
    /// non-retryable (spec.md §7 "ConfigurationError").
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Lock acquisition exhausted `timeoutMs` without success (spec.md §7
    /// "TransientLockContention" surfacing as TIMEOUT on exhaustion).
    #[error("lock acquisition timed out after {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    /// A bounded internal retry loop (block creation races, lock
    /// generation-check races) exceeded its attempt budget (spec.md §7
    /// "RaceRetryable").
    #[error("exceeded {attempts} retries: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    /// Any other adapter failure, propagated unchanged (spec.md §7
    /// "StoreError").
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Key construction failed (spec.md §6 "P.userKey must be a string or
    /// integer").
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Catch-all for adapter errors that don't need their own variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexError {
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        IndexError::Configuration(msg.into())
    }
}
