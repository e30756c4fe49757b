//! Errors raised while constructing keys, before any store round-trip.
//!
//! Kept separate from `subkeys_store::error::IndexError` (which wraps
//! store-adapter failures) so this crate stays free of the `anyhow`
//! dependency a full store client would need.

use thiserror::Error;

/// Synchronous, non-retryable errors from key construction (spec.md §7
/// "ConfigurationError").
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("parent user key must not be an empty string")]
    EmptyUserKey,
}
