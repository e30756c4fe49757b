//! `subkeys-core` -- shared clock, digest, and key-layout primitives for the
//! external block-chain index in `subkeys-store`.
//!
//! - **Clock** ([`clock`]): `Clock`/`SystemClock` abstraction for TTL and
//!   lease-expiry arithmetic, with a `FixedClock` test double.
//! - **Digest** ([`digest`]): content-addressed digests for child data
//!   records.
//! - **Key** ([`key`]): `ParentKey`, `UserKey`, `RecordKey`, and the
//!   `KeyLayout` that derives the four record addresses spec.md §6 names.
//! - **Error** ([`error`]): `KeyError`, raised synchronously at key
//!   construction.

pub mod clock;
pub mod digest;
pub mod error;
pub mod key;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::FixedClock;
pub use digest::Digest;
pub use error::KeyError;
pub use key::{KeyLayout, ParentKey, RecordKey, UserKey};
