//! Content-addressed digests for child data records.
//!
//! The index never interprets child payloads; it only needs a stable,
//! collision-resistant identifier for "the record holding K's data" so a
//! block can store `[expiryEpochMs, digest]` instead of the payload
//! itself. `sha2` replaces the teacher's `hash::fnv1a_hash` here: FNV-1a
//! is a fast routing hash for Merkle bucket placement, not a digest
//! suitable for addressing records (it has no collision resistance).

use sha2::{Digest as _, Sha256};

/// A 32-byte content-addressed digest, hex-encoded for use as part of a
/// store record key or as the `digest` half of a block map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Computes the digest of an arbitrary byte string.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let out = hasher.finalize();
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&out);
        Self(buf)
    }

    /// Computes the digest of a parent/sort-key pair, used as the default
    /// data-record digest when the caller does not supply an alternate key
    /// (two-key mode, spec §3 "Child data records").
    #[must_use]
    pub fn of_pair(parent: &str, sort_key: &str) -> Self {
        let mut joined = String::with_capacity(parent.len() + sort_key.len() + 1);
        joined.push_str(parent);
        joined.push('\0');
        joined.push_str(sort_key);
        Self::of(joined.as_bytes())
    }

    /// Returns the lower-case hex encoding of the digest bytes.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Digest::of(b"hello"), Digest::of(b"hello"));
    }

    #[test]
    fn digest_distinguishes_inputs() {
        assert_ne!(Digest::of(b"hello"), Digest::of(b"world"));
    }

    #[test]
    fn of_pair_is_order_sensitive() {
        // "ab"/"c" and "a"/"bc" must not collide despite concatenating to
        // the same string without the separator byte.
        assert_ne!(Digest::of_pair("ab", "c"), Digest::of_pair("a", "bc"));
    }

    #[test]
    fn hex_round_trips_length() {
        let d = Digest::of(b"some payload");
        assert_eq!(d.to_hex().len(), 64);
    }
}
