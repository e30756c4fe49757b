//! Key layout helpers: parent keys, user-key validation, and the
//! namespace/set/key triples used to address the four record kinds
//! spec.md §6 defines (data, block, id-counter, root).

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::KeyError;

/// The caller-supplied primary key value. Spec.md §6 restricts this to a
/// string or integer; anything else is a `ConfigurationError` at the
/// caller's API boundary, not a store round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserKey {
    Str(String),
    Int(i64),
}

impl UserKey {
    /// Renders the user key the way it appears inside derived record keys
    /// (`str(P.userKey)` in spec.md §6).
    #[must_use]
    pub fn to_key_string(&self) -> String {
        match self {
            UserKey::Str(s) => s.clone(),
            UserKey::Int(i) => i.to_string(),
        }
    }
}

impl From<String> for UserKey {
    fn from(s: String) -> Self {
        UserKey::Str(s)
    }
}

impl From<&str> for UserKey {
    fn from(s: &str) -> Self {
        UserKey::Str(s.to_string())
    }
}

impl From<i64> for UserKey {
    fn from(i: i64) -> Self {
        UserKey::Int(i)
    }
}

/// A host-store record address: namespace, set, and key string. Every
/// record this crate touches (data, block, id-counter, root) is resolved
/// to one of these before it is handed to the store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub namespace: String,
    pub set: String,
    pub key: String,
}

impl RecordKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, set: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            key: key.into(),
        }
    }
}

/// A parent key P: the host-store location that anchors an index, plus the
/// namespace/set it lives in. The caller's own payload at this key is
/// opaque to the index (spec.md §3 "Ownership").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentKey {
    pub namespace: String,
    pub set: String,
    pub user_key: UserKey,
}

impl ParentKey {
    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        user_key: impl Into<UserKey>,
    ) -> Result<Self, KeyError> {
        let parent = Self {
            namespace: namespace.into(),
            set: set.into(),
            user_key: user_key.into(),
        };
        parent.validate()?;
        Ok(parent)
    }

    fn validate(&self) -> Result<(), KeyError> {
        match &self.user_key {
            UserKey::Str(s) if s.is_empty() => Err(KeyError::EmptyUserKey),
            _ => Ok(()),
        }
    }

    /// Digest of this parent key, used as the id-counter and root record
    /// key component (spec.md §6).
    #[must_use]
    pub fn digest(&self) -> Digest {
        let joined = format!("{}/{}/{}", self.namespace, self.set, self.user_key.to_key_string());
        Digest::of(joined.as_bytes())
    }
}

/// Resolves the four derived record addresses for a parent key, following
/// spec.md §6's persisted key layout exactly.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    /// Namespace for `R(P)`; empty means "same as P.namespace".
    pub root_namespace: String,
    /// Set for `R(P)`; empty means `P.set + "-meta"`.
    pub root_set: String,
}

impl KeyLayout {
    #[must_use]
    pub fn data_key(&self, parent: &ParentKey, sort_key: &str) -> RecordKey {
        RecordKey::new(
            parent.namespace.clone(),
            format!("{}-subkeys", parent.set),
            format!("{}-{}", parent.user_key.to_key_string(), sort_key),
        )
    }

    #[must_use]
    pub fn block_key(&self, parent: &ParentKey, block_id: u64) -> RecordKey {
        RecordKey::new(
            parent.namespace.clone(),
            format!("{}-meta", parent.set),
            format!("{}-{}", parent.user_key.to_key_string(), block_id),
        )
    }

    #[must_use]
    pub fn id_counter_key(&self, parent: &ParentKey) -> RecordKey {
        RecordKey::new(
            parent.namespace.clone(),
            format!("{}-meta", parent.set),
            parent.digest().to_hex(),
        )
    }

    #[must_use]
    pub fn root_key(&self, parent: &ParentKey) -> RecordKey {
        let namespace = if self.root_namespace.is_empty() {
            parent.namespace.clone()
        } else {
            self.root_namespace.clone()
        };
        let set = if self.root_set.is_empty() {
            format!("{}-meta", parent.set)
        } else {
            self.root_set.clone()
        };
        RecordKey::new(namespace, set, parent.digest().to_hex())
    }
}
