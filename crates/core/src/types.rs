//! Foundational keyspace types shared by every Strata crate.
//!
//! `BranchId` scopes the whole keyspace (tensors, models, scripts, and plain
//! KV entries alike) the way `strata-engine`'s graph module scopes graph
//! keys; `Key`/`TypeTag` give every stored object a typed identity so a
//! lookup can report `WrongType` instead of silently returning garbage.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies an isolated branch of the keyspace.
///
/// All keyspace objects — tensors, models, scripts, and plain KV entries —
/// are partitioned by `BranchId`. The default branch always exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(Uuid);

impl BranchId {
    /// The branch every database starts with.
    pub fn default_branch() -> Self {
        BranchId(Uuid::nil())
    }

    /// Generate a new random branch id.
    pub fn new() -> Self {
        BranchId(Uuid::new_v4())
    }

    /// Build a branch id from its raw 16 bytes (used in tests and codecs).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        BranchId(Uuid::from_bytes(bytes))
    }

    /// The raw 16 bytes backing this id.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// True if this is the default branch.
    pub fn is_default(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::default_branch()
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "default")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Distinguishes the kind of object a `Key` addresses.
///
/// Every keyspace object is stored under a single key with one of these
/// tags attached; a lookup that finds the key but the wrong tag fails with
/// `StrataError::WrongType` rather than a silent type-pun (spec.md §6
/// "Object keys in the keyspace").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Plain key/value entry.
    Kv,
    /// A `Tensor` object (C1).
    Tensor,
    /// A `Model` object (C4).
    Model,
    /// A `Script` object (C4).
    Script,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeTag::Kv => "kv",
            TypeTag::Tensor => "tensor",
            TypeTag::Model => "model",
            TypeTag::Script => "script",
        };
        write!(f, "{s}")
    }
}

/// A fully-qualified storage key: a branch, a user-supplied name, and the
/// type tag of whatever is stored there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Branch this key lives on.
    pub branch_id: BranchId,
    /// The user-supplied key name.
    pub name: String,
    /// What kind of object this key addresses.
    pub type_tag: TypeTag,
}

impl Key {
    /// Build a new key.
    pub fn new(branch_id: BranchId, name: impl Into<String>, type_tag: TypeTag) -> Self {
        Key {
            branch_id,
            name: name.into(),
            type_tag,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.branch_id, self.type_tag, self.name)
    }
}

/// A monotonic version stamp for a stored value.
///
/// Mirrors the three version domains the executor's `convert.rs` already
/// switches on (`Txn`, `Sequence`, `Counter`); the inference engine uses
/// `Sequence` for tensor/model/script writes (each PUT advances the
/// sequence for that key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    /// Transaction-counter based version.
    Txn(u64),
    /// Monotonic per-key sequence number.
    Sequence(u64),
    /// Simple incrementing counter (used for branch/run metadata).
    Counter(u64),
}

impl Version {
    /// The numeric value regardless of which domain it came from.
    pub fn value(&self) -> u64 {
        match self {
            Version::Txn(n) | Version::Sequence(n) | Version::Counter(n) => *n,
        }
    }
}

/// A microsecond-resolution timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The current wall-clock time.
    pub fn now() -> Self {
        let micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
        Timestamp(micros)
    }

    /// Build a timestamp from a millisecond count.
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }

    /// Build a timestamp from a microsecond count.
    pub fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// This timestamp as microseconds since the epoch.
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// This timestamp as milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    /// Elapsed time since this timestamp, in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        Timestamp::now().as_millis().saturating_sub(self.as_millis())
    }
}

/// A value paired with the version and timestamp it was written at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The stored value.
    pub value: T,
    /// The version this value was written at.
    pub version: Version,
    /// When this value was written.
    pub timestamp: Timestamp,
}

/// A plain scalar value for the generic KV primitive.
///
/// Tensors are not modeled as a `Value` variant: they carry reference
/// counted, backend-visible state that the byte-oriented KV path isn't
/// shaped for, so they're addressed through `strata_engine`'s dedicated
/// tensor store instead (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// JSON null / absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Identifies the entity an error refers to, for `StrataError::NotFound`
/// and friends. Extended with `Tensor`/`Model`/`Script` variants for the
/// inference engine, alongside the pre-existing KV/branch variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityRef {
    /// A plain KV entry.
    Kv {
        /// Branch the key lives on.
        branch_id: BranchId,
        /// The key name.
        key: String,
    },
    /// A branch.
    Branch {
        /// The branch id.
        branch_id: BranchId,
    },
    /// A tensor object (C1).
    Tensor {
        /// Branch the tensor lives on.
        branch_id: BranchId,
        /// The tensor's key name.
        key: String,
    },
    /// A model object (C4).
    Model {
        /// Branch the model lives on.
        branch_id: BranchId,
        /// The model's key name.
        key: String,
    },
    /// A script object (C4).
    Script {
        /// Branch the script lives on.
        branch_id: BranchId,
        /// The script's key name.
        key: String,
    },
}

impl EntityRef {
    /// Build a KV entity reference.
    pub fn kv(branch_id: BranchId, key: impl Into<String>) -> Self {
        EntityRef::Kv {
            branch_id,
            key: key.into(),
        }
    }

    /// Build a branch entity reference.
    pub fn branch(branch_id: BranchId) -> Self {
        EntityRef::Branch { branch_id }
    }

    /// Build a tensor entity reference.
    pub fn tensor(branch_id: BranchId, key: impl Into<String>) -> Self {
        EntityRef::Tensor {
            branch_id,
            key: key.into(),
        }
    }

    /// Build a model entity reference.
    pub fn model(branch_id: BranchId, key: impl Into<String>) -> Self {
        EntityRef::Model {
            branch_id,
            key: key.into(),
        }
    }

    /// Build a script entity reference.
    pub fn script(branch_id: BranchId, key: impl Into<String>) -> Self {
        EntityRef::Script {
            branch_id,
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Kv { branch_id, key } => write!(f, "kv:{branch_id}:{key}"),
            EntityRef::Branch { branch_id } => write!(f, "branch:{branch_id}"),
            EntityRef::Tensor { branch_id, key } => write!(f, "tensor:{branch_id}:{key}"),
            EntityRef::Model { branch_id, key } => write!(f, "model:{branch_id}:{key}"),
            EntityRef::Script { branch_id, key } => write!(f, "script:{branch_id}:{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_branch_is_nil() {
        assert!(BranchId::default_branch().is_default());
        assert_eq!(BranchId::default_branch().to_string(), "default");
    }

    #[test]
    fn branch_ids_are_unique() {
        assert_ne!(BranchId::new(), BranchId::new());
    }

    #[test]
    fn key_display_includes_tag() {
        let key = Key::new(BranchId::default_branch(), "mymodel", TypeTag::Model);
        assert_eq!(key.to_string(), "default:model:mymodel");
    }

    #[test]
    fn timestamp_millis_roundtrip() {
        let ts = Timestamp::from_millis(1_700_000_000_000);
        assert_eq!(ts.as_millis(), 1_700_000_000_000);
        assert_eq!(ts.as_micros(), 1_700_000_000_000_000);
    }

    #[test]
    fn entity_ref_display() {
        let b = BranchId::default_branch();
        assert_eq!(EntityRef::tensor(b, "a").to_string(), "tensor:default:a");
        assert_eq!(EntityRef::model(b, "m").to_string(), "model:default:m");
    }
}
