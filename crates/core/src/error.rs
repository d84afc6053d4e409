//! The engine-wide error type.
//!
//! `StrataError` is what every internal crate (`strata-storage`,
//! `strata-engine`, `strata-intelligence`, …) returns; `strata-executor`
//! converts it to its own wire-facing `Error` in `convert.rs`. Every
//! variant carries a one-line message suitable for a protocol reply.

use crate::types::{BranchId, EntityRef, Version};
use thiserror::Error;

/// Result alias used throughout the engine.
pub type StrataResult<T> = Result<T, StrataError>;

/// The engine-wide error type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrataError {
    // -- keyspace lookup --------------------------------------------------
    /// The referenced entity does not exist.
    #[error("not found: {entity_ref}")]
    NotFound {
        /// What was looked up.
        entity_ref: EntityRef,
    },
    /// The referenced branch does not exist.
    #[error("branch not found: {branch_id}")]
    BranchNotFound {
        /// The missing branch.
        branch_id: BranchId,
    },
    /// The key exists but holds a value of a different type.
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// The type the caller expected.
        expected: String,
        /// The type actually stored.
        actual: String,
    },
    /// A DAG `PERSIST` key hashes to a different shard than the local one.
    #[error("key does not belong to the local shard")]
    CrossSlot,

    // -- transactional ------------------------------------------------------
    /// Generic optimistic-concurrency conflict.
    #[error("conflict: {reason}")]
    Conflict {
        /// Human-readable reason.
        reason: String,
        /// The entity involved, if known.
        entity_ref: Option<EntityRef>,
    },
    /// A version precondition (CAS) failed.
    #[error("version conflict: expected {expected:?}, actual {actual:?}")]
    VersionConflict {
        /// The entity involved.
        entity_ref: EntityRef,
        /// Version the caller expected.
        expected: Version,
        /// Version actually stored.
        actual: Version,
    },
    /// write-write conflict under optimistic concurrency control.
    #[error("write conflict on {entity_ref}")]
    WriteConflict {
        /// The entity involved.
        entity_ref: EntityRef,
    },
    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Why it was aborted.
        reason: String,
    },
    /// The transaction exceeded its deadline.
    #[error("transaction timeout after {duration_ms}ms")]
    TransactionTimeout {
        /// How long the transaction ran before being cut off.
        duration_ms: u64,
    },
    /// An operation was attempted outside of an active transaction.
    #[error("no active transaction")]
    TransactionNotActive,

    // -- validation ---------------------------------------------------------
    /// The requested operation isn't valid in the current state.
    #[error("invalid operation on {entity_ref}: {reason}")]
    InvalidOperation {
        /// The entity involved.
        entity_ref: EntityRef,
        /// Why the operation is invalid.
        reason: String,
    },
    /// Malformed caller input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of what was wrong.
        message: String,
    },
    /// A shape/dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        got: usize,
    },
    /// A configured capacity was exceeded.
    #[error("capacity exceeded for {resource}: limit {limit}, requested {requested}")]
    CapacityExceeded {
        /// Which resource.
        resource: String,
        /// The configured limit.
        limit: u64,
        /// What was requested.
        requested: u64,
    },
    /// A soft budget was exceeded.
    #[error("budget exceeded for operation: {operation}")]
    BudgetExceeded {
        /// The operation whose budget was exceeded.
        operation: String,
    },
    /// A JSON/graph path wasn't found.
    #[error("path '{path}' not found in {entity_ref}")]
    PathNotFound {
        /// The entity searched.
        entity_ref: EntityRef,
        /// The path that was missing.
        path: String,
    },
    /// The requested history has already been trimmed.
    #[error("history trimmed: requested {requested:?}, earliest retained {earliest_retained:?}")]
    HistoryTrimmed {
        /// The entity involved.
        entity_ref: EntityRef,
        /// What was requested.
        requested: Version,
        /// The earliest version still retained.
        earliest_retained: Version,
    },

    // -- system ---------------------------------------------------------------
    /// A storage-layer I/O failure.
    #[error("storage error: {message}")]
    Storage {
        /// Description.
        message: String,
        /// Optional nested cause, rendered into `message` by callers.
        source: Option<String>,
    },
    /// A (de)serialization failure.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description.
        message: String,
    },
    /// On-disk data failed an integrity check.
    #[error("data corruption: {message}")]
    Corruption {
        /// Description.
        message: String,
    },
    /// An invariant was violated; this indicates an engine bug.
    #[error("internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },

    // -- tensor construction (C1, spec.md §4.1) ------------------------------
    /// A tensor blob's byte length disagrees with its declared shape/dtype.
    #[error("bad blob length: expected {expected} bytes, got {actual}")]
    BadBlobLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// A string tensor's blob is not a valid sequence of null-terminated
    /// strings, or its terminator count disagrees with the declared shape.
    #[error("bad string blob: {reason}")]
    BadStringBlob {
        /// Why the blob is invalid.
        reason: String,
    },
    /// A parsed scalar does not fit the target dtype.
    #[error("bad value '{value}' for dtype {dtype}")]
    BadValue {
        /// The offending literal.
        value: String,
        /// The dtype it was parsed against.
        dtype: String,
    },
    /// An unrecognized dtype string.
    #[error("bad dtype: {dtype}")]
    BadDType {
        /// The unrecognized dtype string.
        dtype: String,
    },

    // -- command parsing (C8, spec.md §4.3) ----------------------------------
    /// The wire command is structurally invalid.
    #[error("bad command: {message}")]
    BadCommand {
        /// Description.
        message: String,
    },
    /// A command was given the wrong number of arguments.
    #[error("wrong number of arguments for '{command}'")]
    BadArity {
        /// The command whose arity was wrong.
        command: String,
    },
    /// A DAG input name is missing from the keyspace and has no earlier
    /// producer in the DAG.
    #[error("INPUT key cannot be found in DAG")]
    KeyMissing,
    /// DAG planning failed (duplicate PERSIST, read-only DAG with PERSIST
    /// or ScriptRun, empty DAG, …).
    #[error("DAG build error: {message}")]
    DagBuilder {
        /// Description.
        message: String,
    },
    /// A runtime error after planning succeeded (persist failure, a slot
    /// that planning couldn't validate turning out to be empty, …).
    #[error("DAG run error: {message}")]
    DagRunError {
        /// Description.
        message: String,
    },
    /// The finish/completion context was asked for the wrong op kind
    /// (e.g. a model-run accessor called on a script-run context).
    #[error("finish context misuse: {message}")]
    FinishCtx {
        /// Description.
        message: String,
    },

    // -- backend capability table (C3, spec.md §4.2) -------------------------
    /// No backend is registered for the requested framework, and lazy
    /// loading did not find a shared library for it either.
    #[error("backend not loaded: {backend}")]
    BackendNotLoaded {
        /// The backend identifier (e.g. "TORCH", "ONNX").
        backend: String,
    },
    /// The requested backend identifier isn't one of the supported kinds.
    #[error("unsupported backend: {backend}")]
    UnsupportedBackend {
        /// The unrecognized backend identifier.
        backend: String,
    },
    /// A model failed to construct from its serialized definition.
    #[error("model create failed: {message}")]
    ModelCreate {
        /// Description.
        message: String,
    },
    /// A model run failed.
    #[error("model run failed: {message}")]
    ModelRunFailed {
        /// Description.
        message: String,
    },
    /// A model failed to serialize back to bytes.
    #[error("model serialize failed: {message}")]
    ModelSerialize {
        /// Description.
        message: String,
    },
    /// A backend failed to free a model handle.
    #[error("model free failed: {message}")]
    ModelFree {
        /// Description.
        message: String,
    },
    /// A script failed to construct/compile.
    #[error("script create failed: {message}")]
    ScriptCreate {
        /// Description.
        message: String,
    },
    /// A script run failed.
    #[error("script run failed: {message}")]
    ScriptRunFailed {
        /// Description.
        message: String,
    },
    /// A backend failed to free a script handle.
    #[error("script free failed: {message}")]
    ScriptFree {
        /// Description.
        message: String,
    },

    /// The DAG or operation exceeded its wall-clock deadline.
    #[error("timed out")]
    TimedOut,
}

impl StrataError {
    /// `NotFound` constructor.
    pub fn not_found(entity_ref: EntityRef) -> Self {
        StrataError::NotFound { entity_ref }
    }

    /// `BranchNotFound` constructor.
    pub fn branch_not_found(branch_id: BranchId) -> Self {
        StrataError::BranchNotFound { branch_id }
    }

    /// `WrongType` constructor.
    pub fn wrong_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        StrataError::WrongType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// `VersionConflict` constructor.
    pub fn version_conflict(entity_ref: EntityRef, expected: Version, actual: Version) -> Self {
        StrataError::VersionConflict {
            entity_ref,
            expected,
            actual,
        }
    }

    /// `InvalidOperation` constructor.
    pub fn invalid_operation(entity_ref: EntityRef, reason: impl Into<String>) -> Self {
        StrataError::InvalidOperation {
            entity_ref,
            reason: reason.into(),
        }
    }

    /// `InvalidInput` constructor.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StrataError::InvalidInput {
            message: message.into(),
        }
    }

    /// `DimensionMismatch` constructor.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        StrataError::DimensionMismatch { expected, got }
    }

    /// `Internal` constructor.
    pub fn internal(message: impl Into<String>) -> Self {
        StrataError::Internal {
            message: message.into(),
        }
    }

    /// `Serialization` constructor.
    pub fn serialization(message: impl Into<String>) -> Self {
        StrataError::Serialization {
            message: message.into(),
        }
    }

    /// `DagBuilder` constructor.
    pub fn dag_builder(message: impl Into<String>) -> Self {
        StrataError::DagBuilder {
            message: message.into(),
        }
    }

    /// `DagRunError` constructor.
    pub fn dag_run(message: impl Into<String>) -> Self {
        StrataError::DagRunError {
            message: message.into(),
        }
    }

    /// `BadCommand` constructor.
    pub fn bad_command(message: impl Into<String>) -> Self {
        StrataError::BadCommand {
            message: message.into(),
        }
    }

    /// `BadArity` constructor.
    pub fn bad_arity(command: impl Into<String>) -> Self {
        StrataError::BadArity {
            command: command.into(),
        }
    }

    /// A one-line message suitable for a protocol reply (identical to the
    /// `Display` impl, named explicitly for call sites that build a reply
    /// string — matches spec.md §7 "every error carries ... a one-line
    /// message (for protocol reply)").
    pub fn reply_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BranchId;

    #[test]
    fn not_found_message_contains_entity() {
        let err = StrataError::not_found(EntityRef::tensor(BranchId::default_branch(), "a"));
        assert!(err.reply_message().contains("tensor"));
        assert!(err.reply_message().contains("a"));
    }

    #[test]
    fn key_missing_matches_spec_wording() {
        assert_eq!(
            StrataError::KeyMissing.reply_message(),
            "INPUT key cannot be found in DAG"
        );
    }

    #[test]
    fn wrong_type_roundtrip() {
        let err = StrataError::wrong_type("Tensor", "Model");
        match err {
            StrataError::WrongType { expected, actual } => {
                assert_eq!(expected, "Tensor");
                assert_eq!(actual, "Model");
            }
            _ => panic!("expected WrongType"),
        }
    }
}
