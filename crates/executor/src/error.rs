//! The wire-facing error type.
//!
//! `strata_engine`/`strata_core` return [`strata_core::StrataError`]
//! internally; this crate is the seam that turns those into something a
//! caller driving the wire protocol can match on without reaching into
//! the engine crate. Every variant still carries the same one-line
//! message (spec.md §7 "every error carries a code and a one-line
//! message").

use strata_core::StrataError;
use thiserror::Error;

/// Result alias used throughout this crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a caller driving [`crate::Strata`] can receive.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The referenced tensor/model/script does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Description of what was looked up.
        message: String,
    },
    /// The key exists but holds the wrong object kind.
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Expected kind.
        expected: String,
        /// Actual kind.
        actual: String,
    },
    /// Malformed caller input (includes tensor construction failures).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description.
        message: String,
    },
    /// DAG planning rejected the command before any op ran.
    #[error("DAG build error: {message}")]
    DagBuilder {
        /// Description.
        message: String,
    },
    /// A runtime error surfaced after planning succeeded.
    #[error("DAG run error: {message}")]
    DagRunError {
        /// Description.
        message: String,
    },
    /// No backend is available for the requested framework.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// Description.
        message: String,
    },
    /// A backend call failed (model/script create or run).
    #[error("backend call failed: {message}")]
    BackendCall {
        /// Description.
        message: String,
    },
    /// The database was opened read-only and a write was attempted
    /// (spec.md §6 "read-write" vs strata-security's `AccessMode`).
    #[error("database is open read-only")]
    ReadOnly,
    /// An engine invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl From<StrataError> for Error {
    fn from(err: StrataError) -> Self {
        match err {
            StrataError::NotFound { .. } | StrataError::BranchNotFound { .. } => Error::NotFound {
                message: err.reply_message(),
            },
            StrataError::WrongType { expected, actual } => Error::WrongType { expected, actual },
            StrataError::BadBlobLength { .. }
            | StrataError::BadStringBlob { .. }
            | StrataError::BadValue { .. }
            | StrataError::BadDType { .. }
            | StrataError::BadCommand { .. }
            | StrataError::BadArity { .. }
            | StrataError::InvalidInput { .. }
            | StrataError::InvalidOperation { .. }
            | StrataError::DimensionMismatch { .. }
            | StrataError::CrossSlot
            | StrataError::KeyMissing => Error::InvalidInput {
                message: err.reply_message(),
            },
            StrataError::DagBuilder { message } => Error::DagBuilder { message },
            StrataError::DagRunError { message } => Error::DagRunError { message },
            StrataError::TimedOut => Error::DagRunError {
                message: "timed out".to_string(),
            },
            StrataError::BackendNotLoaded { .. } | StrataError::UnsupportedBackend { .. } => {
                Error::BackendUnavailable {
                    message: err.reply_message(),
                }
            }
            StrataError::ModelCreate { .. }
            | StrataError::ModelRunFailed { .. }
            | StrataError::ModelSerialize { .. }
            | StrataError::ModelFree { .. }
            | StrataError::ScriptCreate { .. }
            | StrataError::ScriptRunFailed { .. }
            | StrataError::ScriptFree { .. } => Error::BackendCall {
                message: err.reply_message(),
            },
            other => Error::Internal {
                message: other.reply_message(),
            },
        }
    }
}
