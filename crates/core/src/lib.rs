//! Foundational types shared by every `strata-*` crate: the keyspace
//! addressing primitives (`BranchId`, `Key`, `TypeTag`), versioning
//! (`Version`, `Versioned`, `Timestamp`), the plain `Value` type, the
//! engine-wide error type (`StrataError`), and the tensor object (C1).

pub mod error;
pub mod tensor;
pub mod types;

pub use error::{StrataError, StrataResult};
pub use tensor::{DType, DlpackView, Scalar, Tensor};
pub use types::{BranchId, EntityRef, Key, Timestamp, TypeTag, Value, Version, Versioned};
