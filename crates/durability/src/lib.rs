//! On-disk durability primitives for Strata: the durability mode a branch
//! opens with (spec.md §5) and the versioned record encoding persisted
//! tensors, models, and scripts use (spec.md §6).
//!
//! This crate depends only on `strata-core` — `strata-engine`'s own
//! `Model`/`Script` types convert to and from the [`codec::ModelRecord`] /
//! [`codec::ScriptRecord`] DTOs defined here, rather than the other way
//! round, since the dependency only ever goes `engine -> durability`.

pub mod codec;
pub mod durability_mode;

pub use codec::{
    decode_model, decode_script, decode_tensor, encode_model, encode_script, encode_tensor,
    ModelRecord, ScriptRecord, CURRENT_VERSION,
};
pub use durability_mode::DurabilityMode;
