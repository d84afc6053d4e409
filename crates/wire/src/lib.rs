//! Wire reply encoding for Strata: tensor payload framing and DAG reply
//! rendering (spec.md §6 "Replies" / "Persistence encoding").
//!
//! This crate only renders engine-level results (`strata_core::Tensor`,
//! `strata_engine::OpReply`/`DagOutcome`) into transport-ready shapes; it
//! has no opinion on the actual bytes-on-a-socket framing, which is out of
//! scope (spec.md §1 "command-line parsing plumbing... replication
//! emission" are external collaborators).

pub mod reply;
pub mod tensor_payload;

pub use reply::{render_dag_outcome, render_op_reply, Reply};
pub use tensor_payload::{decode_blob, render_blob, render_meta, render_values, TensorEncoding, TensorPayload};
