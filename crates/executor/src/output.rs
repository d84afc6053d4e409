//! Wire-ready results of driving [`crate::Strata`] (spec.md §6
//! "Replies").

use strata_engine::RunStatsSnapshot;
use strata_wire::{Reply, TensorPayload};

/// The result of one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// A command with nothing to report beyond success (`TensorSet`,
    /// `ModelStore`, `ScriptStore`).
    Unit,
    /// A single tensor (`TensorGet`).
    Tensor(TensorPayload),
    /// Per-op replies, in linear DAG order (`ModelExecute`,
    /// `ScriptExecute`, `DagExecute`, `DagExecute_RO`) — a one-shot
    /// execute is just a degenerate one-op DAG (spec.md §9 "single_op_dag").
    Replies(Vec<Reply>),
    /// Run counters for a model or script.
    Stats(RunStatsSnapshot),
}
