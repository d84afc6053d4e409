//! DAG operation nodes (C6, spec.md §3 "Op").
//!
//! An explicit sum type over the four allowed op kinds (spec.md §9
//! redesign note), rather than a tagged, type-punned variant. Each op
//! carries its symbolic names (for diagnostics), the slot indices
//! name-resolution fills in at planning time, its resolved device, and
//! a result slot the worker stamps on completion.

use crate::context::ScriptArg;
use crate::model::Model;
use crate::script::Script;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::StrataError;

/// Op-kind-specific data resolved at planning time.
#[derive(Debug, Clone)]
pub enum DagOpKind {
    /// Already fully resolved at planning: the output slot is populated
    /// with the supplied tensor before the worker ever sees this op.
    TensorSet,
    /// Reads a slot; produces reply data at completion time.
    TensorGet,
    /// Invokes a model's backend.
    ModelRun {
        /// The resolved model object.
        model: Model,
    },
    /// Invokes a script's backend.
    ScriptRun {
        /// The resolved script object.
        script: Script,
        /// The bound entry-point name.
        function: String,
        /// Non-tensor arguments (spec.md §4.2).
        args: Vec<ScriptArg>,
        /// Keyspace key names granted to the script (spec.md §9).
        key_refs: Vec<String>,
    },
}

impl DagOpKind {
    /// A short tag for logging/error messages.
    pub fn label(&self) -> &'static str {
        match self {
            DagOpKind::TensorSet => "TensorSet",
            DagOpKind::TensorGet => "TensorGet",
            DagOpKind::ModelRun { .. } => "ModelRun",
            DagOpKind::ScriptRun { .. } => "ScriptRun",
        }
    }
}

/// The outcome of running an op.
#[derive(Debug, Clone, Default)]
pub enum OpOutcome {
    /// Not yet executed.
    #[default]
    Pending,
    /// Ran successfully.
    Ok,
    /// Failed; carries the op-level error.
    Err(StrataError),
}

impl OpOutcome {
    /// True if this op has not yet completed (successfully or not).
    pub fn is_pending(&self) -> bool {
        matches!(self, OpOutcome::Pending)
    }

    /// True if this op completed successfully.
    pub fn is_ok(&self) -> bool {
        matches!(self, OpOutcome::Ok)
    }

    /// The op-level error, if any.
    pub fn error(&self) -> Option<&StrataError> {
        match self {
            OpOutcome::Err(e) => Some(e),
            _ => None,
        }
    }
}

/// One DAG node (C6).
#[derive(Debug)]
pub struct DagOp {
    /// Op-kind-specific resolved data.
    pub kind: DagOpKind,
    /// Symbolic input names, as written in the command (diagnostics
    /// only after planning).
    pub input_names: Vec<String>,
    /// Symbolic output names.
    pub output_names: Vec<String>,
    /// Resolved slot indices for each input, filled by name-to-slot
    /// resolution (spec.md §4.3).
    pub input_indices: Vec<usize>,
    /// Resolved slot indices for each output.
    pub output_indices: Vec<usize>,
    /// The device this op is assigned to (uppercased).
    pub device: String,
    outcome: Mutex<OpOutcome>,
    duration_us: AtomicU64,
}

impl DagOp {
    /// Build a new, not-yet-run op.
    pub fn new(
        kind: DagOpKind,
        input_names: Vec<String>,
        output_names: Vec<String>,
        input_indices: Vec<usize>,
        output_indices: Vec<usize>,
        device: String,
    ) -> Self {
        DagOp {
            kind,
            input_names,
            output_names,
            input_indices,
            output_indices,
            device,
            outcome: Mutex::new(OpOutcome::Pending),
            duration_us: AtomicU64::new(0),
        }
    }

    /// True if this op is a `ModelRun` whose model allows batching
    /// (`batchsize > 0`, spec.md §4.6).
    pub fn is_batchable(&self) -> bool {
        matches!(&self.kind, DagOpKind::ModelRun { model } if model.batch_policy().batchsize > 0)
    }

    /// The bound model, if this is a `ModelRun` op.
    pub fn model(&self) -> Option<&Model> {
        match &self.kind {
            DagOpKind::ModelRun { model } => Some(model),
            _ => None,
        }
    }

    /// Current result.
    pub fn outcome(&self) -> OpOutcome {
        self.outcome.lock().clone()
    }

    /// Mark this op as having completed successfully.
    pub fn mark_ok(&self) {
        *self.outcome.lock() = OpOutcome::Ok;
    }

    /// Mark this op as having failed with `err`.
    pub fn mark_err(&self, err: StrataError) {
        *self.outcome.lock() = OpOutcome::Err(err);
    }

    /// Record how long this op took to execute.
    pub fn record_duration(&self, micros: u64) {
        self.duration_us.store(micros, Ordering::Relaxed);
    }

    /// The recorded duration, in microseconds.
    pub fn duration_us(&self) -> u64 {
        self.duration_us.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_op_is_pending() {
        let op = DagOp::new(
            DagOpKind::TensorGet,
            vec!["a".into()],
            vec![],
            vec![0],
            vec![],
            "CPU".into(),
        );
        assert!(op.outcome().is_pending());
        assert!(!op.is_batchable());
    }

    #[test]
    fn mark_ok_and_err_update_outcome() {
        let op = DagOp::new(
            DagOpKind::TensorSet,
            vec![],
            vec!["a".into()],
            vec![],
            vec![0],
            "CPU".into(),
        );
        op.mark_ok();
        assert!(op.outcome().is_ok());
        op.mark_err(StrataError::internal("boom"));
        assert!(op.outcome().error().is_some());
    }
}
