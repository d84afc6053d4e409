//! Per-op and per-DAG reply rendering (spec.md §6 "Replies").
//!
//! `strata-engine::runinfo::build_replies` already reduces a finished
//! `RunInfo` to an `OpReply` per op; this module is the last step,
//! turning those engine-level values into the wire-ready [`Reply`] shape
//! `strata-executor` hands back to a caller.

use crate::tensor_payload::{self, TensorPayload};
use serde::{Deserialize, Serialize};
use strata_engine::{DagOutcome, OpReply};

/// One rendered reply — either a single op's result or the whole DAG's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// The op completed with no data to return (`TensorSet`,
    /// `ModelRun`/`ScriptRun` with no `TensorGet` following).
    Ok,
    /// An input was missing when reply-building tolerates that (spec.md
    /// §6 "`NA` (input missing — only visible in planning-tolerant
    /// variants)").
    Na,
    /// A tensor payload (from `TensorGet`).
    Tensor(TensorPayload),
    /// An op-level error string.
    Error(String),
    /// The DAG as a whole timed out; a single bulk-string reply (spec.md
    /// §6 "A DAG-level TIMEDOUT is a single bulk-string reply").
    TimedOut,
}

/// Render a single op's reply. Tensor replies render as `VALUES`
/// (spec.md §8 scenario 1's concrete expectation) unless the op asked for
/// `BLOB`.
pub fn render_op_reply(reply: &OpReply, blob: bool) -> Reply {
    match reply {
        OpReply::Ok => Reply::Ok,
        OpReply::Na => Reply::Na,
        OpReply::Error(message) => Reply::Error(message.clone()),
        OpReply::Tensor(tensor) => {
            let payload = if blob {
                tensor_payload::render_blob(tensor)
            } else {
                match tensor_payload::render_values(tensor) {
                    Ok(p) => p,
                    Err(e) => return Reply::Error(e.reply_message()),
                }
            };
            Reply::Tensor(payload)
        }
    }
}

/// Render a whole DAG's outcome (spec.md §4.8 "completion and
/// persistence"): `TimedOut` and planning errors collapse to a single
/// reply; a completed run renders one reply per op, in order.
pub fn render_dag_outcome(outcome: &DagOutcome) -> Vec<Reply> {
    match outcome {
        DagOutcome::TimedOut => vec![Reply::TimedOut],
        DagOutcome::PlanningError(message) => vec![Reply::Error(message.clone())],
        DagOutcome::Completed(replies) => {
            replies.iter().map(|r| render_op_reply(r, false)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_outcome_is_single_reply() {
        let replies = render_dag_outcome(&DagOutcome::TimedOut);
        assert_eq!(replies, vec![Reply::TimedOut]);
    }

    #[test]
    fn planning_error_is_single_reply() {
        let replies = render_dag_outcome(&DagOutcome::PlanningError("DAG is empty".into()));
        assert_eq!(replies, vec![Reply::Error("DAG is empty".into())]);
    }

    #[test]
    fn op_level_error_renders_without_aborting_other_replies() {
        let outcome = DagOutcome::Completed(vec![OpReply::Ok, OpReply::Error("boom".into())]);
        let replies = render_dag_outcome(&outcome);
        assert_eq!(replies, vec![Reply::Ok, Reply::Error("boom".into())]);
    }
}
