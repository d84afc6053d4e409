//! Whole-DAG run state (C7, spec.md §3 "RunInfo").
//!
//! `RunInfo` holds everything shared across every device a DAG touches:
//! the tensor slab, the flat op list, completion/error counters, and the
//! blocked-client handle. Per-device distribution (spec.md §4.4) wraps
//! an `Arc<RunInfo>` together with that device's op subset in
//! [`DeviceRun`] — the "shallow copy" spec.md describes is exactly
//! `Arc::clone`, with [`RunInfo::finish`] doing the explicit
//! reference-count bookkeeping the source implements by hand.

use crate::dagop::{DagOp, DagOpKind, OpOutcome};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use strata_core::{StrataError, StrataResult, Tensor, Timestamp};

/// The reply payload for a single op, built by the completion path
/// (C11) once a DAG finishes.
#[derive(Debug, Clone)]
pub enum OpReply {
    /// The op completed with no payload to report (`TensorSet`, or a
    /// `ModelRun`/`ScriptRun` whose outputs are consumed internally).
    Ok,
    /// A tensor payload (`TensorGet`, or an op whose output is read
    /// back).
    Tensor(Tensor),
    /// The op's input was missing (planning-tolerant variants only;
    /// spec.md §6 "Replies").
    Na,
    /// The op failed; carries its error message.
    Error(String),
}

/// The reply for a whole DAG run, handed back to the blocked caller.
#[derive(Debug, Clone)]
pub enum DagOutcome {
    /// The DAG's wall-clock deadline elapsed before it finished.
    TimedOut,
    /// Planning failed before any op ran.
    PlanningError(String),
    /// The DAG ran (some ops may have individually failed); replies are
    /// in linear op order.
    Completed(Vec<OpReply>),
}

/// Whole-DAG shared state (spec.md §3 "RunInfo").
pub struct RunInfo {
    /// The flat, linear-order op list.
    pub ops: Vec<DagOp>,
    /// Outputs that must be written back to the keyspace on success:
    /// `(key name, slot index)`.
    pub persist_set: Vec<(String, usize)>,
    /// `true` when every op in this DAG targets the same device — the
    /// fast path that elides the tensor-slab lock entirely (spec.md
    /// §4.4).
    pub single_device: bool,
    shared_tensors: parking_lot::RwLock<Vec<Option<Tensor>>>,
    complete_ops: AtomicUsize,
    dag_error: AtomicBool,
    aggregate_error: parking_lot::Mutex<Option<StrataError>>,
    device_refs: AtomicUsize,
    queued_at: Timestamp,
    timeout_ms: Option<u64>,
    timed_out: AtomicBool,
    reply_tx: parking_lot::Mutex<Option<SyncSender<DagOutcome>>>,
    on_finish: Box<dyn Fn(&Arc<RunInfo>) + Send + Sync>,
}

impl RunInfo {
    /// Build a fresh `RunInfo`. `device_count` seeds the shallow-copy
    /// reference count (spec.md "a reference count for how many device
    /// shallow copies still reference this RunInfo").
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ops: Vec<DagOp>,
        shared_tensors: Vec<Option<Tensor>>,
        persist_set: Vec<(String, usize)>,
        single_device: bool,
        device_count: usize,
        timeout_ms: Option<u64>,
        reply_tx: SyncSender<DagOutcome>,
        on_finish: Box<dyn Fn(&Arc<RunInfo>) + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(RunInfo {
            ops,
            persist_set,
            single_device,
            shared_tensors: parking_lot::RwLock::new(shared_tensors),
            complete_ops: AtomicUsize::new(0),
            dag_error: AtomicBool::new(false),
            aggregate_error: parking_lot::Mutex::new(None),
            device_refs: AtomicUsize::new(device_count.max(1)),
            queued_at: Timestamp::now(),
            timeout_ms,
            timed_out: AtomicBool::new(false),
            reply_tx: parking_lot::Mutex::new(Some(reply_tx)),
            on_finish,
        })
    }

    /// Total number of ops in the DAG.
    pub fn total_ops(&self) -> usize {
        self.ops.len()
    }

    /// Number of ops that have completed (successfully or not).
    pub fn complete_ops(&self) -> usize {
        self.complete_ops.load(Ordering::Acquire)
    }

    /// `true` once every op has completed.
    pub fn is_dag_complete(&self) -> bool {
        self.complete_ops() >= self.total_ops()
    }

    /// Record that one more op has completed (spec.md §4.5 "complete_ops
    /// += 1 (atomic add)").
    pub fn mark_op_complete(&self) -> usize {
        self.complete_ops.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Fetch a shallow copy of slot `idx`, under the DAG read lock.
    pub fn get_slot(&self, idx: usize) -> Option<Tensor> {
        self.shared_tensors.read().get(idx).cloned().flatten()
    }

    /// Stamp `tensor` into slot `idx`. Enforces the single-assignment
    /// invariant (spec.md "shared_tensors[i] is assigned at most once").
    pub fn set_slot(&self, idx: usize, tensor: Tensor) -> StrataResult<()> {
        let mut slots = self.shared_tensors.write();
        let slot = slots
            .get_mut(idx)
            .ok_or_else(|| StrataError::internal(format!("no such tensor slot {idx}")))?;
        if slot.is_some() {
            return Err(StrataError::internal(format!(
                "tensor slot {idx} written more than once"
            )));
        }
        *slot = Some(tensor);
        Ok(())
    }

    /// Total number of slots in the shared tensor slab.
    pub fn slot_count(&self) -> usize {
        self.shared_tensors.read().len()
    }

    /// An op is ready when every one of its inputs has been produced
    /// (spec.md §4.5 "Readiness").
    pub fn is_ready(&self, op: &DagOp) -> bool {
        let slots = self.shared_tensors.read();
        op.input_indices
            .iter()
            .all(|&idx| slots.get(idx).map(|s| s.is_some()).unwrap_or(false))
    }

    /// CAS `dag_error` to `true`, keeping only the first failure's
    /// message (spec.md §7 "Propagation").
    pub fn set_dag_error(&self, err: StrataError) {
        if self
            .dag_error
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.aggregate_error.lock() = Some(err);
        }
    }

    /// `true` once any op has failed.
    pub fn dag_error(&self) -> bool {
        self.dag_error.load(Ordering::Acquire)
    }

    /// The first op's error, if any has failed yet.
    pub fn aggregate_error(&self) -> Option<StrataError> {
        self.aggregate_error.lock().clone()
    }

    /// When this DAG was enqueued.
    pub fn queued_at(&self) -> Timestamp {
        self.queued_at
    }

    /// Check (and cache) whether the wall-clock deadline from §4.7 has
    /// elapsed. Checked on every queue pop.
    pub fn check_timeout(&self) -> bool {
        if self.timed_out.load(Ordering::Acquire) {
            return true;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            if self.queued_at.elapsed_ms() > timeout_ms {
                self.timed_out.store(true, Ordering::Release);
                return true;
            }
        }
        false
    }

    /// `true` if this DAG has already been flagged as timed out.
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    /// Release this device's shallow copy. If it was the last
    /// outstanding reference, sends the final reply (if not already
    /// sent by a timeout/error short-circuit) and invokes `on_finish`.
    pub fn finish(self: &Arc<Self>) {
        if self.device_refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            (self.on_finish)(self);
        }
    }

    /// Send the final outcome to the blocked client. Idempotent: only
    /// the first call actually sends (a timed-out DAG short-circuits
    /// before normal completion would otherwise send again).
    pub fn reply(&self, outcome: DagOutcome) {
        if let Some(tx) = self.reply_tx.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Build the per-op reply list for a finished DAG, in linear op order
/// (spec.md §6 "Replies"). Called once, from the completion path
/// (spec.md §4.8), after `RunInfo::is_dag_complete` is known to hold.
pub fn build_replies(run: &RunInfo) -> Vec<OpReply> {
    run.ops
        .iter()
        .map(|op| match op.outcome() {
            OpOutcome::Err(e) => OpReply::Error(e.to_string()),
            OpOutcome::Pending => OpReply::Error("op did not complete".to_string()),
            OpOutcome::Ok => match &op.kind {
                DagOpKind::TensorGet => match op.input_indices.first().and_then(|&idx| run.get_slot(idx)) {
                    Some(tensor) => OpReply::Tensor(tensor),
                    None => OpReply::Na,
                },
                _ => OpReply::Ok,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dagop::{DagOp, DagOpKind};
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::mpsc::sync_channel;
    use strata_core::DType;

    fn noop_finish() -> Box<dyn Fn(&Arc<RunInfo>) + Send + Sync> {
        Box::new(|_| {})
    }

    #[test]
    fn single_assignment_is_enforced() {
        let (tx, _rx) = sync_channel(1);
        let run = RunInfo::new(vec![], vec![None], vec![], true, 1, None, tx, noop_finish());
        let t = Tensor::zeroed(DType::Float32, vec![1]).unwrap();
        run.set_slot(0, t.clone()).unwrap();
        assert!(run.set_slot(0, t).is_err());
    }

    #[test]
    fn readiness_requires_all_inputs_populated() {
        let (tx, _rx) = sync_channel(1);
        let op = DagOp::new(
            DagOpKind::TensorGet,
            vec!["a".into()],
            vec![],
            vec![0],
            vec![],
            "CPU".into(),
        );
        let run = RunInfo::new(
            vec![op],
            vec![None],
            vec![],
            true,
            1,
            None,
            tx,
            noop_finish(),
        );
        assert!(!run.is_ready(&run.ops[0]));
        run.set_slot(0, Tensor::zeroed(DType::Float32, vec![1]).unwrap())
            .unwrap();
        assert!(run.is_ready(&run.ops[0]));
    }

    #[test]
    fn only_first_error_is_kept_as_aggregate() {
        let (tx, _rx) = sync_channel(1);
        let run = RunInfo::new(vec![], vec![], vec![], true, 1, None, tx, noop_finish());
        run.set_dag_error(StrataError::internal("first"));
        run.set_dag_error(StrataError::internal("second"));
        assert_eq!(run.aggregate_error().unwrap().to_string(), "internal error: first");
    }

    #[test]
    fn finish_only_fires_on_last_device_ref() {
        let (tx, rx) = sync_channel(1);
        let fired = Arc::new(StdAtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let on_finish: Box<dyn Fn(&Arc<RunInfo>) + Send + Sync> = Box::new(move |run| {
            fired2.fetch_add(1, Ordering::SeqCst);
            run.reply(DagOutcome::Completed(vec![]));
        });
        let run = RunInfo::new(vec![], vec![], vec![], false, 2, None, tx, on_finish);
        run.finish();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        run.finish();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn build_replies_returns_tensor_for_completed_get_and_error_for_pending() {
        let (tx, _rx) = sync_channel(1);
        let get_op = DagOp::new(
            DagOpKind::TensorGet,
            vec!["a".into()],
            vec![],
            vec![0],
            vec![],
            "CPU".into(),
        );
        let pending_op = DagOp::new(
            DagOpKind::TensorGet,
            vec!["b".into()],
            vec![],
            vec![1],
            vec![],
            "CPU".into(),
        );
        let run = RunInfo::new(
            vec![get_op, pending_op],
            vec![
                Some(Tensor::zeroed(DType::Float32, vec![1]).unwrap()),
                None,
            ],
            vec![],
            true,
            1,
            None,
            tx,
            noop_finish(),
        );
        run.ops[0].mark_ok();
        let replies = build_replies(&run);
        assert!(matches!(replies[0], OpReply::Tensor(_)));
        assert!(matches!(replies[1], OpReply::Error(_)));
    }

    #[test]
    fn check_timeout_flags_once_deadline_elapsed() {
        let (tx, _rx) = sync_channel(1);
        let run = RunInfo::new(vec![], vec![], vec![], true, 1, Some(0), tx, noop_finish());
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(run.check_timeout());
        assert!(run.timed_out());
    }
}
