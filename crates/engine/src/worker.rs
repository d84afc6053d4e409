//! Per-device run queues and the worker thread loop (C9/C10, spec.md
//! §4.4 "RunInfo Distribution" and §4.5 "Run Queues & Worker Threads").
//!
//! A [`RunInfo`] is split into one [`DeviceRun`] per device it touches —
//! the "shallow copy" spec.md describes is exactly the `Arc<RunInfo>`
//! clone each `DeviceRun` carries, plus that device's private op-index
//! subset and cursor (spec.md §4.4: "each device only walks the ops
//! assigned to it, but all of them share the one tensor slab"). Workers
//! pop a `DeviceRun`, advance it by one step, and either push it back
//! (more ops remain, or it's still waiting on another device's output)
//! or call [`RunInfo::finish`] (this device's ops are exhausted).
//!
//! Batching (§4.6) happens inline in [`execute_model`]: when the next op
//! is a batchable `ModelRun`, the worker scans its own device's queue —
//! one lock acquisition via [`BlockingQueue::scan_remove`] — for other
//! ready `DeviceRun`s bound to the same `Model`, and calls the backend
//! once across the concatenated batch.

use crate::context::{ExecutionCtx, ModelCtx, ScriptCtx};
use crate::dagop::{DagOp, DagOpKind};
use crate::runinfo::{DagOutcome, RunInfo};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strata_concurrency::{BlockingQueue, ScanDecision, TimeoutRegistry};
use strata_core::{StrataError, Timestamp};

/// One device's slice of a DAG run: an `Arc<RunInfo>` shallow copy plus
/// the subset of op indices assigned to `device`, walked in order.
pub struct DeviceRun {
    run: Arc<RunInfo>,
    device: String,
    op_indices: Vec<usize>,
    cursor: usize,
}

impl DeviceRun {
    /// Build the op-index subset for `device` from `run.ops`, in the
    /// DAG's original linear order.
    pub fn new(run: Arc<RunInfo>, device: String) -> Self {
        let op_indices = run
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.device == device)
            .map(|(i, _)| i)
            .collect();
        DeviceRun {
            run,
            device,
            op_indices,
            cursor: 0,
        }
    }
}

struct DeviceQueueHandle {
    queue: Arc<BlockingQueue<DeviceRun>>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

/// Owns one run queue + worker thread pool per observed device string,
/// spun up lazily on first use (spec.md §4.5 "a device's run queue and
/// threads are created the first time a DAG names that device").
///
/// Also owns the process-wide ONNX timeout tracker (C12, spec.md §4.7):
/// every worker thread is given its own slot at spawn time, and a
/// `Database`-level cron callback drives [`TimeoutRegistry::scan_and_terminate`]
/// against [`WorkerPool::timeout_registry`] on a fixed interval.
pub struct WorkerPool {
    devices: DashMap<String, DeviceQueueHandle>,
    threads_per_queue: usize,
    timeout_registry: Arc<TimeoutRegistry>,
}

impl WorkerPool {
    /// A pool with no device queues yet.
    pub fn new(threads_per_queue: usize) -> Self {
        WorkerPool {
            devices: DashMap::new(),
            threads_per_queue: threads_per_queue.max(1),
            timeout_registry: Arc::new(TimeoutRegistry::new()),
        }
    }

    /// The ONNX cooperative-cancellation registry backing every worker
    /// thread this pool has spawned so far. `Database` polls this on a
    /// timer via `scan_and_terminate`.
    pub fn timeout_registry(&self) -> Arc<TimeoutRegistry> {
        Arc::clone(&self.timeout_registry)
    }

    /// Split `run` into per-device shallow copies and enqueue each on its
    /// device's run queue, spinning the queue up first if this is the
    /// first time it's been seen.
    pub fn submit(&self, run: Arc<RunInfo>) {
        let mut devices: Vec<&str> = run.ops.iter().map(|op| op.device.as_str()).collect();
        devices.sort_unstable();
        devices.dedup();
        for device in devices {
            let handle = self.devices.entry(device.to_string()).or_insert_with(|| {
                self.spawn_device_queue(device.to_string())
            });
            handle
                .queue
                .push_back(DeviceRun::new(Arc::clone(&run), device.to_string()));
        }
    }

    fn spawn_device_queue(&self, device: String) -> DeviceQueueHandle {
        let queue: Arc<BlockingQueue<DeviceRun>> = Arc::new(BlockingQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let slot_ids = self.timeout_registry.extend(self.threads_per_queue);
        let threads = slot_ids
            .into_iter()
            .map(|slot_id| {
                let queue = Arc::clone(&queue);
                let shutdown = Arc::clone(&shutdown);
                let timeout_registry = Arc::clone(&self.timeout_registry);
                thread::Builder::new()
                    .name(format!("strata-worker-{device}"))
                    .spawn(move || worker_loop(queue, shutdown, timeout_registry, slot_id))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        DeviceQueueHandle {
            queue,
            shutdown,
            threads,
        }
    }

    /// Signal every device's worker threads to stop after their current
    /// item and join them. Used by `Database::shutdown` (C10 "graceful
    /// drain").
    pub fn shutdown(&mut self) {
        for mut entry in self.devices.iter_mut() {
            entry.shutdown.store(true, Ordering::Release);
        }
        for mut entry in self.devices.iter_mut() {
            for handle in std::mem::take(&mut entry.threads) {
                let _ = handle.join();
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(1)
    }
}

fn worker_loop(
    queue: Arc<BlockingQueue<DeviceRun>>,
    shutdown: Arc<AtomicBool>,
    timeout_registry: Arc<TimeoutRegistry>,
    slot_id: usize,
) {
    while !shutdown.load(Ordering::Acquire) {
        let dr = match queue.pop_front_wait(Duration::from_millis(1)) {
            Some(dr) => dr,
            None => continue,
        };
        step(dr, &queue, &timeout_registry, slot_id);
    }
}

fn step(
    mut dr: DeviceRun,
    queue: &BlockingQueue<DeviceRun>,
    timeout_registry: &Arc<TimeoutRegistry>,
    slot_id: usize,
) {
    if dr.run.check_timeout() {
        dr.run.reply(DagOutcome::TimedOut);
        dr.run.finish();
        return;
    }
    if dr.cursor >= dr.op_indices.len() {
        dr.run.finish();
        return;
    }
    if dr.run.dag_error() {
        fail_remaining(&mut dr);
        dr.run.finish();
        return;
    }
    let op_idx = dr.op_indices[dr.cursor];
    let op = &dr.run.ops[op_idx];
    if !dr.run.is_ready(op) {
        // Waiting on another device's output; give other queued work a
        // turn before retrying.
        queue.push_back(dr);
        return;
    }
    match &op.kind {
        DagOpKind::TensorSet | DagOpKind::TensorGet => {
            execute_simple(&dr, op_idx);
            dr.cursor += 1;
            requeue_or_finish(dr, queue);
        }
        DagOpKind::ModelRun { .. } => {
            let batchable = op.is_batchable();
            execute_model(dr, op_idx, queue, batchable, timeout_registry, slot_id);
        }
        DagOpKind::ScriptRun { .. } => {
            execute_script(&dr, op_idx);
            dr.cursor += 1;
            requeue_or_finish(dr, queue);
        }
    }
}

fn requeue_or_finish(dr: DeviceRun, queue: &BlockingQueue<DeviceRun>) {
    if dr.cursor >= dr.op_indices.len() {
        dr.run.finish();
    } else {
        queue.push_back(dr);
    }
}

/// Mark every not-yet-run op in this device's remaining subset as failed
/// with the DAG's aggregate error (spec.md §7 "once dag_error is set, no
/// further ops on any device execute; the remainder are reported as
/// failed").
fn fail_remaining(dr: &mut DeviceRun) {
    let err = dr
        .run
        .aggregate_error()
        .unwrap_or_else(|| StrataError::dag_run("aborted after an earlier op failed"));
    for &idx in &dr.op_indices[dr.cursor..] {
        let op = &dr.run.ops[idx];
        if op.outcome().is_pending() {
            op.mark_err(err.clone());
            dr.run.mark_op_complete();
        }
    }
    dr.cursor = dr.op_indices.len();
}

fn execute_simple(dr: &DeviceRun, op_idx: usize) {
    let op = &dr.run.ops[op_idx];
    op.mark_ok();
    dr.run.mark_op_complete();
}

fn execute_script(dr: &DeviceRun, op_idx: usize) {
    let op = &dr.run.ops[op_idx];
    let (script, function, args, key_refs) = match &op.kind {
        DagOpKind::ScriptRun {
            script,
            function,
            args,
            key_refs,
        } => (script.clone(), function.clone(), args.clone(), key_refs.clone()),
        _ => unreachable!("execute_script only handles ScriptRun ops"),
    };

    let mut exec_ctx = ExecutionCtx::Script(ScriptCtx::new(function.clone()));
    let ctx = exec_ctx
        .as_script_mut()
        .expect("just constructed as the Script variant");
    for &slot in &op.input_indices {
        if let Some(t) = dr.run.get_slot(slot) {
            ctx.add_input(t);
        }
    }
    for arg in args {
        ctx.add_arg(arg);
    }
    for key in key_refs {
        ctx.add_key_ref(key);
    }
    for _ in &op.output_indices {
        ctx.add_output_placeholder();
    }

    let started = Instant::now();
    let result = {
        let ctx = exec_ctx
            .as_script_mut()
            .expect("just constructed as the Script variant");
        script.handle().run(&function, ctx)
    };
    let duration_us = started.elapsed().as_micros() as u64;
    op.record_duration(duration_us);

    match result {
        Ok(()) => {
            let mut failed = false;
            for (i, &slot) in op.output_indices.iter().enumerate() {
                match exec_ctx.get_output(i) {
                    Ok(t) => {
                        let _ = dr.run.set_slot(slot, t.clone());
                    }
                    Err(e) => {
                        failed = true;
                        op.mark_err(e.clone());
                        dr.run.set_dag_error(e);
                    }
                }
            }
            if !failed {
                op.mark_ok();
            }
            script.record_run(duration_us, 1, failed);
        }
        Err(e) => {
            op.mark_err(e.clone());
            dr.run.set_dag_error(e);
            script.record_run(duration_us, 1, true);
        }
    }
    dr.run.mark_op_complete();
}

/// The batch-dimension extent of `op`'s first input, or `1` for ops with
/// no inputs (spec.md §4.6 "extent is read off the first input's leading
/// dimension").
fn op_batch_extent(run: &RunInfo, op: &DagOp) -> u64 {
    op.input_indices
        .first()
        .and_then(|&idx| run.get_slot(idx))
        .and_then(|t| t.shape().first().copied())
        .map(|n| n as u64)
        .unwrap_or(1)
}

/// Run a `ModelRun` op, possibly batched with sibling `DeviceRun`s
/// waiting on the same model (spec.md §4.6). `batchable` is
/// `op.is_batchable()`, checked by the caller so this function doesn't
/// need to re-derive it.
fn execute_model(
    dr: DeviceRun,
    op_idx: usize,
    queue: &BlockingQueue<DeviceRun>,
    batchable: bool,
    timeout_registry: &Arc<TimeoutRegistry>,
    slot_id: usize,
) {
    let model = dr.run.ops[op_idx]
        .model()
        .cloned()
        .expect("ModelRun op carries a Model");
    let device = dr.device.clone();
    let mut extent = op_batch_extent(&dr.run, &dr.run.ops[op_idx]);
    let mut members: Vec<(DeviceRun, usize)> = vec![(dr, op_idx)];

    let policy = model.batch_policy();
    if batchable && extent < policy.batchsize.max(1) {
        let cap = policy.batchsize;
        let target_identity = model.identity();
        let taken = queue.scan_remove(|candidate| {
            if extent >= cap {
                return ScanDecision::Stop;
            }
            if candidate.device != device {
                return ScanDecision::Skip;
            }
            if candidate.run.dag_error() || candidate.run.check_timeout() {
                return ScanDecision::Skip;
            }
            let Some(&cand_op_idx) = candidate.op_indices.get(candidate.cursor) else {
                return ScanDecision::Skip;
            };
            let cand_op = &candidate.run.ops[cand_op_idx];
            match cand_op.model() {
                Some(m) if m.identity() == target_identity && candidate.run.is_ready(cand_op) => {
                    let cand_extent = op_batch_extent(&candidate.run, cand_op);
                    if extent + cand_extent <= cap {
                        extent += cand_extent;
                        ScanDecision::Take
                    } else {
                        ScanDecision::Stop
                    }
                }
                _ => ScanDecision::Skip,
            }
        });
        for item in taken {
            let idx = item.op_indices[item.cursor];
            members.push((item, idx));
        }
    }

    if batchable && policy.minbatchsize > 0 && extent < policy.minbatchsize {
        let first_queued_at = members[0].0.run.queued_at();
        let waited_enough = policy.minbatchtimeout_ms == 0
            || first_queued_at.elapsed_ms() >= policy.minbatchtimeout_ms;
        if !waited_enough {
            // Not enough arrivals yet and the partial-batch grace period
            // hasn't elapsed: put every member back and try again later.
            for (item, _) in members.into_iter().rev() {
                queue.push_front(item);
            }
            return;
        }
    }

    let mut ctxs: Vec<ModelCtx> = Vec::with_capacity(members.len());
    for (item, idx) in &members {
        let op = &item.run.ops[*idx];
        let mut ctx = ModelCtx::new();
        for &slot in &op.input_indices {
            if let Some(t) = item.run.get_slot(slot) {
                ctx.add_input(t);
            }
        }
        for _ in &op.output_indices {
            ctx.add_output_placeholder();
        }
        ctxs.push(ctx);
    }

    // Register this backend call with the ONNX timeout tracker (C12,
    // spec.md §4.7) only if the backend actually exposes a cancel token;
    // other backends rely solely on the DAG-level wall-clock deadline.
    let cancel_token = model.handle().cancel_token();
    if let Some(token) = &cancel_token {
        timeout_registry.enter(slot_id, Timestamp::now().as_millis(), Arc::clone(token));
    }
    let started = Instant::now();
    let result = model.handle().run(&mut ctxs);
    let duration_us = started.elapsed().as_micros() as u64;
    if cancel_token.is_some() {
        timeout_registry.exit(slot_id);
    }

    match result {
        Ok(()) => {
            for ((item, idx), ctx) in members.iter().zip(ctxs.into_iter()) {
                let op = &item.run.ops[*idx];
                let exec_ctx = ExecutionCtx::Model(ctx);
                let mut failed = false;
                for (i, &slot) in op.output_indices.iter().enumerate() {
                    match exec_ctx.get_output(i) {
                        Ok(t) => {
                            let _ = item.run.set_slot(slot, t.clone());
                        }
                        Err(e) => {
                            failed = true;
                            op.mark_err(e.clone());
                            item.run.set_dag_error(e);
                        }
                    }
                }
                if !failed {
                    op.mark_ok();
                }
                op.record_duration(duration_us);
            }
            model.record_run(duration_us, extent, false);
        }
        Err(e) => {
            for (item, idx) in &members {
                let op = &item.run.ops[*idx];
                op.mark_err(e.clone());
                op.record_duration(duration_us);
                item.run.set_dag_error(e.clone());
            }
            model.record_run(duration_us, extent, true);
        }
    }

    for (mut item, _) in members {
        item.cursor += 1;
        item.run.mark_op_complete();
        requeue_or_finish(item, queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, BackendModelHandle, BackendScriptHandle};
    use crate::dagop::DagOp;
    use crate::model::{BatchPolicy, Model};
    use crate::runinfo::OpReply;
    use crate::script::Script;
    use std::sync::mpsc::sync_channel;
    use std::sync::Mutex as StdMutex;
    use strata_core::{DType, Scalar, Tensor};

    struct EchoModel {
        calls: StdMutex<Vec<usize>>,
    }
    impl BackendModelHandle for EchoModel {
        fn run(&self, ctxs: &mut [ModelCtx]) -> strata_core::StrataResult<()> {
            self.calls.lock().unwrap().push(ctxs.len());
            for ctx in ctxs.iter_mut() {
                let input = ctx.get_input(0)?.clone();
                ctx.set_output(0, input)?;
            }
            Ok(())
        }
        fn serialize(&self) -> strata_core::StrataResult<Vec<u8>> {
            Ok(vec![])
        }
    }

    struct UpperScript;
    impl BackendScriptHandle for UpperScript {
        fn run(&self, _function: &str, ctx: &mut ScriptCtx) -> strata_core::StrataResult<()> {
            let input = ctx.get_input(0)?.clone();
            ctx.set_output(0, input)?;
            Ok(())
        }
    }

    fn float_tensor(v: f64) -> Tensor {
        Tensor::from_values(DType::Float32, vec![1], &[Scalar::Number(v)]).unwrap()
    }

    fn noop_finish() -> Box<dyn Fn(&Arc<RunInfo>) + Send + Sync> {
        Box::new(|_| {})
    }

    #[test]
    fn single_device_tensorset_then_tensorget_completes() {
        let (tx, rx) = sync_channel(1);
        let t = float_tensor(5.0);
        let op_set = DagOp::new(
            DagOpKind::TensorSet,
            vec![],
            vec!["a".into()],
            vec![],
            vec![0],
            "CPU".into(),
        );
        let op_get = DagOp::new(
            DagOpKind::TensorGet,
            vec!["a".into()],
            vec![],
            vec![0],
            vec![],
            "CPU".into(),
        );
        let run = RunInfo::new(
            vec![op_set, op_get],
            vec![Some(t)],
            vec![],
            true,
            1,
            None,
            tx,
            noop_finish(),
        );
        let pool = WorkerPool::new(1);
        pool.submit(run);
        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(outcome, DagOutcome::Completed(_)));
    }

    #[test]
    fn model_run_executes_and_reports_output() {
        let (tx, rx) = sync_channel(1);
        let handle = Arc::new(EchoModel {
            calls: StdMutex::new(vec![]),
        });
        let model = Model::new(
            BackendKind::Torch,
            "CPU",
            "v1",
            BatchPolicy::default(),
            vec![],
            vec![],
            vec![],
            handle,
        );
        let t = float_tensor(3.0);
        let op_run = DagOp::new(
            DagOpKind::ModelRun { model },
            vec!["in".into()],
            vec!["out".into()],
            vec![0],
            vec![1],
            "CPU".into(),
        );
        let run = RunInfo::new(
            vec![op_run],
            vec![Some(t), None],
            vec![],
            true,
            1,
            None,
            tx,
            noop_finish(),
        );
        let pool = WorkerPool::new(1);
        pool.submit(run);
        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(outcome, DagOutcome::Completed(_)));
    }

    #[test]
    fn script_run_executes_and_reports_output() {
        let (tx, rx) = sync_channel(1);
        let script = Script::new("CPU", "t", "def f(): pass", vec![], Arc::new(UpperScript));
        let t = float_tensor(1.0);
        let op_run = DagOp::new(
            DagOpKind::ScriptRun {
                script,
                function: "f".into(),
                args: vec![],
                key_refs: vec![],
            },
            vec!["in".into()],
            vec!["out".into()],
            vec![0],
            vec![1],
            "CPU".into(),
        );
        let run = RunInfo::new(
            vec![op_run],
            vec![Some(t), None],
            vec![],
            true,
            1,
            None,
            tx,
            noop_finish(),
        );
        let pool = WorkerPool::new(1);
        pool.submit(run);
        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(outcome, DagOutcome::Completed(_)));
    }

    #[test]
    fn timed_out_run_reports_timeout_without_running_ops() {
        let (tx, rx) = sync_channel(1);
        let op_get = DagOp::new(
            DagOpKind::TensorGet,
            vec!["a".into()],
            vec![],
            vec![0],
            vec![],
            "CPU".into(),
        );
        let run = RunInfo::new(
            vec![op_get],
            vec![Some(float_tensor(1.0))],
            vec![],
            true,
            1,
            Some(0),
            tx,
            noop_finish(),
        );
        std::thread::sleep(Duration::from_millis(5));
        let pool = WorkerPool::new(1);
        pool.submit(run);
        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(outcome, DagOutcome::TimedOut));
    }

    /// spec.md §4.6/§8 "Batching correctness": two `RunInfo`s bound to the
    /// same batchable model, both ready at the same time, are executed in
    /// a single backend call and each gets back its own slice of the
    /// result — the concatenate-then-slice identity.
    #[test]
    fn two_ready_runs_on_the_same_model_are_batched_into_one_backend_call() {
        let handle = Arc::new(EchoModel {
            calls: StdMutex::new(vec![]),
        });
        let model = Model::new(
            BackendKind::Torch,
            "CPU",
            "v1",
            BatchPolicy {
                batchsize: 8,
                minbatchsize: 0,
                minbatchtimeout_ms: 0,
            },
            vec![],
            vec![],
            vec![],
            handle.clone(),
        );

        let queue: Arc<BlockingQueue<DeviceRun>> = Arc::new(BlockingQueue::new());
        let timeout_registry = Arc::new(TimeoutRegistry::new());

        let build_run = |value: f64, tx: std::sync::mpsc::SyncSender<DagOutcome>| {
            let op_run = DagOp::new(
                DagOpKind::ModelRun {
                    model: model.clone(),
                },
                vec!["in".into()],
                vec!["out".into()],
                vec![0],
                vec![1],
                "CPU".into(),
            );
            let run = RunInfo::new(
                vec![op_run],
                vec![Some(float_tensor(value)), None],
                vec![],
                true,
                1,
                None,
                tx,
                noop_finish(),
            );
            DeviceRun::new(run, "CPU".into())
        };

        let (tx_a, rx_a) = sync_channel(1);
        let (tx_b, rx_b) = sync_channel(1);
        let dr_a = build_run(3.0, tx_a);
        let dr_b = build_run(4.0, tx_b);

        // dr_b sits in the queue; stepping dr_a directly (as if just
        // popped by a worker) must find and batch it.
        queue.push_back(dr_b);
        step(dr_a, &queue, &timeout_registry, 0);

        let outcome_a = rx_a.recv_timeout(Duration::from_secs(2)).unwrap();
        let outcome_b = rx_b.recv_timeout(Duration::from_secs(2)).unwrap();
        match outcome_a {
            DagOutcome::Completed(replies) => {
                assert!(matches!(replies[0], OpReply::Ok));
            }
            other => panic!("expected dr_a to complete, got {other:?}"),
        }
        match outcome_b {
            DagOutcome::Completed(replies) => {
                assert!(matches!(replies[0], OpReply::Ok));
            }
            other => panic!("expected dr_b to complete, got {other:?}"),
        }
        // One backend call covering both members, not two separate calls.
        assert_eq!(handle.calls.lock().unwrap().as_slice(), &[2]);
    }
}
