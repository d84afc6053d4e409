//! The embedded inference engine's top-level handle.
//!
//! `Database` owns everything a branch-scoped keyspace needs to accept
//! tensors, models, and scripts and run DAGs against them: the three
//! [`ObjectStore`]s (C1/C4), the [`BackendRegistry`] (C3), and the
//! [`WorkerPool`] (C9/C10). It is the seam `strata-executor` drives from
//! the wire protocol — every wire command this engine understands maps
//! to exactly one `Database` method.
//!
//! Building a fresh `Database` does *not* install any backend loader
//! (spec.md §4.2 backends are "loaded at startup or on first use", and
//! loading them is `strata-intelligence`'s job, which depends on this
//! crate rather than the other way around). A caller assembling a
//! database — `strata-executor::Strata::open` — calls
//! [`Database::backends`] and hands it to
//! `strata_intelligence::install_default_backends`.

use crate::backend::{BackendKind, BackendRegistry};
use crate::config::StrataConfig;
use crate::model::{BatchPolicy, Model};
use crate::object_store::ObjectStore;
use crate::parser::{CmdArg, DagPlanner};
use crate::runinfo::{build_replies, DagOutcome, RunInfo};
use crate::script::Script;
use crate::stats::RunStatsSnapshot;
use crate::worker::WorkerPool;
use parking_lot::Mutex;
use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use strata_core::{BranchId, EntityRef, StrataError, StrataResult, Tensor};
use strata_durability::DurabilityMode;

/// The embedded inference engine (spec.md §1 "an in-process inference
/// engine embedded in a key/value store").
pub struct Database {
    tensors: Arc<ObjectStore<Tensor>>,
    models: ObjectStore<Model>,
    scripts: ObjectStore<Script>,
    backends: BackendRegistry,
    workers: WorkerPool,
    config: StrataConfig,
    /// Records a persisted tensor has already been made durable for
    /// (`Sync` mode appends inline; `Periodic` mode only after
    /// `flush_durability` drains `durability_pending`).
    durability_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Records awaiting the next `flush_durability` (`Periodic` mode only).
    durability_pending: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Database {
    /// Open a fresh, empty database under `config`. No backends are
    /// registered yet; see [`Database::backends`].
    pub fn new(config: StrataConfig) -> Self {
        Database {
            tensors: Arc::new(ObjectStore::new()),
            models: ObjectStore::new(),
            scripts: ObjectStore::new(),
            backends: BackendRegistry::new(),
            workers: WorkerPool::new(config.threads_per_queue),
            config,
            durability_log: Arc::new(Mutex::new(Vec::new())),
            durability_pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The backend capability registry, for a caller to install a
    /// loader into at startup (spec.md §4.2).
    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Drain and join every device worker thread (graceful shutdown).
    pub fn shutdown(&mut self) {
        self.workers.shutdown();
    }

    /// Drive the ONNX cooperative-cancellation sweep (C12, spec.md §4.7
    /// "a server-level periodic callback scans the registry"). A caller
    /// is expected to invoke this on a fixed interval (the "cron" the
    /// spec refers to); the engine does not schedule its own timer.
    pub fn tick_timeouts(&self, now_ms: u64) -> usize {
        self.workers
            .timeout_registry()
            .scan_and_terminate(self.config.model_execution_timeout_ms, now_ms)
    }

    /// The durability mode this database was opened with (spec.md §5).
    pub fn durability_mode(&self) -> DurabilityMode {
        self.config.durability_mode
    }

    /// Number of persisted records made durable so far: under `Sync` this
    /// grows inline with every `PERSIST`; under `Periodic` only
    /// `flush_durability` moves records here; under `None` it never grows.
    pub fn durability_log_len(&self) -> usize {
        self.durability_log.lock().len()
    }

    /// Records queued for the next `flush_durability` call (`Periodic`
    /// mode only; always empty under `Sync`/`None`).
    pub fn pending_durability_count(&self) -> usize {
        self.durability_pending.lock().len()
    }

    /// Drive the periodic durability flush (spec.md §5 "fsync on a
    /// periodic background interval"): moves every pending record into
    /// the durable log and returns how many were flushed. A caller is
    /// expected to invoke this on a fixed interval, same as
    /// `tick_timeouts`.
    pub fn flush_durability(&self) -> usize {
        let mut pending = self.durability_pending.lock();
        let flushed = pending.len();
        self.durability_log.lock().extend(pending.drain(..));
        flushed
    }

    // -- Tensors (spec.md §6 "TensorSet"/"TensorGet") -----------------

    /// Create or overwrite a tensor at `name`.
    pub fn tensor_set(&self, branch: BranchId, name: impl Into<String>, tensor: Tensor) {
        self.tensors.put(branch, name, tensor);
    }

    /// Read a tensor by name.
    pub fn tensor_get(&self, branch: BranchId, name: &str) -> StrataResult<Tensor> {
        self.tensors
            .get(branch, name)
            .ok_or_else(|| StrataError::not_found(EntityRef::tensor(branch, name)))
    }

    // -- Models (spec.md §6 "ModelStore"/"ModelExecute") --------------

    /// Register a model: resolves `backend`, asks it to construct a
    /// handle from `definition`, and stores the result.
    #[allow(clippy::too_many_arguments)]
    pub fn model_store(
        &self,
        branch: BranchId,
        name: impl Into<String>,
        backend: BackendKind,
        device: impl Into<String>,
        tag: impl Into<String>,
        batch_policy: BatchPolicy,
        inputs: Vec<String>,
        outputs: Vec<String>,
        definition: Vec<u8>,
    ) -> StrataResult<()> {
        let device = device.into();
        let handle = self
            .backends
            .resolve(backend, self.config.backends_dir.as_deref())?
            .model_create(&device, &definition)?;
        let model = Model::new(
            backend,
            device,
            tag,
            batch_policy,
            inputs,
            outputs,
            definition,
            handle,
        );
        self.models.put(branch, name, model);
        Ok(())
    }

    /// This model's run counters (spec.md §2 RunStats, SPEC_FULL.md §F.1).
    pub fn model_stats(&self, branch: BranchId, name: &str) -> StrataResult<RunStatsSnapshot> {
        self.models
            .get(branch, name)
            .map(|m| m.stats())
            .ok_or_else(|| StrataError::not_found(EntityRef::model(branch, name)))
    }

    /// One-shot model run (spec.md §6 "`ModelExecute`"): loads
    /// `input_keys` from the keyspace, runs `model_key`, and persists
    /// the results under `output_keys`. Internally just a one-op DAG.
    pub fn model_execute(
        &self,
        branch: BranchId,
        model_key: &str,
        input_keys: &[String],
        output_keys: &[String],
        timeout_ms: Option<u64>,
    ) -> DagOutcome {
        let mut tokens = Vec::new();
        push_load(&mut tokens, input_keys);
        push_persist(&mut tokens, output_keys);
        push_timeout(&mut tokens, timeout_ms);
        tokens.push(CmdArg::Word("|>".to_string()));
        tokens.push(CmdArg::Word("MODELRUN".to_string()));
        tokens.push(CmdArg::Word(model_key.to_string()));
        tokens.push(CmdArg::Word("INPUTS".to_string()));
        push_name_list(&mut tokens, input_keys);
        tokens.push(CmdArg::Word("OUTPUTS".to_string()));
        push_name_list(&mut tokens, output_keys);
        self.run_dag(branch, &tokens, false)
    }

    // -- Scripts (spec.md §6 "ScriptStore"/"ScriptExecute") -----------

    /// Register a script. Scripts compile against the TorchScript
    /// backend (the only backend the original system's script runtime
    /// ever targeted — see DESIGN.md); `ScriptStore` itself names no
    /// backend, unlike `ModelStore`.
    pub fn script_store(
        &self,
        branch: BranchId,
        name: impl Into<String>,
        device: impl Into<String>,
        tag: impl Into<String>,
        source: impl Into<String>,
        entry_points: Vec<String>,
    ) -> StrataResult<()> {
        let device = device.into();
        let source = source.into();
        let handle = self
            .backends
            .resolve(BackendKind::Torch, self.config.backends_dir.as_deref())?
            .script_create(&device, &source)?;
        let script = Script::new(device, tag, source, entry_points, handle);
        self.scripts.put(branch, name, script);
        Ok(())
    }

    /// This script's run counters.
    pub fn script_stats(&self, branch: BranchId, name: &str) -> StrataResult<RunStatsSnapshot> {
        self.scripts
            .get(branch, name)
            .map(|s| s.stats())
            .ok_or_else(|| StrataError::not_found(EntityRef::script(branch, name)))
    }

    /// One-shot script run (spec.md §6 "`ScriptExecute`").
    #[allow(clippy::too_many_arguments)]
    pub fn script_execute(
        &self,
        branch: BranchId,
        script_key: &str,
        function: &str,
        input_keys: &[String],
        output_keys: &[String],
        args: &[String],
        key_refs: &[String],
        timeout_ms: Option<u64>,
    ) -> DagOutcome {
        let mut tokens = Vec::new();
        push_load(&mut tokens, input_keys);
        push_persist(&mut tokens, output_keys);
        push_timeout(&mut tokens, timeout_ms);
        tokens.push(CmdArg::Word("|>".to_string()));
        tokens.push(CmdArg::Word("SCRIPTRUN".to_string()));
        tokens.push(CmdArg::Word(script_key.to_string()));
        tokens.push(CmdArg::Word(function.to_string()));
        tokens.push(CmdArg::Word("INPUTS".to_string()));
        push_name_list(&mut tokens, input_keys);
        tokens.push(CmdArg::Word("OUTPUTS".to_string()));
        push_name_list(&mut tokens, output_keys);
        if !args.is_empty() {
            tokens.push(CmdArg::Word("ARGS".to_string()));
            push_name_list(&mut tokens, args);
        }
        if !key_refs.is_empty() {
            tokens.push(CmdArg::Word("KEYS".to_string()));
            push_name_list(&mut tokens, key_refs);
        }
        self.run_dag(branch, &tokens, false)
    }

    // -- DAGs (spec.md §6 "DagExecute"/"DagExecute_RO") ---------------

    /// Plan and run a read-write DAG (`|>`-separated ops, with an
    /// optional `ROUTING`/`LOAD`/`PERSIST`/`TIMEOUT` preamble).
    pub fn dag_execute(&self, branch: BranchId, tokens: &[CmdArg]) -> DagOutcome {
        self.run_dag(branch, tokens, false)
    }

    /// Plan and run a read-only DAG: `PERSIST` and `ScriptRun` are
    /// rejected at planning time (spec.md §4.3).
    pub fn dag_execute_ro(&self, branch: BranchId, tokens: &[CmdArg]) -> DagOutcome {
        self.run_dag(branch, tokens, true)
    }

    fn run_dag(&self, branch: BranchId, tokens: &[CmdArg], read_only: bool) -> DagOutcome {
        let planner = DagPlanner::new(&self.tensors, &self.models, &self.scripts, branch);
        let planned = match planner.plan(tokens, read_only) {
            Ok(p) => p,
            Err(e) => return DagOutcome::PlanningError(e.reply_message()),
        };

        let mut devices: Vec<&str> = planned.ops.iter().map(|op| op.device.as_str()).collect();
        devices.sort_unstable();
        devices.dedup();
        let device_count = devices.len().max(1);
        let single_device = device_count <= 1;

        let tensors = Arc::clone(&self.tensors);
        let durability_mode = self.config.durability_mode;
        let durability_log = Arc::clone(&self.durability_log);
        let durability_pending = Arc::clone(&self.durability_pending);
        let on_finish: Box<dyn Fn(&Arc<RunInfo>) + Send + Sync> = Box::new(move |run| {
            // A timed-out run already sent its reply from the worker's
            // pop-side short-circuit (spec.md §4.8 item 1); nothing left
            // to persist or reply with here.
            if run.timed_out() {
                return;
            }
            let replies = build_replies(run);
            // Persistence only happens when nothing failed (spec.md §8
            // "Persistence only occurs when dag_error = false").
            if !run.dag_error() {
                for (name, slot) in &run.persist_set {
                    if let Some(tensor) = run.get_slot(*slot) {
                        match durability_mode {
                            DurabilityMode::Sync => {
                                durability_log.lock().push(strata_durability::encode_tensor(&tensor));
                            }
                            DurabilityMode::Periodic => {
                                durability_pending.lock().push(strata_durability::encode_tensor(&tensor));
                            }
                            DurabilityMode::None => {}
                        }
                        tensors.put(branch, name.clone(), tensor);
                    }
                }
            }
            run.reply(DagOutcome::Completed(replies));
        });

        let (reply_tx, reply_rx) = sync_channel(1);
        let run = RunInfo::new(
            planned.ops,
            planned.shared_tensors,
            planned.persist_set,
            single_device,
            device_count,
            planned.timeout_ms,
            reply_tx,
            on_finish,
        );
        self.workers.submit(run);
        reply_rx.recv().unwrap_or_else(|_| {
            DagOutcome::PlanningError("worker pool dropped the reply channel".to_string())
        })
    }
}

fn push_name_list(tokens: &mut Vec<CmdArg>, names: &[String]) {
    tokens.push(CmdArg::Word(names.len().to_string()));
    tokens.extend(names.iter().cloned().map(CmdArg::Word));
}

fn push_load(tokens: &mut Vec<CmdArg>, input_keys: &[String]) {
    tokens.push(CmdArg::Word("LOAD".to_string()));
    push_name_list(tokens, input_keys);
}

fn push_persist(tokens: &mut Vec<CmdArg>, output_keys: &[String]) {
    tokens.push(CmdArg::Word("PERSIST".to_string()));
    push_name_list(tokens, output_keys);
}

fn push_timeout(tokens: &mut Vec<CmdArg>, timeout_ms: Option<u64>) {
    if let Some(ms) = timeout_ms {
        tokens.push(CmdArg::Word("TIMEOUT".to_string()));
        tokens.push(CmdArg::Word(ms.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendModelHandle, BackendScriptHandle, InferenceBackend};
    use crate::context::ModelCtx;
    use strata_core::{DType, Scalar};

    struct EchoHandle;
    impl BackendModelHandle for EchoHandle {
        fn run(&self, ctxs: &mut [ModelCtx]) -> StrataResult<()> {
            for ctx in ctxs.iter_mut() {
                let input = ctx.get_input(0)?.clone();
                ctx.set_output(0, input)?;
            }
            Ok(())
        }
        fn serialize(&self) -> StrataResult<Vec<u8>> {
            Ok(vec![])
        }
    }

    struct EchoScriptHandle;
    impl BackendScriptHandle for EchoScriptHandle {
        fn run(&self, function: &str, ctx: &mut crate::context::ScriptCtx) -> StrataResult<()> {
            if function == "fail" {
                return Err(StrataError::internal("script function failed"));
            }
            let input = ctx.get_input(0)?.clone();
            ctx.set_output(0, input)?;
            Ok(())
        }
    }

    struct EchoBackend;
    impl InferenceBackend for EchoBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Torch
        }
        fn model_create(&self, _device: &str, _definition: &[u8]) -> StrataResult<Arc<dyn BackendModelHandle>> {
            Ok(Arc::new(EchoHandle))
        }
        fn script_create(&self, _device: &str, _source: &str) -> StrataResult<Arc<dyn BackendScriptHandle>> {
            Ok(Arc::new(EchoScriptHandle))
        }
    }

    fn tensor(v: f64) -> Tensor {
        Tensor::from_values(DType::Float32, vec![1], &[Scalar::Number(v)]).unwrap()
    }

    fn words(s: &str) -> Vec<CmdArg> {
        s.split_whitespace().map(|w| CmdArg::Word(w.to_string())).collect()
    }

    #[test]
    fn tensor_set_then_get_round_trips() {
        let db = Database::new(StrataConfig::default());
        let branch = BranchId::default_branch();
        db.tensor_set(branch, "a", tensor(5.0));
        assert_eq!(db.tensor_get(branch, "a").unwrap().get_f64(0).unwrap(), 5.0);
    }

    #[test]
    fn tensor_get_missing_key_is_not_found() {
        let db = Database::new(StrataConfig::default());
        let branch = BranchId::default_branch();
        assert!(matches!(
            db.tensor_get(branch, "nope"),
            Err(StrataError::NotFound { .. })
        ));
    }

    #[test]
    fn dag_execute_runs_a_model_and_persists_output() {
        let db = Database::new(StrataConfig::default());
        db.backends().register(Arc::new(EchoBackend));
        let branch = BranchId::default_branch();
        db.model_store(
            branch,
            "m",
            BackendKind::Torch,
            "CPU",
            "v1",
            BatchPolicy::default(),
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        db.tensor_set(branch, "a", tensor(7.0));

        let tokens = words("LOAD 1 a PERSIST 1 out |> MODELRUN m INPUTS 1 a OUTPUTS 1 out");
        let outcome = db.dag_execute(branch, &tokens);
        assert!(matches!(outcome, DagOutcome::Completed(_)));
        assert_eq!(db.tensor_get(branch, "out").unwrap().get_f64(0).unwrap(), 7.0);
    }

    #[test]
    fn sync_durability_mode_logs_persisted_tensors_inline() {
        let config = StrataConfig {
            durability_mode: DurabilityMode::Sync,
            ..StrataConfig::default()
        };
        let db = Database::new(config);
        db.backends().register(Arc::new(EchoBackend));
        let branch = BranchId::default_branch();
        db.model_store(
            branch,
            "m",
            BackendKind::Torch,
            "CPU",
            "v1",
            BatchPolicy::default(),
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        db.tensor_set(branch, "a", tensor(1.0));

        let tokens = words("LOAD 1 a PERSIST 1 out |> MODELRUN m INPUTS 1 a OUTPUTS 1 out");
        let outcome = db.dag_execute(branch, &tokens);
        assert!(matches!(outcome, DagOutcome::Completed(_)));
        assert_eq!(db.durability_log_len(), 1);
        assert_eq!(db.pending_durability_count(), 0);
    }

    #[test]
    fn periodic_durability_mode_defers_until_flush() {
        let config = StrataConfig {
            durability_mode: DurabilityMode::Periodic,
            ..StrataConfig::default()
        };
        let db = Database::new(config);
        db.backends().register(Arc::new(EchoBackend));
        let branch = BranchId::default_branch();
        db.model_store(
            branch,
            "m",
            BackendKind::Torch,
            "CPU",
            "v1",
            BatchPolicy::default(),
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        db.tensor_set(branch, "a", tensor(3.0));

        let tokens = words("LOAD 1 a PERSIST 1 out |> MODELRUN m INPUTS 1 a OUTPUTS 1 out");
        db.dag_execute(branch, &tokens);
        assert_eq!(db.durability_log_len(), 0);
        assert_eq!(db.pending_durability_count(), 1);
        assert_eq!(db.flush_durability(), 1);
        assert_eq!(db.durability_log_len(), 1);
        assert_eq!(db.pending_durability_count(), 0);
    }

    #[test]
    fn dag_execute_ro_rejects_persist() {
        let db = Database::new(StrataConfig::default());
        let branch = BranchId::default_branch();
        let tokens = words("PERSIST 1 y |> TENSORSET y FLOAT 1 VALUES 1");
        let outcome = db.dag_execute_ro(branch, &tokens);
        assert!(matches!(outcome, DagOutcome::PlanningError(_)));
    }

    #[test]
    fn empty_dag_is_a_planning_error() {
        let db = Database::new(StrataConfig::default());
        let branch = BranchId::default_branch();
        let outcome = db.dag_execute(branch, &[]);
        match outcome {
            DagOutcome::PlanningError(msg) => assert!(msg.contains("DAG is empty")),
            other => panic!("expected PlanningError, got {other:?}"),
        }
    }

    #[test]
    fn model_execute_is_a_one_shot_model_run() {
        let db = Database::new(StrataConfig::default());
        db.backends().register(Arc::new(EchoBackend));
        let branch = BranchId::default_branch();
        db.model_store(
            branch,
            "m",
            BackendKind::Torch,
            "CPU",
            "v1",
            BatchPolicy::default(),
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        db.tensor_set(branch, "a", tensor(3.0));

        let outcome = db.model_execute(
            branch,
            "m",
            &["a".to_string()],
            &["out".to_string()],
            None,
        );
        assert!(matches!(outcome, DagOutcome::Completed(_)));
        assert_eq!(db.tensor_get(branch, "out").unwrap().get_f64(0).unwrap(), 3.0);
        assert_eq!(db.model_stats(branch, "m").unwrap().calls, 1);
    }

    #[test]
    fn script_execute_is_a_one_shot_script_run() {
        let db = Database::new(StrataConfig::default());
        db.backends().register(Arc::new(EchoBackend));
        let branch = BranchId::default_branch();
        db.script_store(branch, "s", "CPU", "v1", "def f(x): return x", vec!["f".into()])
            .unwrap();
        db.tensor_set(branch, "a", tensor(9.0));

        let outcome = db.script_execute(
            branch,
            "s",
            "f",
            &["a".to_string()],
            &["out".to_string()],
            &[],
            &[],
            None,
        );
        assert!(matches!(outcome, DagOutcome::Completed(_)));
        assert_eq!(db.tensor_get(branch, "out").unwrap().get_f64(0).unwrap(), 9.0);
    }

    #[test]
    fn script_run_error_does_not_persist_output() {
        let db = Database::new(StrataConfig::default());
        db.backends().register(Arc::new(EchoBackend));
        let branch = BranchId::default_branch();
        db.script_store(
            branch,
            "s",
            "CPU",
            "v1",
            "def f(x): return x",
            vec!["f".into(), "fail".into()],
        )
        .unwrap();
        db.tensor_set(branch, "a", tensor(9.0));

        let tokens =
            words("LOAD 1 a PERSIST 1 out |> SCRIPTRUN s fail INPUTS 1 a OUTPUTS 1 out");
        let outcome = db.dag_execute(branch, &tokens);
        match outcome {
            DagOutcome::Completed(_) => {}
            other => panic!("expected Completed with an op-level error, got {other:?}"),
        }
        assert!(db.tensor_get(branch, "out").is_err());
    }

    #[test]
    fn tick_timeouts_on_empty_registry_terminates_nothing() {
        let db = Database::new(StrataConfig::default());
        assert_eq!(db.tick_timeouts(0), 0);
    }
}
