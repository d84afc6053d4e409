//! End-to-end coverage of the six concrete scenarios in spec.md §8,
//! driven through `Database::dag_execute` with the bundled CPU reference
//! backend doing the actual model/script work — the same path
//! `strata-executor::Strata` drives from the wire surface.

use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_core::{BranchId, DType, Scalar, StrataResult, Tensor};
use strata_engine::{
    BackendKind, BackendModelHandle, BatchPolicy, DagOutcome, Database, ModelCtx, StrataConfig,
};
use strata_intelligence::CpuReferenceBackend;

fn words(s: &str) -> Vec<strata_engine::CmdArg> {
    s.split_whitespace()
        .map(|w| strata_engine::CmdArg::Word(w.to_string()))
        .collect()
}

fn install_cpu_reference(db: &Database) {
    db.backends().register(Arc::new(CpuReferenceBackend::new(BackendKind::Torch)));
}

fn float_tensor(values: &[f64]) -> Tensor {
    Tensor::from_values(
        DType::Float32,
        vec![2, 2],
        &values.iter().map(|v| Scalar::Number(*v)).collect::<Vec<_>>(),
    )
    .unwrap()
}

fn replies_of(outcome: DagOutcome) -> Vec<strata_engine::OpReply> {
    match outcome {
        DagOutcome::Completed(replies) => replies,
        other => panic!("expected Completed, got {other:?}"),
    }
}

/// Scenario 1: `a = b = float32[2,2] {2,3,2,3}`, model `m` multiplies
/// element-wise. `LOAD a b |> ModelRun m INPUTS a,b OUTPUTS out |>
/// TensorGet out VALUES` must reply `[4, 9, 4, 9]` as float64.
#[test]
fn scenario_one_simple_model_dag_multiplies_elementwise() {
    let db = Database::new(StrataConfig::default());
    install_cpu_reference(&db);
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
        b"MULTIPLY".to_vec(),
    )
    .unwrap();
    db.tensor_set(branch, "a", float_tensor(&[2.0, 3.0, 2.0, 3.0]));
    db.tensor_set(branch, "b", float_tensor(&[2.0, 3.0, 2.0, 3.0]));

    let tokens = words(
        "LOAD 2 a b |> MODELRUN m INPUTS 2 a b OUTPUTS 1 out |> TENSORGET out VALUES",
    );
    let replies = replies_of(db.dag_execute(branch, &tokens));
    assert_eq!(replies.len(), 2);
    match &replies[1] {
        strata_engine::OpReply::Tensor(out) => {
            let got: Vec<f64> = (0..out.len()).map(|i| out.get_f64(i).unwrap()).collect();
            assert_eq!(got, vec![4.0, 9.0, 4.0, 9.0]);
        }
        other => panic!("expected a tensor reply, got {other:?}"),
    }
    let persisted = db.tensor_get(branch, "out").unwrap();
    assert_eq!(persisted.get_f64(0).unwrap(), 4.0);
}

/// Scenario 2: script `s` defines `bar(x,y) = x + y + x`.
/// `TensorSet in1, in2 |> ScriptRun s bar INPUTS in1,in2 OUTPUTS out |>
/// TensorGet out VALUES` must reply `[4, 6, 4, 6]`.
#[test]
fn scenario_two_script_pipeline_runs_chained_expression() {
    let db = Database::new(StrataConfig::default());
    install_cpu_reference(&db);
    let branch = BranchId::default_branch();

    db.script_store(branch, "s", "CPU", "v1", "bar(x, y) = x + y + x", vec!["bar".into()])
        .unwrap();

    let tokens = words(
        "|> TENSORSET in1 FLOAT 2 2 VALUES 2 3 2 3 \
         |> TENSORSET in2 FLOAT 2 2 VALUES 2 3 2 3 \
         |> SCRIPTRUN s bar INPUTS 2 in1 in2 OUTPUTS 1 out \
         |> TENSORGET out VALUES",
    );
    let replies = replies_of(db.dag_execute(branch, &tokens));
    match &replies[3] {
        strata_engine::OpReply::Tensor(out) => {
            let got: Vec<f64> = (0..out.len()).map(|i| out.get_f64(i).unwrap()).collect();
            assert_eq!(got, vec![4.0, 6.0, 4.0, 6.0]);
        }
        other => panic!("expected a tensor reply, got {other:?}"),
    }
}

/// Scenario 3: same inputs, script run against a nonexistent function
/// name. The DAG completes (no planning error, since this script
/// declared no fixed entry points) with an op-level error and `out` is
/// never persisted.
#[test]
fn scenario_three_script_error_path_does_not_persist_output() {
    let db = Database::new(StrataConfig::default());
    install_cpu_reference(&db);
    let branch = BranchId::default_branch();

    db.script_store(branch, "s", "CPU", "v1", "bar(x, y) = x + y + x", vec![])
        .unwrap();

    let tokens = words(
        "|> TENSORSET in1 FLOAT 2 2 VALUES 2 3 2 3 \
         |> TENSORSET in2 FLOAT 2 2 VALUES 2 3 2 3 \
         |> SCRIPTRUN s no_function INPUTS 2 in1 in2 OUTPUTS 1 out",
    );
    let replies = replies_of(db.dag_execute(branch, &tokens));
    assert!(matches!(replies.last(), Some(strata_engine::OpReply::Error(_))));
    assert!(db.tensor_get(branch, "out").is_err());
}

/// Scenario 4: an empty DAG is rejected with the wire-level `ERR DAG is
/// empty` message.
#[test]
fn scenario_four_empty_dag_is_a_planning_error() {
    let db = Database::new(StrataConfig::default());
    let branch = BranchId::default_branch();
    match db.dag_execute(branch, &[]) {
        DagOutcome::PlanningError(msg) => assert_eq!(msg, "DAG is empty"),
        other => panic!("expected PlanningError, got {other:?}"),
    }
}

/// Scenario 5: a DAG op references an input that no `LOAD`/`TensorSet`
/// and no earlier op produced.
#[test]
fn scenario_five_unresolved_input_is_key_missing() {
    let db = Database::new(StrataConfig::default());
    install_cpu_reference(&db);
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
        b"IDENTITY".to_vec(),
    )
    .unwrap();

    let tokens = words("|> MODELRUN m INPUTS 1 never_produced OUTPUTS 1 out");
    match db.dag_execute(branch, &tokens) {
        DagOutcome::PlanningError(msg) => {
            assert_eq!(msg, "INPUT key cannot be found in DAG");
        }
        other => panic!("expected PlanningError, got {other:?}"),
    }
}

/// A model handle that sleeps before producing its (fixed) output, so a
/// test can observe whether two runs on different devices overlap in
/// wall-clock time.
struct SlowEcho {
    delay: Duration,
}

impl BackendModelHandle for SlowEcho {
    fn run(&self, ctxs: &mut [ModelCtx]) -> StrataResult<()> {
        std::thread::sleep(self.delay);
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

struct SlowEchoBackend {
    delay: Duration,
}

impl strata_engine::InferenceBackend for SlowEchoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Onnx
    }
    fn model_create(&self, _device: &str, _definition: &[u8]) -> StrataResult<Arc<dyn BackendModelHandle>> {
        Ok(Arc::new(SlowEcho { delay: self.delay }))
    }
    fn script_create(
        &self,
        _device: &str,
        _source: &str,
    ) -> StrataResult<Arc<dyn strata_engine::BackendScriptHandle>> {
        unreachable!("scenario six has no scripts")
    }
}

/// Scenario 6 (resnet-style cross-device DAG), in spirit: two `ModelRun`
/// ops on distinct devices (`GPU:0`/`GPU:1`) must execute with temporal
/// overlap, since they depend only on the same loaded input and nothing
/// else in the DAG — the per-device worker pool runs them concurrently,
/// never serializing independent devices behind one queue.
#[test]
fn scenario_six_cross_device_ops_overlap_in_time() {
    let db = Database::new(StrataConfig::default());
    let delay = Duration::from_millis(150);
    db.backends().register(Arc::new(SlowEchoBackend { delay }));
    let branch = BranchId::default_branch();

    db.model_store(
        branch,
        "network_a",
        BackendKind::Onnx,
        "GPU:0",
        "v1",
        BatchPolicy::default(),
        vec![],
        vec![],
        vec![],
    )
    .unwrap();
    db.model_store(
        branch,
        "network_b",
        BackendKind::Onnx,
        "GPU:1",
        "v1",
        BatchPolicy::default(),
        vec![],
        vec![],
        vec![],
    )
    .unwrap();
    db.tensor_set(branch, "image", float_tensor(&[1.0, 2.0, 3.0, 4.0]));

    let tokens = words(
        "LOAD 1 image \
         |> MODELRUN network_a INPUTS 1 image OUTPUTS 1 out_a \
         |> MODELRUN network_b INPUTS 1 image OUTPUTS 1 out_b",
    );
    let start = Instant::now();
    let replies = replies_of(db.dag_execute(branch, &tokens));
    let elapsed = start.elapsed();
    assert_eq!(replies.len(), 2);

    // Serial execution would take ~2x delay; concurrent execution on
    // two device queues takes ~1x delay plus scheduling overhead.
    assert!(
        elapsed < delay * 2,
        "expected the two device-local runs to overlap, took {elapsed:?} for a {delay:?} delay each"
    );
}
