//! Model objects (C4, spec.md §3 "Model").
//!
//! Refcounted identically to tensors: `Model` is a thin `Arc<Inner>`
//! wrapper, so a "shallow copy" (spec.md's ownership vocabulary) is just
//! `Model::clone()`. Persisted form lives in `strata-durability` as
//! [`strata_durability::ModelRecord`]; this type converts to/from it.

use crate::backend::{BackendModelHandle, BackendKind};
use crate::stats::{RunStats, RunStatsSnapshot};
use std::sync::Arc;
use strata_durability::ModelRecord;

/// A model's batch policy (spec.md §3 "batch policy
/// `{batchsize, minbatchsize, minbatchtimeout}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchPolicy {
    /// Maximum batch extent along the batch dimension. Zero disables
    /// batching.
    pub batchsize: u64,
    /// Minimum extent required before a partial batch may execute early.
    pub minbatchsize: u64,
    /// How long (ms) a partial batch may wait for more arrivals once
    /// `minbatchsize` hasn't been reached.
    pub minbatchtimeout_ms: u64,
}

struct Inner {
    backend: BackendKind,
    device: String,
    tag: String,
    batch_policy: BatchPolicy,
    inputs: Vec<String>,
    outputs: Vec<String>,
    definition: Vec<u8>,
    handle: Arc<dyn BackendModelHandle>,
    stats: RunStats,
}

/// A registered model: metadata, the serialized definition kept for
/// re-persistence, and the live backend handle.
#[derive(Clone)]
pub struct Model(Arc<Inner>);

impl Model {
    /// Construct a model around a freshly created backend handle.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: BackendKind,
        device: impl Into<String>,
        tag: impl Into<String>,
        batch_policy: BatchPolicy,
        inputs: Vec<String>,
        outputs: Vec<String>,
        definition: Vec<u8>,
        handle: Arc<dyn BackendModelHandle>,
    ) -> Self {
        Model(Arc::new(Inner {
            backend,
            device: device.into(),
            tag: tag.into(),
            batch_policy,
            inputs,
            outputs,
            definition,
            handle,
            stats: RunStats::new(),
        }))
    }

    /// Which framework backs this model.
    pub fn backend(&self) -> BackendKind {
        self.0.backend
    }

    /// The device string this model was registered for.
    pub fn device(&self) -> &str {
        &self.0.device
    }

    /// The user-supplied tag.
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    /// This model's batch policy.
    pub fn batch_policy(&self) -> BatchPolicy {
        self.0.batch_policy
    }

    /// Declared input names, if any (frameworks that don't require named
    /// I/O leave this empty).
    pub fn input_names(&self) -> &[String] {
        &self.0.inputs
    }

    /// Declared output names, if any.
    pub fn output_names(&self) -> &[String] {
        &self.0.outputs
    }

    /// The serialized definition, kept so the object can be re-emitted
    /// for persistence without asking the backend to serialize again.
    pub fn definition(&self) -> &[u8] {
        &self.0.definition
    }

    /// The live backend handle.
    pub fn handle(&self) -> &Arc<dyn BackendModelHandle> {
        &self.0.handle
    }

    /// This model's run counters.
    pub fn stats(&self) -> RunStatsSnapshot {
        self.0.stats.snapshot()
    }

    /// Record one invocation against this model's stats.
    pub fn record_run(&self, duration_us: u64, samples: u64, failed: bool) {
        self.0.stats.record(duration_us, samples, failed);
    }

    /// Two `Model` handles are the same object iff they share the
    /// backing `Arc`.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity key used by batching (spec.md §4.6 "referring to the
    /// same Model") — the backing allocation's address.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Map to the durability-layer persisted record (spec.md §6 "Model
    /// encoding"). `model_chunk_size` controls how the definition blob
    /// is split.
    pub fn to_record(&self, model_chunk_size: usize) -> ModelRecord {
        let chunk_size = model_chunk_size.max(1);
        let chunks = self
            .0
            .definition
            .chunks(chunk_size)
            .map(|c| c.to_vec())
            .collect();
        ModelRecord {
            backend: self.0.backend.to_string(),
            device: self.0.device.clone(),
            tag: self.0.tag.clone(),
            batchsize: self.0.batch_policy.batchsize,
            minbatchsize: self.0.batch_policy.minbatchsize,
            minbatchtimeout_ms: self.0.batch_policy.minbatchtimeout_ms,
            inputs: self.0.inputs.clone(),
            outputs: self.0.outputs.clone(),
            chunks,
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("backend", &self.0.backend)
            .field("device", &self.0.device)
            .field("tag", &self.0.tag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ModelCtx;
    use strata_core::StrataResult;

    struct StubHandle;
    impl BackendModelHandle for StubHandle {
        fn run(&self, _ctxs: &mut [ModelCtx]) -> StrataResult<()> {
            Ok(())
        }
        fn serialize(&self) -> StrataResult<Vec<u8>> {
            Ok(vec![])
        }
    }

    fn sample_model() -> Model {
        Model::new(
            BackendKind::Torch,
            "CPU",
            "v1",
            BatchPolicy {
                batchsize: 8,
                minbatchsize: 0,
                minbatchtimeout_ms: 0,
            },
            vec!["a".into(), "b".into()],
            vec!["out".into()],
            vec![1, 2, 3, 4, 5],
            Arc::new(StubHandle),
        )
    }

    #[test]
    fn to_record_splits_definition_into_chunks() {
        let model = sample_model();
        let record = model.to_record(2);
        assert_eq!(record.chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(record.backend, "TORCH");
    }

    #[test]
    fn clone_shares_identity() {
        let model = sample_model();
        let clone = model.clone();
        assert!(model.ptr_eq(&clone));
    }

    #[test]
    fn stats_start_empty_and_accumulate() {
        let model = sample_model();
        assert_eq!(model.stats().calls, 0);
        model.record_run(10, 1, false);
        assert_eq!(model.stats().calls, 1);
    }
}
