//! The command execution layer: the seam between a wire protocol and
//! [`strata_engine::Database`].
//!
//! `Strata` is what an embedder actually opens. It owns one `Database`
//! (the DAG engine, spec.md's "core") plus the access-mode gate
//! `strata-security` defines, and installs the default backend loader
//! from `strata-intelligence` at construction time so every backend kind
//! spec.md names resolves to at least the bundled CPU reference
//! implementation out of the box (spec.md §4.2).
//!
//! [`Command`]/[`Output`] give a single `execute` entry point for a
//! caller that wants one dispatch seam (mirroring the teacher's
//! `Command`-enum executor); the per-command methods below it are
//! thinner convenience wrappers over the same logic for a caller that
//! already knows which one it wants.

pub mod command;
pub mod error;
pub mod output;
pub mod types;

pub use command::Command;
pub use error::{Error, Result};
pub use output::Output;
pub use types::{
    ExecuteOptions, ModelStoreOptions, ScriptStoreOptions, TensorData, TensorReadFormat,
};

pub use strata_core::BranchId;
pub use strata_engine::{
    BackendKind, BatchPolicy, CmdArg, DurabilityMode, RunStatsSnapshot, StrataConfig,
};
pub use strata_security::{AccessMode, OpenOptions};
pub use strata_wire::{Reply, TensorEncoding, TensorPayload};

use strata_core::{DType, Scalar, Tensor};
use strata_engine::{parse_scalar, Database};
use uuid::Uuid;

/// An open Strata database: the engine plus the access-mode gate.
pub struct Strata {
    db: Database,
    access_mode: AccessMode,
}

impl Strata {
    /// Open a fresh database under `config`, read-write.
    pub fn open(config: StrataConfig) -> Self {
        Self::open_with_options(config, OpenOptions::default())
    }

    /// Open a fresh database under `config` with an explicit
    /// [`OpenOptions`] (e.g. [`AccessMode::ReadOnly`]).
    pub fn open_with_options(config: StrataConfig, options: OpenOptions) -> Self {
        let db = Database::new(config);
        strata_intelligence::install_default_backends(db.backends());
        Strata {
            db,
            access_mode: options.access_mode,
        }
    }

    /// The access mode this database was opened with.
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &StrataConfig {
        self.db.config()
    }

    /// Drive the ONNX cooperative-cancellation sweep (spec.md §4.7); a
    /// caller is expected to invoke this on a fixed interval, the "cron"
    /// the spec treats as an external collaborator.
    pub fn tick_timeouts(&self, now_ms: u64) -> usize {
        self.db.tick_timeouts(now_ms)
    }

    /// Drain every device worker thread and join them.
    pub fn shutdown(&mut self) {
        self.db.shutdown();
    }

    fn require_write(&self) -> Result<()> {
        if self.access_mode == AccessMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Dispatch a single pre-built [`Command`].
    pub fn execute(&self, branch: BranchId, command: Command) -> Result<Output> {
        match command {
            Command::TensorSet {
                key,
                dtype,
                shape,
                data,
            } => {
                self.tensor_set(branch, key, &dtype, shape, data)?;
                Ok(Output::Unit)
            }
            Command::TensorGet { key, format } => {
                Ok(Output::Tensor(self.tensor_get(branch, &key, format)?))
            }
            Command::ModelStore {
                key,
                backend,
                device,
                definition,
                options,
            } => {
                self.model_store(branch, key, backend, device, definition, options)?;
                Ok(Output::Unit)
            }
            Command::ModelExecute {
                model_key,
                inputs,
                outputs,
                options,
            } => Ok(Output::Replies(self.model_execute(
                branch, &model_key, &inputs, &outputs, options,
            ))),
            Command::ScriptStore {
                key,
                device,
                source,
                options,
            } => {
                self.script_store(branch, key, device, source, options)?;
                Ok(Output::Unit)
            }
            Command::ScriptExecute {
                script_key,
                function,
                inputs,
                outputs,
                options,
            } => Ok(Output::Replies(self.script_execute(
                branch,
                &script_key,
                &function,
                &inputs,
                &outputs,
                options,
            ))),
            Command::DagExecute { tokens } => {
                Ok(Output::Replies(self.dag_execute(branch, &tokens)))
            }
            Command::DagExecuteRo { tokens } => {
                Ok(Output::Replies(self.dag_execute_ro(branch, &tokens)))
            }
            Command::ModelStats { key } => Ok(Output::Stats(self.model_stats(branch, &key)?)),
            Command::ScriptStats { key } => Ok(Output::Stats(self.script_stats(branch, &key)?)),
        }
    }

    // -- Tensors -------------------------------------------------------

    /// Create or overwrite a tensor (spec.md §6 "`TensorSet`").
    pub fn tensor_set(
        &self,
        branch: BranchId,
        key: impl Into<String>,
        dtype: &str,
        shape: Vec<usize>,
        data: TensorData,
    ) -> Result<()> {
        self.require_write()?;
        let dtype = DType::parse(dtype)?;
        let tensor = match data {
            TensorData::Blob(blob) => Tensor::from_blob(dtype, shape, blob)?,
            TensorData::Values(words) => {
                let values: std::result::Result<Vec<Scalar>, _> = words
                    .iter()
                    .map(|w| parse_scalar(dtype, w))
                    .collect();
                Tensor::from_values(dtype, shape, &values?)?
            }
        };
        self.db.tensor_set(branch, key, tensor);
        Ok(())
    }

    /// Read a tensor (spec.md §6 "`TensorGet`").
    pub fn tensor_get(
        &self,
        branch: BranchId,
        key: &str,
        format: TensorReadFormat,
    ) -> Result<TensorPayload> {
        let tensor = self.db.tensor_get(branch, key)?;
        Ok(match format {
            TensorReadFormat::Meta => strata_wire::render_meta(&tensor),
            TensorReadFormat::Blob => strata_wire::render_blob(&tensor),
            TensorReadFormat::Values => strata_wire::render_values(&tensor)?,
        })
    }

    // -- Models ----------------------------------------------------------

    /// Register a model (spec.md §6 "`ModelStore`").
    #[allow(clippy::too_many_arguments)]
    pub fn model_store(
        &self,
        branch: BranchId,
        key: impl Into<String>,
        backend: BackendKind,
        device: impl Into<String>,
        definition: Vec<u8>,
        options: ModelStoreOptions,
    ) -> Result<()> {
        self.require_write()?;
        self.db.model_store(
            branch,
            key,
            backend,
            device,
            options.tag.unwrap_or_default(),
            options.batch_policy,
            options.inputs,
            options.outputs,
            definition,
        )?;
        Ok(())
    }

    /// One-shot model run (spec.md §6 "`ModelExecute`"): internally a
    /// single-op DAG, so it never fails at the `Result` level — errors
    /// surface inline as an `Error` reply (spec.md §8 "A single op's
    /// error is surfaced but does not abort replies for earlier ops").
    pub fn model_execute(
        &self,
        branch: BranchId,
        model_key: &str,
        inputs: &[String],
        outputs: &[String],
        options: ExecuteOptions,
    ) -> Vec<Reply> {
        if let Err(e) = self.require_write() {
            return vec![Reply::Error(e.to_string())];
        }
        let run_id = Uuid::new_v4();
        let _span =
            tracing::info_span!("model_execute", %run_id, model = model_key).entered();
        let outcome = self
            .db
            .model_execute(branch, model_key, inputs, outputs, options.timeout_ms);
        strata_wire::render_dag_outcome(&outcome)
    }

    /// This model's run counters.
    pub fn model_stats(&self, branch: BranchId, key: &str) -> Result<RunStatsSnapshot> {
        Ok(self.db.model_stats(branch, key)?)
    }

    // -- Scripts ---------------------------------------------------------

    /// Register a script (spec.md §6 "`ScriptStore`").
    pub fn script_store(
        &self,
        branch: BranchId,
        key: impl Into<String>,
        device: impl Into<String>,
        source: impl Into<String>,
        options: ScriptStoreOptions,
    ) -> Result<()> {
        self.require_write()?;
        self.db.script_store(
            branch,
            key,
            device,
            options.tag.unwrap_or_default(),
            source,
            options.entry_points,
        )?;
        Ok(())
    }

    /// One-shot script run (spec.md §6 "`ScriptExecute`").
    #[allow(clippy::too_many_arguments)]
    pub fn script_execute(
        &self,
        branch: BranchId,
        script_key: &str,
        function: &str,
        inputs: &[String],
        outputs: &[String],
        options: ExecuteOptions,
    ) -> Vec<Reply> {
        if let Err(e) = self.require_write() {
            return vec![Reply::Error(e.to_string())];
        }
        let run_id = Uuid::new_v4();
        let _span =
            tracing::info_span!("script_execute", %run_id, script = script_key, function)
                .entered();
        let outcome = self.db.script_execute(
            branch,
            script_key,
            function,
            inputs,
            outputs,
            &options.args,
            &options.keys,
            options.timeout_ms,
        );
        strata_wire::render_dag_outcome(&outcome)
    }

    /// This script's run counters.
    pub fn script_stats(&self, branch: BranchId, key: &str) -> Result<RunStatsSnapshot> {
        Ok(self.db.script_stats(branch, key)?)
    }

    // -- DAGs --------------------------------------------------------------

    /// Plan and run a read-write DAG (spec.md §6 "`DagExecute`").
    pub fn dag_execute(&self, branch: BranchId, tokens: &[CmdArg]) -> Vec<Reply> {
        if let Err(e) = self.require_write() {
            return vec![Reply::Error(e.to_string())];
        }
        let run_id = Uuid::new_v4();
        let _span = tracing::info_span!("dag_execute", %run_id, ops = tokens.len()).entered();
        let outcome = self.db.dag_execute(branch, tokens);
        strata_wire::render_dag_outcome(&outcome)
    }

    /// Plan and run a read-only DAG (spec.md §6 "`DagExecute_RO`").
    pub fn dag_execute_ro(&self, branch: BranchId, tokens: &[CmdArg]) -> Vec<Reply> {
        if let Err(e) = self.require_write() {
            return vec![Reply::Error(e.to_string())];
        }
        let run_id = Uuid::new_v4();
        let _span = tracing::info_span!("dag_execute_ro", %run_id, ops = tokens.len()).entered();
        let outcome = self.db.dag_execute_ro(branch, tokens);
        strata_wire::render_dag_outcome(&outcome)
    }
}
