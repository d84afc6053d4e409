//! The wire command surface (spec.md §6 "Submission-side commands").
//!
//! Tokenizing raw request bytes into these shapes is explicitly out of
//! scope (spec.md §1 "command-line parsing plumbing... treated as
//! external collaborators"): a caller wiring this crate to an actual
//! protocol (RESP, gRPC, whatever) does that split itself and builds a
//! `Command`. `DagExecute`/`DagExecute_RO` are the one exception — their
//! body is genuinely part of the core (C8's planner lives in
//! `strata-engine`), so those two variants carry pre-tokenized
//! [`CmdArg`]s rather than a parsed structure.
//!
//! Only the `*Execute` forms are implemented; see DESIGN.md's Open
//! Questions entry for why the deprecated `ModelRun`/`ScriptRun`/`DagRun`
//! aliases are not.

use crate::types::{ExecuteOptions, ModelStoreOptions, ScriptStoreOptions, TensorData};
use strata_engine::{BackendKind, CmdArg};

/// One submission-side command (spec.md §6).
#[derive(Debug, Clone)]
pub enum Command {
    /// `TensorSet key dtype shape… {VALUES v…|BLOB b}`.
    TensorSet {
        /// The key to create/overwrite.
        key: String,
        /// The tensor's dtype, as its wire name.
        dtype: String,
        /// The tensor's shape.
        shape: Vec<usize>,
        /// The tensor's data.
        data: TensorData,
    },
    /// `TensorGet key [META] [VALUES|BLOB]`.
    TensorGet {
        /// The key to read.
        key: String,
        /// How to render the result.
        format: crate::types::TensorReadFormat,
    },
    /// `ModelStore key backend device [TAG t] [BATCHSIZE …] [INPUTS …
    /// OUTPUTS …] BLOB chunk…`.
    ModelStore {
        /// The key to register the model under.
        key: String,
        /// Which framework backs this model.
        backend: BackendKind,
        /// The device string.
        device: String,
        /// The model's serialized definition.
        definition: Vec<u8>,
        /// Everything optional.
        options: ModelStoreOptions,
    },
    /// `ModelExecute model_key INPUTS nI key… OUTPUTS nO key… [TIMEOUT
    /// ms]`.
    ModelExecute {
        /// The model to run.
        model_key: String,
        /// Keyspace keys to load as inputs, in declared order.
        inputs: Vec<String>,
        /// Keyspace keys to persist outputs under.
        outputs: Vec<String>,
        /// Everything optional.
        options: ExecuteOptions,
    },
    /// `ScriptStore key device [TAG t] [ENTRY_POINTS n name…] SOURCE
    /// src`.
    ScriptStore {
        /// The key to register the script under.
        key: String,
        /// The device string.
        device: String,
        /// The script's source text.
        source: String,
        /// Everything optional.
        options: ScriptStoreOptions,
    },
    /// `ScriptExecute script_key func [KEYS n key…] [INPUTS nI …]
    /// [OUTPUTS nO key…] [ARGS n arg…] [TIMEOUT ms]`.
    ScriptExecute {
        /// The script to run.
        script_key: String,
        /// The entry-point function name.
        function: String,
        /// Keyspace keys to load as inputs.
        inputs: Vec<String>,
        /// Keyspace keys to persist outputs under.
        outputs: Vec<String>,
        /// Everything optional.
        options: ExecuteOptions,
    },
    /// `DagExecute [ROUTING key] [LOAD n key…] [PERSIST n key…] [TIMEOUT
    /// ms] (|> op)+` — read-write.
    DagExecute {
        /// Pre-tokenized command body.
        tokens: Vec<CmdArg>,
    },
    /// `DagExecute_RO` — same grammar, `PERSIST`/`SCRIPTRUN` rejected at
    /// planning time.
    DagExecuteRo {
        /// Pre-tokenized command body.
        tokens: Vec<CmdArg>,
    },
    /// Read a model's run counters (not part of spec.md §6's listed
    /// wire surface, but spec.md §2 names `RunStats` as a first-class
    /// component and every counter it tracks needs a read path).
    ModelStats {
        /// The model to inspect.
        key: String,
    },
    /// Read a script's run counters.
    ScriptStats {
        /// The script to inspect.
        key: String,
    },
}
