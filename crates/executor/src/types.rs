//! Small request/response shapes specific to the wire-facing API —
//! everything that doesn't already live in `strata-engine` or
//! `strata-wire`.

use strata_engine::BatchPolicy;

/// How a `TensorSet` command supplies its data (spec.md §6 "`TensorSet
/// key dtype shape… {VALUES v…|BLOB b}`").
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// Scalar literals, one per element, parsed against the declared
    /// dtype.
    Values(Vec<String>),
    /// A raw blob, already decoded from whatever transport encoding the
    /// caller used (base64, for a text wire — see
    /// `strata_wire::decode_blob`).
    Blob(Vec<u8>),
}

/// How a `TensorGet` command wants its result rendered (spec.md §6
/// "`TensorGet key [META] [VALUES|BLOB]`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorReadFormat {
    /// Parsed values (the default).
    #[default]
    Values,
    /// Raw blob.
    Blob,
    /// Shape/dtype only, no data.
    Meta,
}

/// Optional fields on a `ModelStore` command beyond the required
/// backend/device (spec.md §6 "`[TAG t] [BATCHSIZE n [MINBATCHSIZE m
/// [MINBATCHTIMEOUT ms]]] [INPUTS nI name… OUTPUTS nO name…]`").
#[derive(Debug, Clone, Default)]
pub struct ModelStoreOptions {
    /// `TAG` value.
    pub tag: Option<String>,
    /// Batch policy; defaults to batching disabled.
    pub batch_policy: BatchPolicy,
    /// Declared input names, if the framework requires them.
    pub inputs: Vec<String>,
    /// Declared output names, if the framework requires them.
    pub outputs: Vec<String>,
}

/// Optional fields on a `ScriptStore` command (spec.md §6 "`[TAG t]
/// [ENTRY_POINTS n name…]`").
#[derive(Debug, Clone, Default)]
pub struct ScriptStoreOptions {
    /// `TAG` value.
    pub tag: Option<String>,
    /// Declared entry-point names.
    pub entry_points: Vec<String>,
}

/// Optional fields on a `ModelExecute`/`ScriptExecute` one-shot run
/// (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// `TIMEOUT ms`, if supplied.
    pub timeout_ms: Option<u64>,
    /// `ARGS n arg…`, `ScriptExecute` only.
    pub args: Vec<String>,
    /// `KEYS n key…`, `ScriptExecute` only.
    pub keys: Vec<String>,
}
