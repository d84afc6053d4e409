//! Execution contexts (C5, spec.md §4.2) — the polymorphic argument/result
//! bundle a worker hands to a backend for a single op.
//!
//! Following spec.md §9's redesign note, this is an explicit sum type
//! (`ExecutionCtx::{Model, Script}`) rather than a tagged, type-punned
//! pointer; dispatch in the worker loop is a plain `match`.

use strata_core::{StrataError, StrataResult, Tensor};

/// A typed, non-tensor script argument (spec.md §4.2 "typed inputs
/// (tensor, tensor-list, int, float, string, list-of-each)").
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    /// A single tensor input.
    Tensor(Tensor),
    /// A list of tensors.
    TensorList(Vec<Tensor>),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A free-form string.
    Str(String),
    /// A list of integers.
    IntList(Vec<i64>),
    /// A list of floats.
    FloatList(Vec<f64>),
    /// A list of strings.
    StrList(Vec<String>),
}

/// Arguments and result slots bound to a `Model` run (spec.md §4.2
/// "Model run context — bound to a Model; accepts inputs in
/// declared-order; may declare output placeholders.").
#[derive(Debug, Default)]
pub struct ModelCtx {
    inputs: Vec<Tensor>,
    outputs: Vec<Option<Tensor>>,
}

impl ModelCtx {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inputs added so far.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Take a shallow copy of `tensor` as the next positional input.
    pub fn add_input(&mut self, tensor: Tensor) {
        self.inputs.push(tensor);
    }

    /// Read back input `i`.
    pub fn get_input(&self, i: usize) -> StrataResult<&Tensor> {
        self.inputs
            .get(i)
            .ok_or_else(|| StrataError::internal(format!("model ctx: no input at index {i}")))
    }

    /// All inputs, in declared order.
    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    /// Number of output slots declared so far.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Reserve the next output slot, unpopulated until `set_output`.
    pub fn add_output_placeholder(&mut self) {
        self.outputs.push(None);
    }

    /// Stamp a result into output slot `i`.
    pub fn set_output(&mut self, i: usize, tensor: Tensor) -> StrataResult<()> {
        let slot = self
            .outputs
            .get_mut(i)
            .ok_or_else(|| StrataError::internal(format!("model ctx: no output slot {i}")))?;
        *slot = Some(tensor);
        Ok(())
    }

    /// Read back output `i`; fails if the backend never populated it.
    pub fn get_output(&self, i: usize) -> StrataResult<&Tensor> {
        self.outputs
            .get(i)
            .and_then(|o| o.as_ref())
            .ok_or_else(|| StrataError::internal(format!("model ctx: output {i} not populated")))
    }

    /// All output slots, in order (for the caller to stamp into
    /// `RunInfo::shared_tensors` after a successful run).
    pub fn outputs(&self) -> &[Option<Tensor>] {
        &self.outputs
    }
}

/// Arguments and result slots bound to a `Script` run (spec.md §4.2
/// "Script run context — bound to a Script + function name").
#[derive(Debug, Default)]
pub struct ScriptCtx {
    function: String,
    inputs: Vec<Tensor>,
    outputs: Vec<Option<Tensor>>,
    /// Additional typed, non-tensor arguments (spec.md "typed inputs ...
    /// int, float, string, list-of-each").
    args: Vec<ScriptArg>,
    /// Keyspace key names the script may call back into (spec.md §9
    /// "Script callbacks into the keyspace").
    key_refs: Vec<String>,
}

impl ScriptCtx {
    /// A context bound to `function`, with no inputs/outputs/args yet.
    pub fn new(function: impl Into<String>) -> Self {
        ScriptCtx {
            function: function.into(),
            ..Default::default()
        }
    }

    /// The bound entry-point name.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Number of tensor inputs added so far.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Take a shallow copy of `tensor` as the next positional input.
    pub fn add_input(&mut self, tensor: Tensor) {
        self.inputs.push(tensor);
    }

    /// Read back tensor input `i`.
    pub fn get_input(&self, i: usize) -> StrataResult<&Tensor> {
        self.inputs
            .get(i)
            .ok_or_else(|| StrataError::internal(format!("script ctx: no input at index {i}")))
    }

    /// All tensor inputs, in declared order.
    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    /// Number of output slots declared so far.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Reserve the next output slot.
    pub fn add_output_placeholder(&mut self) {
        self.outputs.push(None);
    }

    /// Stamp a result into output slot `i`.
    pub fn set_output(&mut self, i: usize, tensor: Tensor) -> StrataResult<()> {
        let slot = self
            .outputs
            .get_mut(i)
            .ok_or_else(|| StrataError::internal(format!("script ctx: no output slot {i}")))?;
        *slot = Some(tensor);
        Ok(())
    }

    /// Read back output `i`.
    pub fn get_output(&self, i: usize) -> StrataResult<&Tensor> {
        self.outputs
            .get(i)
            .and_then(|o| o.as_ref())
            .ok_or_else(|| StrataError::internal(format!("script ctx: output {i} not populated")))
    }

    /// All output slots, in order.
    pub fn outputs(&self) -> &[Option<Tensor>] {
        &self.outputs
    }

    /// Append a non-tensor argument.
    pub fn add_arg(&mut self, arg: ScriptArg) {
        self.args.push(arg);
    }

    /// All non-tensor arguments, in declared order.
    pub fn args(&self) -> &[ScriptArg] {
        &self.args
    }

    /// Grant the script runtime a keyspace key name it may call back
    /// into during `script_run` (capability-passing per spec.md §9; the
    /// caller is responsible for not holding engine locks across that
    /// call).
    pub fn add_key_ref(&mut self, key: impl Into<String>) {
        self.key_refs.push(key.into());
    }

    /// The key names granted to this script invocation.
    pub fn key_refs(&self) -> &[String] {
        &self.key_refs
    }
}

/// The per-op execution context, polymorphic over model-run and
/// script-run ops (spec.md §4.2, §9).
#[derive(Debug)]
pub enum ExecutionCtx {
    /// Bound to a model run.
    Model(ModelCtx),
    /// Bound to a script run.
    Script(ScriptCtx),
}

impl ExecutionCtx {
    /// Borrow the model context, failing with `FinishCtx` if this is
    /// actually a script context (spec.md §7 `FinishCtx`).
    pub fn as_model(&self) -> StrataResult<&ModelCtx> {
        match self {
            ExecutionCtx::Model(ctx) => Ok(ctx),
            ExecutionCtx::Script(_) => Err(StrataError::FinishCtx {
                message: "expected a model-run context, found a script-run context".into(),
            }),
        }
    }

    /// Mutably borrow the model context.
    pub fn as_model_mut(&mut self) -> StrataResult<&mut ModelCtx> {
        match self {
            ExecutionCtx::Model(ctx) => Ok(ctx),
            ExecutionCtx::Script(_) => Err(StrataError::FinishCtx {
                message: "expected a model-run context, found a script-run context".into(),
            }),
        }
    }

    /// Borrow the script context, failing with `FinishCtx` if this is
    /// actually a model context.
    pub fn as_script(&self) -> StrataResult<&ScriptCtx> {
        match self {
            ExecutionCtx::Script(ctx) => Ok(ctx),
            ExecutionCtx::Model(_) => Err(StrataError::FinishCtx {
                message: "expected a script-run context, found a model-run context".into(),
            }),
        }
    }

    /// Mutably borrow the script context.
    pub fn as_script_mut(&mut self) -> StrataResult<&mut ScriptCtx> {
        match self {
            ExecutionCtx::Script(ctx) => Ok(ctx),
            ExecutionCtx::Model(_) => Err(StrataError::FinishCtx {
                message: "expected a script-run context, found a model-run context".into(),
            }),
        }
    }

    /// Number of output slots declared, regardless of variant.
    pub fn num_outputs(&self) -> usize {
        match self {
            ExecutionCtx::Model(ctx) => ctx.num_outputs(),
            ExecutionCtx::Script(ctx) => ctx.num_outputs(),
        }
    }

    /// Read output `i`, regardless of variant.
    pub fn get_output(&self, i: usize) -> StrataResult<&Tensor> {
        match self {
            ExecutionCtx::Model(ctx) => ctx.get_output(i),
            ExecutionCtx::Script(ctx) => ctx.get_output(i),
        }
    }
}
