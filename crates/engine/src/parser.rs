//! The command parser and DAG planner (C8, spec.md §4.3).
//!
//! Turns a pre-tokenized command (the wire layer's job is splitting a
//! request into words and bulk payloads; this module never sees raw
//! bytes) into a fully resolved [`PlannedDag`]: a flat [`DagOp`] list
//! with every input/output name already turned into a tensor-slab slot
//! index. `RunInfo` (spec.md §3) is built directly from the result by
//! the caller, which also knows the device routing policy.
//!
//! Two passes, as spec.md describes it: the first walks the command
//! left to right, resolving each op's inputs against names produced by
//! an earlier op (or `LOAD`), and assigning each output a fresh slot;
//! the second — here, just a lookup after the first pass finishes —
//! resolves `PERSIST` names against the same map. The name-to-slot map
//! itself is scratch space for this function only; `RunInfo` never
//! needs to look a tensor up by name again once it starts running.

use crate::context::ScriptArg;
use crate::dagop::{DagOp, DagOpKind};
use crate::model::Model;
use crate::object_store::ObjectStore;
use crate::script::Script;
use rustc_hash::FxHashMap;
use strata_core::{BranchId, DType, EntityRef, Scalar, StrataError, StrataResult, Tensor};

/// One command argument: a plain word, or an already-extracted binary
/// payload (a tensor blob, or a model definition chunk). The wire layer
/// is responsible for telling the two apart before handing tokens here.
#[derive(Debug, Clone)]
pub enum CmdArg {
    /// A keyword, name, or literal.
    Word(String),
    /// A binary payload (`BLOB`).
    Blob(Vec<u8>),
}

impl CmdArg {
    fn as_word(&self) -> Option<&str> {
        match self {
            CmdArg::Word(w) => Some(w),
            CmdArg::Blob(_) => None,
        }
    }
}

/// The result of planning a DAG command: a ready-to-run op list plus
/// everything `RunInfo` needs that isn't itself an op.
pub struct PlannedDag {
    /// Flat, linear-order op list.
    pub ops: Vec<DagOp>,
    /// The initial tensor slab: `LOAD`ed tensors already populated,
    /// every other slot `None` until an op fills it.
    pub shared_tensors: Vec<Option<Tensor>>,
    /// Resolved `(key name, slot index)` pairs to write back on success.
    pub persist_set: Vec<(String, usize)>,
    /// The `ROUTING` key, if the command named one explicitly.
    pub routing_key: Option<String>,
    /// The `TIMEOUT` value, in milliseconds.
    pub timeout_ms: Option<u64>,
}

struct Cursor<'a> {
    tokens: &'a [CmdArg],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [CmdArg]) -> Self {
        Cursor { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_word(&self) -> Option<&str> {
        self.tokens.get(self.pos).and_then(CmdArg::as_word)
    }

    fn next_word(&mut self) -> StrataResult<&'a str> {
        let tok = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| StrataError::bad_command("unexpected end of command"))?;
        let word = tok
            .as_word()
            .ok_or_else(|| StrataError::bad_command("expected a word, found a BLOB"))?;
        self.pos += 1;
        Ok(word)
    }

    fn next_blob(&mut self) -> StrataResult<Vec<u8>> {
        match self.tokens.get(self.pos) {
            Some(CmdArg::Blob(b)) => {
                self.pos += 1;
                Ok(b.clone())
            }
            _ => Err(StrataError::bad_command("expected a BLOB argument")),
        }
    }

    fn next_u64(&mut self) -> StrataResult<u64> {
        let word = self.next_word()?;
        word.parse::<u64>()
            .map_err(|_| StrataError::bad_command(format!("expected an integer, got '{word}'")))
    }

    fn expect_word(&mut self, expected: &str) -> StrataResult<()> {
        let word = self.next_word()?;
        if !word.eq_ignore_ascii_case(expected) {
            return Err(StrataError::bad_command(format!(
                "expected '{expected}', got '{word}'"
            )));
        }
        Ok(())
    }

    fn is_next_keyword(&self, word: &str) -> bool {
        self.peek_word()
            .map(|w| w.eq_ignore_ascii_case(word))
            .unwrap_or(false)
    }
}

/// Preamble keywords must appear in this relative order (spec.md §4.3
/// "no preamble after the first op"); each is optional and at most one
/// of each.
const PREAMBLE_ORDER: [&str; 4] = ["ROUTING", "LOAD", "PERSIST", "TIMEOUT"];

/// Resolves `LOAD`/`MODELRUN`/`SCRIPTRUN` key and model/script names
/// against the keyspace and plans a DAG from a tokenized command.
pub struct DagPlanner<'a> {
    tensors: &'a ObjectStore<Tensor>,
    models: &'a ObjectStore<Model>,
    scripts: &'a ObjectStore<Script>,
    branch: BranchId,
}

impl<'a> DagPlanner<'a> {
    /// Build a planner bound to one branch's object stores.
    pub fn new(
        tensors: &'a ObjectStore<Tensor>,
        models: &'a ObjectStore<Model>,
        scripts: &'a ObjectStore<Script>,
        branch: BranchId,
    ) -> Self {
        DagPlanner {
            tensors,
            models,
            scripts,
            branch,
        }
    }

    /// Plan a `DAGEXECUTE`/`DAGEXECUTE_RO` command. `read_only` rejects
    /// `PERSIST` and `SCRIPTRUN` (spec.md §4.3 "a read-only DAG may not
    /// write to the keyspace or invoke a script").
    pub fn plan(&self, tokens: &[CmdArg], read_only: bool) -> StrataResult<PlannedDag> {
        let mut cursor = Cursor::new(tokens);
        let mut name_to_index: FxHashMap<String, usize> = FxHashMap::default();
        let mut shared_tensors: Vec<Option<Tensor>> = Vec::new();
        let mut routing_key: Option<String> = None;
        let mut persist_names: Vec<String> = Vec::new();
        let mut timeout_ms: Option<u64> = None;
        let mut stage = 0usize;

        while !cursor.at_end() && !cursor.is_next_keyword("|>") {
            let keyword = cursor.next_word()?.to_ascii_uppercase();
            let slot = PREAMBLE_ORDER
                .iter()
                .position(|k| *k == keyword)
                .ok_or_else(|| {
                    StrataError::bad_command(format!("unknown preamble keyword '{keyword}'"))
                })?;
            if slot < stage {
                return Err(StrataError::dag_builder(format!(
                    "'{keyword}' is out of order in the DAG preamble"
                )));
            }
            stage = slot + 1;

            match keyword.as_str() {
                "ROUTING" => {
                    if routing_key.is_some() {
                        return Err(StrataError::dag_builder("duplicate ROUTING clause"));
                    }
                    routing_key = Some(cursor.next_word()?.to_string());
                }
                "LOAD" => {
                    let n = cursor.next_u64()? as usize;
                    for _ in 0..n {
                        let key = cursor.next_word()?.to_string();
                        if name_to_index.contains_key(&key) {
                            return Err(StrataError::dag_builder(format!(
                                "'{key}' is loaded more than once"
                            )));
                        }
                        let tensor = self.tensors.get(self.branch, &key).ok_or_else(|| {
                            StrataError::not_found(EntityRef::tensor(self.branch, key.clone()))
                        })?;
                        let idx = shared_tensors.len();
                        shared_tensors.push(Some(tensor));
                        name_to_index.insert(key, idx);
                    }
                }
                "PERSIST" => {
                    if read_only {
                        return Err(StrataError::dag_builder(
                            "PERSIST is not allowed in a read-only DAG",
                        ));
                    }
                    let n = cursor.next_u64()? as usize;
                    for _ in 0..n {
                        let key = cursor.next_word()?.to_string();
                        if persist_names.contains(&key) {
                            return Err(StrataError::dag_builder(format!(
                                "'{key}' is persisted more than once"
                            )));
                        }
                        persist_names.push(key);
                    }
                }
                "TIMEOUT" => {
                    let ms = cursor.next_u64()?;
                    if ms == 0 {
                        return Err(StrataError::invalid_input(
                            "TIMEOUT must be a positive integer",
                        ));
                    }
                    timeout_ms = Some(ms);
                }
                other => {
                    return Err(StrataError::bad_command(format!(
                        "unknown preamble keyword '{other}'"
                    )))
                }
            }
        }

        let mut ops = Vec::new();
        while !cursor.at_end() {
            cursor.expect_word("|>")?;
            let op = self.parse_op(
                &mut cursor,
                &mut name_to_index,
                &mut shared_tensors,
                read_only,
            )?;
            ops.push(op);
        }

        if ops.is_empty() {
            return Err(StrataError::dag_builder("DAG is empty"));
        }

        let mut persist_set = Vec::with_capacity(persist_names.len());
        for name in persist_names {
            let idx = name_to_index
                .get(&name)
                .copied()
                .ok_or(StrataError::KeyMissing)?;
            persist_set.push((name, idx));
        }

        Ok(PlannedDag {
            ops,
            shared_tensors,
            persist_set,
            routing_key,
            timeout_ms,
        })
    }

    fn parse_op(
        &self,
        cursor: &mut Cursor,
        name_to_index: &mut FxHashMap<String, usize>,
        shared_tensors: &mut Vec<Option<Tensor>>,
        read_only: bool,
    ) -> StrataResult<DagOp> {
        let op_name = cursor.next_word()?.to_ascii_uppercase();
        match op_name.as_str() {
            "TENSORSET" => self.parse_tensor_set(cursor, name_to_index, shared_tensors),
            "TENSORGET" => self.parse_tensor_get(cursor, name_to_index),
            "MODELRUN" => self.parse_model_run(cursor, name_to_index, shared_tensors),
            "SCRIPTRUN" => {
                if read_only {
                    return Err(StrataError::dag_builder(
                        "SCRIPTRUN is not allowed in a read-only DAG",
                    ));
                }
                self.parse_script_run(cursor, name_to_index, shared_tensors)
            }
            other => Err(StrataError::bad_command(format!("unknown op '{other}'"))),
        }
    }

    fn parse_tensor_set(
        &self,
        cursor: &mut Cursor,
        name_to_index: &mut FxHashMap<String, usize>,
        shared_tensors: &mut Vec<Option<Tensor>>,
    ) -> StrataResult<DagOp> {
        let name = cursor.next_word()?.to_string();
        let dtype = DType::parse(cursor.next_word()?)?;
        let mut shape = Vec::new();
        while !cursor.at_end()
            && !cursor.is_next_keyword("VALUES")
            && !cursor.is_next_keyword("BLOB")
        {
            shape.push(cursor.next_u64()? as usize);
        }
        let keyword = cursor.next_word()?.to_ascii_uppercase();
        let tensor = match keyword.as_str() {
            "VALUES" => {
                let count: usize = shape.iter().product();
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    let word = cursor.next_word()?;
                    values.push(parse_scalar(dtype, word)?);
                }
                Tensor::from_values(dtype, shape, &values)?
            }
            "BLOB" => {
                let blob = cursor.next_blob()?;
                Tensor::from_blob(dtype, shape, blob)?
            }
            other => {
                return Err(StrataError::bad_command(format!(
                    "expected VALUES or BLOB, got '{other}'"
                )))
            }
        };

        if name_to_index.contains_key(&name) {
            return Err(StrataError::dag_builder(format!(
                "'{name}' is written more than once in this DAG"
            )));
        }
        let idx = shared_tensors.len();
        shared_tensors.push(Some(tensor));
        name_to_index.insert(name.clone(), idx);

        Ok(DagOp::new(
            DagOpKind::TensorSet,
            vec![],
            vec![name],
            vec![],
            vec![idx],
            "CPU".to_string(),
        ))
    }

    fn parse_tensor_get(
        &self,
        cursor: &mut Cursor,
        name_to_index: &FxHashMap<String, usize>,
    ) -> StrataResult<DagOp> {
        let name = cursor.next_word()?.to_string();
        // Optional reply-shape flags (spec.md §6 "Replies") — the wire
        // layer decides how to format the tensor; the planner only
        // needs to know which slot is being read.
        while cursor.is_next_keyword("META")
            || cursor.is_next_keyword("VALUES")
            || cursor.is_next_keyword("BLOB")
        {
            cursor.next_word()?;
        }
        let idx = name_to_index
            .get(&name)
            .copied()
            .ok_or(StrataError::KeyMissing)?;
        Ok(DagOp::new(
            DagOpKind::TensorGet,
            vec![name],
            vec![],
            vec![idx],
            vec![],
            "CPU".to_string(),
        ))
    }

    fn parse_model_run(
        &self,
        cursor: &mut Cursor,
        name_to_index: &mut FxHashMap<String, usize>,
        shared_tensors: &mut Vec<Option<Tensor>>,
    ) -> StrataResult<DagOp> {
        let model_key = cursor.next_word()?.to_string();
        let model = self.models.get(self.branch, &model_key).ok_or_else(|| {
            StrataError::not_found(EntityRef::model(self.branch, model_key.clone()))
        })?;

        cursor.expect_word("INPUTS")?;
        let input_names = read_name_list(cursor)?;
        cursor.expect_word("OUTPUTS")?;
        let output_names = read_name_list(cursor)?;

        if !model.input_names().is_empty() && model.input_names().len() != input_names.len() {
            return Err(StrataError::dag_builder(format!(
                "model '{model_key}' expects {} inputs, got {}",
                model.input_names().len(),
                input_names.len()
            )));
        }
        if !model.output_names().is_empty() && model.output_names().len() != output_names.len() {
            return Err(StrataError::dag_builder(format!(
                "model '{model_key}' expects {} outputs, got {}",
                model.output_names().len(),
                output_names.len()
            )));
        }

        let input_indices = resolve_inputs(name_to_index, &input_names)?;
        let output_indices = allocate_outputs(name_to_index, shared_tensors, &output_names)?;
        let device = model.device().to_ascii_uppercase();

        Ok(DagOp::new(
            DagOpKind::ModelRun { model },
            input_names,
            output_names,
            input_indices,
            output_indices,
            device,
        ))
    }

    fn parse_script_run(
        &self,
        cursor: &mut Cursor,
        name_to_index: &mut FxHashMap<String, usize>,
        shared_tensors: &mut Vec<Option<Tensor>>,
    ) -> StrataResult<DagOp> {
        let script_key = cursor.next_word()?.to_string();
        let script = self.scripts.get(self.branch, &script_key).ok_or_else(|| {
            StrataError::not_found(EntityRef::script(self.branch, script_key.clone()))
        })?;
        let function = cursor.next_word()?.to_string();
        if !script.has_entry_point(&function) {
            return Err(StrataError::dag_builder(format!(
                "script '{script_key}' has no entry point '{function}'"
            )));
        }

        cursor.expect_word("INPUTS")?;
        let input_names = read_name_list(cursor)?;
        cursor.expect_word("OUTPUTS")?;
        let output_names = read_name_list(cursor)?;

        let mut args = Vec::new();
        if cursor.is_next_keyword("ARGS") {
            cursor.next_word()?;
            let n = cursor.next_u64()? as usize;
            for _ in 0..n {
                args.push(parse_script_arg(cursor.next_word()?));
            }
        }

        let mut key_refs = Vec::new();
        if cursor.is_next_keyword("KEYS") {
            cursor.next_word()?;
            let n = cursor.next_u64()? as usize;
            for _ in 0..n {
                key_refs.push(cursor.next_word()?.to_string());
            }
        }

        let input_indices = resolve_inputs(name_to_index, &input_names)?;
        let output_indices = allocate_outputs(name_to_index, shared_tensors, &output_names)?;
        let device = script.device().to_ascii_uppercase();

        Ok(DagOp::new(
            DagOpKind::ScriptRun {
                script,
                function,
                args,
                key_refs,
            },
            input_names,
            output_names,
            input_indices,
            output_indices,
            device,
        ))
    }
}

fn read_name_list(cursor: &mut Cursor) -> StrataResult<Vec<String>> {
    let n = cursor.next_u64()? as usize;
    let mut names = Vec::with_capacity(n);
    for _ in 0..n {
        names.push(cursor.next_word()?.to_string());
    }
    Ok(names)
}

fn resolve_inputs(
    name_to_index: &FxHashMap<String, usize>,
    names: &[String],
) -> StrataResult<Vec<usize>> {
    names
        .iter()
        .map(|n| name_to_index.get(n).copied().ok_or(StrataError::KeyMissing))
        .collect()
}

fn allocate_outputs(
    name_to_index: &mut FxHashMap<String, usize>,
    shared_tensors: &mut Vec<Option<Tensor>>,
    names: &[String],
) -> StrataResult<Vec<usize>> {
    let mut indices = Vec::with_capacity(names.len());
    for name in names {
        if name_to_index.contains_key(name) {
            return Err(StrataError::dag_builder(format!(
                "'{name}' is written more than once in this DAG"
            )));
        }
        let idx = shared_tensors.len();
        shared_tensors.push(None);
        name_to_index.insert(name.clone(), idx);
        indices.push(idx);
    }
    Ok(indices)
}

/// Parse one literal word against `dtype` into a [`Scalar`] (spec.md
/// §4.1 "from (dtype, shape, values-as-strings)... rejecting
/// out-of-range integers, non-booleans for bool dtype"). Exposed beyond
/// this module because `strata-executor`'s standalone `TensorSet`
/// command needs the identical parsing a `TENSORSET` DAG op gets.
pub fn parse_scalar(dtype: DType, word: &str) -> StrataResult<Scalar> {
    Ok(match dtype {
        DType::String => Scalar::Str(word.to_string()),
        DType::Bool => Scalar::Bool(match word {
            "1" | "true" | "TRUE" | "True" => true,
            "0" | "false" | "FALSE" | "False" => false,
            other => {
                return Err(StrataError::bad_command(format!(
                    "'{other}' is not a valid BOOL literal"
                )))
            }
        }),
        _ => Scalar::Number(word.parse::<f64>().map_err(|_| {
            StrataError::bad_command(format!("'{word}' is not a valid numeric literal"))
        })?),
    })
}

fn parse_script_arg(word: &str) -> ScriptArg {
    if let Ok(i) = word.parse::<i64>() {
        return ScriptArg::Int(i);
    }
    if let Ok(f) = word.parse::<f64>() {
        return ScriptArg::Float(f);
    }
    ScriptArg::Str(word.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendModelHandle, BackendScriptHandle};
    use crate::context::ModelCtx;
    use crate::model::{BatchPolicy, Model};
    use crate::script::Script;
    use std::sync::Arc;
    use strata_core::BranchId;

    struct StubModelHandle;
    impl BackendModelHandle for StubModelHandle {
        fn run(&self, _ctxs: &mut [ModelCtx]) -> StrataResult<()> {
            Ok(())
        }
        fn serialize(&self) -> StrataResult<Vec<u8>> {
            Ok(vec![])
        }
    }

    struct StubScriptHandle;
    impl BackendScriptHandle for StubScriptHandle {
        fn run(&self, _function: &str, _ctx: &mut crate::context::ScriptCtx) -> StrataResult<()> {
            Ok(())
        }
    }

    fn words(s: &str) -> Vec<CmdArg> {
        s.split_whitespace().map(|w| CmdArg::Word(w.to_string())).collect()
    }

    #[test]
    fn tensor_set_then_get_round_trips_through_one_dag() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words("|> TENSORSET a FLOAT 2 VALUES 1 2 |> TENSORGET a");
        let plan = planner.plan(&tokens, false).unwrap();
        assert_eq!(plan.ops.len(), 2);
        assert!(plan.shared_tensors[0].is_some());
    }

    #[test]
    fn load_pulls_an_existing_tensor_and_persist_resolves_an_output() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        tensors.put(
            branch,
            "x",
            Tensor::from_values(DType::Float32, vec![1], &[Scalar::Number(9.0)]).unwrap(),
        );
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words("LOAD 1 x PERSIST 1 y |> TENSORSET y FLOAT 1 VALUES 3");
        let plan = planner.plan(&tokens, false).unwrap();
        assert_eq!(plan.persist_set.len(), 1);
        assert_eq!(plan.persist_set[0].0, "y");
        assert_eq!(plan.shared_tensors.len(), 2);
    }

    #[test]
    fn referencing_an_unknown_name_is_key_missing() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words("|> TENSORGET nope");
        let err = planner.plan(&tokens, false).unwrap_err();
        assert!(matches!(err, StrataError::KeyMissing));
    }

    #[test]
    fn persist_is_rejected_in_read_only_dags() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words("PERSIST 1 y |> TENSORSET y FLOAT 1 VALUES 1");
        let err = planner.plan(&tokens, true).unwrap_err();
        assert!(matches!(err, StrataError::DagBuilder { .. }));
    }

    #[test]
    fn scriptrun_is_rejected_in_read_only_dags() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        scripts.put(
            branch,
            "s",
            Script::new("CPU", "t", "src", vec![], Arc::new(StubScriptHandle)),
        );
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words("|> SCRIPTRUN s forward INPUTS 0 OUTPUTS 0");
        let err = planner.plan(&tokens, true).unwrap_err();
        assert!(matches!(err, StrataError::DagBuilder { .. }));
    }

    #[test]
    fn model_run_validates_declared_arity() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        models.put(
            branch,
            "m",
            Model::new(
                crate::backend::BackendKind::Torch,
                "CPU",
                "v1",
                BatchPolicy::default(),
                vec!["a".into(), "b".into()],
                vec!["out".into()],
                vec![],
                Arc::new(StubModelHandle),
            ),
        );
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words(
            "LOAD 1 a |> MODELRUN m INPUTS 1 a OUTPUTS 1 out",
        );
        // only one of the two declared inputs supplied
        tensors.put(
            branch,
            "a",
            Tensor::from_values(DType::Float32, vec![1], &[Scalar::Number(1.0)]).unwrap(),
        );
        let err = planner.plan(&tokens, false).unwrap_err();
        assert!(matches!(err, StrataError::DagBuilder { .. }));
    }

    #[test]
    fn preamble_out_of_order_is_rejected() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words("PERSIST 1 y ROUTING a |> TENSORSET y FLOAT 1 VALUES 1");
        let err = planner.plan(&tokens, false).unwrap_err();
        assert!(matches!(err, StrataError::DagBuilder { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let tokens = words("TIMEOUT 0 |> TENSORSET y FLOAT 1 VALUES 1");
        let err = planner.plan(&tokens, false).unwrap_err();
        assert!(matches!(err, StrataError::InvalidInput { .. }));
    }

    #[test]
    fn empty_dag_is_rejected() {
        let tensors = ObjectStore::new();
        let models = ObjectStore::new();
        let scripts = ObjectStore::new();
        let branch = BranchId::default_branch();
        let planner = DagPlanner::new(&tensors, &models, &scripts, branch);

        let err = planner.plan(&[], false).unwrap_err();
        assert!(matches!(err, StrataError::DagBuilder { .. }));
    }
}
