//! A minimal arithmetic scripting language for the CPU reference backend.
//!
//! Real script backends (TorchScript, a Python runtime, …) are out of
//! scope for a dependency-free fallback; this module supports exactly
//! what the spec's own script example needs: one or more function
//! definitions of the form `name(param, param, …) = expr`, where `expr`
//! is `+`/`*` over the params, evaluated element-wise over same-shaped
//! tensors bound to those params in argument order.

use std::collections::HashMap;
use strata_core::{StrataError, StrataResult, Tensor};

#[derive(Debug, Clone)]
enum Expr {
    Var(String),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
struct FunctionDef {
    params: Vec<String>,
    body: Expr,
}

/// A parsed set of function definitions, ready to evaluate against
/// positional tensor inputs.
#[derive(Debug, Clone, Default)]
pub struct ScriptProgram {
    functions: HashMap<String, FunctionDef>,
}

impl ScriptProgram {
    /// Parse `source`: one function definition per non-empty, non-comment
    /// line (`#` starts a comment), each `name(a, b) = expr`.
    pub fn parse(source: &str) -> StrataResult<Self> {
        let mut functions = HashMap::new();
        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, params, body) = parse_definition(line)?;
            functions.insert(name, FunctionDef { params, body });
        }
        if functions.is_empty() {
            return Err(StrataError::ScriptCreate {
                message: "script source defines no functions".into(),
            });
        }
        Ok(ScriptProgram { functions })
    }

    /// True if `function` is one of this program's defined entry points.
    pub fn has_function(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }

    /// Evaluate `function` against `inputs`, bound positionally to its
    /// declared parameters.
    pub fn eval(&self, function: &str, inputs: &[Tensor]) -> StrataResult<Tensor> {
        let def = self
            .functions
            .get(function)
            .ok_or_else(|| StrataError::ScriptRunFailed {
                message: format!("no such function: {function}"),
            })?;
        if inputs.len() != def.params.len() {
            return Err(StrataError::ScriptRunFailed {
                message: format!(
                    "{function} expects {} argument(s), got {}",
                    def.params.len(),
                    inputs.len()
                ),
            });
        }
        let bindings: HashMap<&str, &Tensor> = def
            .params
            .iter()
            .map(String::as_str)
            .zip(inputs.iter())
            .collect();
        eval_expr(&def.body, &bindings)
    }
}

fn eval_expr(expr: &Expr, bindings: &HashMap<&str, &Tensor>) -> StrataResult<Tensor> {
    match expr {
        Expr::Var(name) => bindings
            .get(name.as_str())
            .map(|t| (*t).clone())
            .ok_or_else(|| StrataError::ScriptRunFailed {
                message: format!("unbound variable: {name}"),
            }),
        Expr::Add(lhs, rhs) => {
            let a = eval_expr(lhs, bindings)?;
            let b = eval_expr(rhs, bindings)?;
            elementwise(&a, &b, |x, y| x + y)
        }
        Expr::Mul(lhs, rhs) => {
            let a = eval_expr(lhs, bindings)?;
            let b = eval_expr(rhs, bindings)?;
            elementwise(&a, &b, |x, y| x * y)
        }
    }
}

fn elementwise(a: &Tensor, b: &Tensor, op: impl Fn(f64, f64) -> f64) -> StrataResult<Tensor> {
    if a.shape() != b.shape() {
        return Err(StrataError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    let mut values = Vec::with_capacity(a.len());
    for i in 0..a.len() {
        values.push(strata_core::Scalar::Number(op(a.get_f64(i)?, b.get_f64(i)?)));
    }
    Tensor::from_values(strata_core::DType::Float64, a.shape().to_vec(), &values)
}

/// Parse one `name(a, b, …) = expr` line.
fn parse_definition(line: &str) -> StrataResult<(String, Vec<String>, Expr)> {
    let bad = |msg: &str| {
        StrataError::ScriptCreate {
            message: format!("malformed function definition '{line}': {msg}"),
        }
    };
    let (head, body_src) = line.split_once('=').ok_or_else(|| bad("missing '='"))?;
    let head = head.trim();
    let open = head.find('(').ok_or_else(|| bad("missing '('"))?;
    let close = head.rfind(')').ok_or_else(|| bad("missing ')'"))?;
    let name = head[..open].trim().to_string();
    if name.is_empty() {
        return Err(bad("missing function name"));
    }
    let params: Vec<String> = head[open + 1..close]
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    let body = parse_expr(body_src.trim()).map_err(|_| bad("unparseable expression"))?;
    Ok((name, params, body))
}

/// Left-associative `+`/`*` parser (no operator precedence between them,
/// evaluated left to right as the spec example — `x + y + x` — requires).
fn parse_expr(src: &str) -> Result<Expr, ()> {
    let mut terms = src.split(|c| c == '+' || c == '*');
    let mut ops = src.chars().filter(|c| *c == '+' || *c == '*');
    let first = terms.next().ok_or(())?.trim();
    let mut expr = Expr::Var(parse_ident(first)?);
    for term in terms {
        let op = ops.next().ok_or(())?;
        let rhs = Expr::Var(parse_ident(term.trim())?);
        expr = match op {
            '+' => Expr::Add(Box::new(expr), Box::new(rhs)),
            '*' => Expr::Mul(Box::new(expr), Box::new(rhs)),
            _ => unreachable!(),
        };
    }
    Ok(expr)
}

fn parse_ident(s: &str) -> Result<String, ()> {
    if s.is_empty() || !s.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(());
    }
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::DType;

    fn t(values: &[f64]) -> Tensor {
        Tensor::from_values(
            DType::Float32,
            vec![values.len()],
            &values
                .iter()
                .map(|v| strata_core::Scalar::Number(*v))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn two_argument_sum_adds_elementwise() {
        let program = ScriptProgram::parse("bar(x, y) = x + y").unwrap();
        let out = program
            .eval("bar", &[t(&[2.0, 3.0, 2.0, 3.0]), t(&[2.0, 3.0, 2.0, 3.0])])
            .unwrap();
        assert_eq!(out.get_f64(0).unwrap(), 4.0);
        assert_eq!(out.get_f64(1).unwrap(), 6.0);
    }

    #[test]
    fn chained_operators_are_left_associative() {
        let program = ScriptProgram::parse("triple(x, y) = x + y + x").unwrap();
        let out = program
            .eval("triple", &[t(&[2.0, 3.0]), t(&[2.0, 3.0])])
            .unwrap();
        assert_eq!(out.get_f64(0).unwrap(), 6.0);
        assert_eq!(out.get_f64(1).unwrap(), 9.0);
    }

    #[test]
    fn unknown_function_is_script_run_failed() {
        let program = ScriptProgram::parse("bar(x, y) = x + y").unwrap();
        let err = program.eval("no_function", &[]).unwrap_err();
        assert!(matches!(err, StrataError::ScriptRunFailed { .. }));
    }

    #[test]
    fn empty_source_is_rejected() {
        assert!(ScriptProgram::parse("# just a comment\n").is_err());
    }
}
