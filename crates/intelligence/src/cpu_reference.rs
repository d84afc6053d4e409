//! The bundled CPU reference backend.
//!
//! Real deployments load TF/TFLite/Torch/ONNX shared libraries through
//! [`crate::loader::dynamic_loader`]; this module is what a database opened
//! without any of those libraries installed still gets for `BackendKind::Tf`
//! wired in at startup — a dependency-free implementation good enough to
//! run the element-wise models and arithmetic scripts the rest of this
//! codebase's tests exercise, grounded the same way the teacher's
//! `CpuBackend` wraps `Tensor` methods directly rather than shelling out to
//! a real device (`runtime/cpu_backend.rs`: "This is the default fallback
//! backend... producing bit-identical results to the original non-backend
//! code path").

use std::sync::Arc;
use strata_core::{DType, Scalar, StrataResult, Tensor};
use strata_engine::{BackendKind, BackendModelHandle, BackendScriptHandle, InferenceBackend};

use crate::script::ScriptProgram;

/// The closed set of element-wise ops the reference backend's models can
/// perform, selected by the model's serialized definition (its UTF-8
/// source, trimmed and upper-cased).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementwiseOp {
    Add,
    Multiply,
    Identity,
}

impl ElementwiseOp {
    fn parse(definition: &[u8]) -> StrataResult<Self> {
        let text = std::str::from_utf8(definition)
            .map_err(|e| strata_core::StrataError::ModelCreate {
                message: format!("model definition is not valid UTF-8: {e}"),
            })?
            .trim()
            .to_ascii_uppercase();
        match text.as_str() {
            "ADD" => Ok(ElementwiseOp::Add),
            "MULTIPLY" | "MUL" => Ok(ElementwiseOp::Multiply),
            "IDENTITY" => Ok(ElementwiseOp::Identity),
            other => Err(strata_core::StrataError::ModelCreate {
                message: format!(
                    "unrecognized reference model definition '{other}' (expected ADD, MULTIPLY, or IDENTITY)"
                ),
            }),
        }
    }

    fn apply(self, inputs: &[Tensor]) -> StrataResult<Tensor> {
        match self {
            ElementwiseOp::Identity => inputs.first().cloned().ok_or_else(|| {
                strata_core::StrataError::ModelRunFailed {
                    message: "IDENTITY model requires one input".into(),
                }
            }),
            ElementwiseOp::Add => fold_elementwise(inputs, |a, b| a + b),
            ElementwiseOp::Multiply => fold_elementwise(inputs, |a, b| a * b),
        }
    }
}

/// Fold a list of same-shaped numeric tensors element-wise with `op`,
/// producing a float64 result tensor (spec.md §8 scenario 1 expects the
/// `TensorGet ... VALUES` reply rendered as float64 regardless of the
/// input dtype).
fn fold_elementwise(inputs: &[Tensor], op: impl Fn(f64, f64) -> f64) -> StrataResult<Tensor> {
    let Some(first) = inputs.first() else {
        return Err(strata_core::StrataError::ModelRunFailed {
            message: "element-wise op requires at least one input".into(),
        });
    };
    let shape = first.shape().to_vec();
    for t in &inputs[1..] {
        if t.shape() != shape.as_slice() {
            return Err(strata_core::StrataError::DimensionMismatch {
                expected: shape.iter().product(),
                got: t.len(),
            });
        }
    }
    let len = first.len();
    let mut acc = vec![0.0f64; len];
    for (i, slot) in acc.iter_mut().enumerate() {
        *slot = first.get_f64(i)?;
    }
    for t in &inputs[1..] {
        for i in 0..len {
            acc[i] = op(acc[i], t.get_f64(i)?);
        }
    }
    let values: Vec<Scalar> = acc.into_iter().map(Scalar::Number).collect();
    Tensor::from_values(DType::Float64, shape, &values)
}

struct ReferenceModelHandle {
    op: ElementwiseOp,
}

impl BackendModelHandle for ReferenceModelHandle {
    fn run(&self, ctxs: &mut [strata_engine::ModelCtx]) -> StrataResult<()> {
        for ctx in ctxs.iter_mut() {
            let inputs = ctx.inputs().to_vec();
            let out = self.op.apply(&inputs)?;
            ctx.set_output(0, out)?;
        }
        Ok(())
    }

    fn serialize(&self) -> StrataResult<Vec<u8>> {
        let text = match self.op {
            ElementwiseOp::Add => "ADD",
            ElementwiseOp::Multiply => "MULTIPLY",
            ElementwiseOp::Identity => "IDENTITY",
        };
        Ok(text.as_bytes().to_vec())
    }
}

struct ReferenceScriptHandle {
    program: ScriptProgram,
}

impl BackendScriptHandle for ReferenceScriptHandle {
    fn run(&self, function: &str, ctx: &mut strata_engine::ScriptCtx) -> StrataResult<()> {
        let inputs = ctx.inputs().to_vec();
        let out = self.program.eval(function, &inputs)?;
        ctx.set_output(0, out)?;
        Ok(())
    }
}

/// A dependency-free backend that runs element-wise models and a tiny
/// arithmetic scripting language directly against [`Tensor`], standing in
/// for any of the four framework kinds when no shared library for that
/// kind is installed.
pub struct CpuReferenceBackend {
    kind: BackendKind,
}

impl CpuReferenceBackend {
    /// Build a reference backend that reports itself as `kind` (so it can
    /// be registered under whichever `BackendKind` a test or a
    /// library-less deployment wants element-wise models to run on).
    pub fn new(kind: BackendKind) -> Self {
        CpuReferenceBackend { kind }
    }
}

impl InferenceBackend for CpuReferenceBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn model_create(
        &self,
        _device: &str,
        definition: &[u8],
    ) -> StrataResult<Arc<dyn BackendModelHandle>> {
        let op = ElementwiseOp::parse(definition)?;
        Ok(Arc::new(ReferenceModelHandle { op }))
    }

    fn script_create(
        &self,
        _device: &str,
        source: &str,
    ) -> StrataResult<Arc<dyn BackendScriptHandle>> {
        let program = ScriptProgram::parse(source)?;
        Ok(Arc::new(ReferenceScriptHandle { program }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::ModelCtx;

    fn t(values: &[f64]) -> Tensor {
        Tensor::from_values(
            DType::Float32,
            vec![values.len()],
            &values.iter().map(|v| Scalar::Number(*v)).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn multiply_model_matches_spec_scenario_one() {
        let backend = CpuReferenceBackend::new(BackendKind::Torch);
        let handle = backend.model_create("CPU", b"MULTIPLY").unwrap();
        let mut ctx = ModelCtx::new();
        ctx.add_input(t(&[2.0, 3.0, 2.0, 3.0]));
        ctx.add_input(t(&[2.0, 3.0, 2.0, 3.0]));
        ctx.add_output_placeholder();
        let mut ctxs = [ctx];
        handle.run(&mut ctxs).unwrap();
        let out = ctxs[0].get_output(0).unwrap();
        assert_eq!(out.get_f64(0).unwrap(), 4.0);
        assert_eq!(out.get_f64(1).unwrap(), 9.0);
    }

    #[test]
    fn unrecognized_definition_is_model_create_error() {
        let backend = CpuReferenceBackend::new(BackendKind::Tf);
        let err = backend.model_create("CPU", b"WAVELET").unwrap_err();
        assert!(matches!(err, strata_core::StrataError::ModelCreate { .. }));
    }
}
