//! Tensor payload framing (spec.md §6 "Replies... the tensor payload").
//!
//! A `TensorGet` can be asked to render a tensor as its raw blob, or as a
//! list of parsed values; `TensorPayload` is the wire-ready shape for
//! either, independent of whatever bulk-string/array framing the caller
//! ultimately puts it in.

use serde::{Deserialize, Serialize};
use strata_core::{DType, StrataError, StrataResult, Tensor};

/// How a tensor's data is rendered in a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorEncoding {
    /// Only dtype and shape, no data (`TensorGet key META`).
    MetaOnly,
    /// The raw blob, base64-encoded for safe transport over a text wire.
    Blob(String),
    /// Parsed scalar values, rendered as strings (numeric values render
    /// as float64 per spec.md §8 scenario 1).
    Values(Vec<String>),
}

/// The full wire-ready rendering of a tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorPayload {
    /// The tensor's dtype, as its wire name (e.g. `"FLOAT32"`).
    pub dtype: String,
    /// The tensor's shape.
    pub shape: Vec<usize>,
    /// The rendered data.
    pub encoding: TensorEncoding,
}

/// Render `tensor` with metadata only, no data.
pub fn render_meta(tensor: &Tensor) -> TensorPayload {
    TensorPayload {
        dtype: tensor.dtype().to_string(),
        shape: tensor.shape().to_vec(),
        encoding: TensorEncoding::MetaOnly,
    }
}

/// Render `tensor`'s raw blob, base64-encoded.
pub fn render_blob(tensor: &Tensor) -> TensorPayload {
    use base64::Engine;
    TensorPayload {
        dtype: tensor.dtype().to_string(),
        shape: tensor.shape().to_vec(),
        encoding: TensorEncoding::Blob(base64::engine::general_purpose::STANDARD.encode(tensor.blob())),
    }
}

/// Render `tensor`'s values as strings, one per element in row-major order
/// (spec.md §8 scenario 1: `TensorGet out VALUES` replies as float64).
pub fn render_values(tensor: &Tensor) -> StrataResult<TensorPayload> {
    let mut values = Vec::with_capacity(tensor.len());
    for i in 0..tensor.len() {
        let rendered = match tensor.dtype() {
            DType::Bool => {
                if tensor.get_f64(i)? != 0.0 {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            DType::String => tensor.get_string(i)?.to_string(),
            _ => tensor.get_f64(i)?.to_string(),
        };
        values.push(rendered);
    }
    Ok(TensorPayload {
        dtype: tensor.dtype().to_string(),
        shape: tensor.shape().to_vec(),
        encoding: TensorEncoding::Values(values),
    })
}

/// Decode a base64 blob back into raw bytes (the inverse of
/// [`render_blob`], used when a caller sends `TensorSet ... BLOB`).
pub fn decode_blob(encoded: &str) -> StrataResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| StrataError::BadBlobLength {
            expected: 0,
            actual: e.to_string().len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Scalar;

    fn sample() -> Tensor {
        Tensor::from_values(
            DType::Float32,
            vec![2, 2],
            &[2.0, 3.0, 2.0, 3.0].map(Scalar::Number),
        )
        .unwrap()
    }

    #[test]
    fn values_render_as_float_strings() {
        let payload = render_values(&sample()).unwrap();
        match payload.encoding {
            TensorEncoding::Values(v) => assert_eq!(v, vec!["2", "3", "2", "3"]),
            _ => panic!("expected Values encoding"),
        }
    }

    #[test]
    fn blob_round_trips_through_base64() {
        let t = sample();
        let payload = render_blob(&t);
        match payload.encoding {
            TensorEncoding::Blob(b64) => {
                let decoded = decode_blob(&b64).unwrap();
                assert_eq!(decoded, t.blob());
            }
            _ => panic!("expected Blob encoding"),
        }
    }

    #[test]
    fn meta_only_has_no_data() {
        let payload = render_meta(&sample());
        assert_eq!(payload.encoding, TensorEncoding::MetaOnly);
        assert_eq!(payload.shape, vec![2, 2]);
    }
}
