//! The tensor object (C1): a typed n-dimensional array with shared
//! ownership and a zero-copy, DLPack-style view.
//!
//! Tensors are immutable after construction except for the refcount, so
//! sharing one across the DAG tensor slab, the worker pool, and a backend
//! call is just `Tensor::clone()` (an `Arc` bump) — no separate shallow-copy
//! type is needed the way the original manual-refcount implementation
//! needed one.

use crate::error::{StrataError, StrataResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The closed set of element types a tensor may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Boolean.
    Bool,
    /// Null-terminated UTF-8 strings.
    String,
}

impl DType {
    /// Size in bytes of one element, or `None` for the variable-length
    /// `String` dtype.
    pub fn element_bytes(&self) -> Option<usize> {
        Some(match self {
            DType::Float32 => 4,
            DType::Float64 => 8,
            DType::Int8 | DType::UInt8 | DType::Bool => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 => 4,
            DType::Int64 => 8,
            DType::String => return None,
        })
    }

    /// True for the variable-length string dtype.
    pub fn is_string(&self) -> bool {
        matches!(self, DType::String)
    }

    /// Parse a dtype from its wire name (e.g. `"FLOAT"`, `"INT64"`).
    pub fn parse(name: &str) -> StrataResult<Self> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "FLOAT" | "FLOAT32" => DType::Float32,
            "DOUBLE" | "FLOAT64" => DType::Float64,
            "INT8" => DType::Int8,
            "INT16" => DType::Int16,
            "INT32" => DType::Int32,
            "INT64" => DType::Int64,
            "UINT8" => DType::UInt8,
            "UINT16" => DType::UInt16,
            "BOOL" => DType::Bool,
            "STRING" => DType::String,
            other => {
                return Err(StrataError::BadDType {
                    dtype: other.to_string(),
                })
            }
        })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Float32 => "FLOAT",
            DType::Float64 => "DOUBLE",
            DType::Int8 => "INT8",
            DType::Int16 => "INT16",
            DType::Int32 => "INT32",
            DType::Int64 => "INT64",
            DType::UInt8 => "UINT8",
            DType::UInt16 => "UINT16",
            DType::Bool => "BOOL",
            DType::String => "STRING",
        };
        write!(f, "{s}")
    }
}

/// A single scalar, used when constructing a tensor from parsed literal
/// values (`TensorSet key dtype shape… VALUES v…`).
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Parses into any numeric dtype.
    Number(f64),
    /// Parses only into `Bool`.
    Bool(bool),
    /// Parses only into `String`.
    Str(String),
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

fn product(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// The inner, shared state of a tensor. `Tensor` is a thin `Arc` wrapper
/// around this so cloning a tensor is a refcount bump (spec.md §3
/// "Ownership: shared via atomic reference count").
#[derive(Debug)]
struct Inner {
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<usize>,
    blob: Vec<u8>,
    /// Byte offsets into `blob` for each string element; empty for
    /// numeric/bool dtypes.
    offsets: Vec<usize>,
}

/// A typed n-dimensional array with reference-counted shared ownership.
///
/// Immutable after construction: every accessor borrows from the shared
/// `Inner`, and every "write" (e.g. a DAG's single-assignment output slot)
/// is really a fresh `Tensor` replacing the slot, never a mutation in
/// place.
#[derive(Debug, Clone)]
pub struct Tensor(Arc<Inner>);

impl Tensor {
    /// Build a tensor from a dtype, shape, and an already-encoded blob.
    ///
    /// For numeric/bool dtypes this requires `blob.len() ==
    /// product(shape) * element_bytes`. For `String`, `blob` must be a
    /// concatenation of null-terminated strings whose terminator count
    /// equals `product(shape)`, with the final byte itself a terminator;
    /// the offsets array is derived by walking the blob.
    pub fn from_blob(dtype: DType, shape: Vec<usize>, blob: Vec<u8>) -> StrataResult<Self> {
        let count = product(&shape);
        let offsets = if dtype.is_string() {
            parse_string_offsets(&blob, count)?
        } else {
            let elem_bytes = dtype.element_bytes().expect("checked is_string above");
            let expected = count * elem_bytes;
            if blob.len() != expected {
                return Err(StrataError::BadBlobLength {
                    expected,
                    actual: blob.len(),
                });
            }
            Vec::new()
        };
        let strides = row_major_strides(&shape);
        Ok(Tensor(Arc::new(Inner {
            dtype,
            shape,
            strides,
            blob,
            offsets,
        })))
    }

    /// Build a tensor from parsed scalar literals (`TensorSet … VALUES
    /// v…`). Each value is validated against `dtype`, rejecting
    /// out-of-range integers, non-booleans for `Bool`, and so on.
    pub fn from_values(dtype: DType, shape: Vec<usize>, values: &[Scalar]) -> StrataResult<Self> {
        let count = product(&shape);
        if values.len() != count {
            return Err(StrataError::BadValue {
                value: format!("{} values", values.len()),
                dtype: dtype.to_string(),
            });
        }
        if dtype.is_string() {
            let mut blob = Vec::new();
            for v in values {
                let s = match v {
                    Scalar::Str(s) => s,
                    other => {
                        return Err(StrataError::BadValue {
                            value: format!("{other:?}"),
                            dtype: dtype.to_string(),
                        })
                    }
                };
                if s.contains('\0') {
                    return Err(StrataError::BadStringBlob {
                        reason: "string value contains an embedded null byte".to_string(),
                    });
                }
                blob.extend_from_slice(s.as_bytes());
                blob.push(0);
            }
            return Tensor::from_blob(dtype, shape, blob);
        }
        let elem_bytes = dtype.element_bytes().expect("numeric dtype");
        let mut blob = Vec::with_capacity(count * elem_bytes);
        for v in values {
            encode_scalar(dtype, v, &mut blob)?;
        }
        Tensor::from_blob(dtype, shape, blob)
    }

    /// Build an uninitialized (zero-filled) tensor of the given dtype and
    /// shape. Used for DAG output placeholders before a backend writes
    /// into them.
    pub fn zeroed(dtype: DType, shape: Vec<usize>) -> StrataResult<Self> {
        let count = product(&shape);
        let len = if dtype.is_string() {
            count
        } else {
            count * dtype.element_bytes().expect("numeric dtype")
        };
        let blob = if dtype.is_string() {
            vec![0u8; len]
        } else {
            vec![0u8; len]
        };
        Tensor::from_blob(dtype, shape, blob)
    }

    /// This tensor's element dtype.
    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    /// This tensor's shape.
    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    /// Row-major strides derived from `shape`.
    pub fn strides(&self) -> &[usize] {
        &self.0.strides
    }

    /// Total element count (`product(shape)`).
    pub fn len(&self) -> usize {
        product(&self.0.shape)
    }

    /// True if this tensor has zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw data blob.
    pub fn blob(&self) -> &[u8] {
        &self.0.blob
    }

    /// Byte size of the numeric blob. Panics (via `expect`) for string
    /// tensors, which have no fixed element size — callers should check
    /// `dtype().is_string()` first.
    pub fn byte_size(&self) -> usize {
        self.0.blob.len()
    }

    /// Byte offsets into `blob` for each string element (empty for
    /// non-string dtypes).
    pub fn offsets(&self) -> &[usize] {
        &self.0.offsets
    }

    /// Read element `idx` as a string. Only valid for `DType::String`.
    pub fn get_string(&self, idx: usize) -> StrataResult<&str> {
        if !self.0.dtype.is_string() {
            return Err(StrataError::wrong_type("String tensor", self.0.dtype.to_string()));
        }
        let start = self.0.offsets.get(idx).copied().ok_or_else(|| {
            StrataError::invalid_input(format!("string tensor index {idx} out of range"))
        })?;
        let end = self.0.blob[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .ok_or_else(|| StrataError::BadStringBlob {
                reason: "missing terminator".to_string(),
            })?;
        std::str::from_utf8(&self.0.blob[start..end])
            .map_err(|_| StrataError::BadStringBlob {
                reason: "invalid utf-8".to_string(),
            })
    }

    /// Read element `idx` as an `f64`. Fails for string dtype or an
    /// out-of-bounds index.
    pub fn get_f64(&self, idx: usize) -> StrataResult<f64> {
        if self.0.dtype.is_string() {
            return Err(StrataError::wrong_type("numeric tensor", "String"));
        }
        if idx >= self.len() {
            return Err(StrataError::invalid_input(format!(
                "tensor index {idx} out of range (len {})",
                self.len()
            )));
        }
        let elem_bytes = self.0.dtype.element_bytes().expect("non-string dtype");
        let start = idx * elem_bytes;
        let bytes = &self.0.blob[start..start + elem_bytes];
        Ok(match self.0.dtype {
            DType::Float32 => f32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            DType::Float64 => f64::from_le_bytes(bytes.try_into().unwrap()),
            DType::Int8 => bytes[0] as i8 as f64,
            DType::Int16 => i16::from_le_bytes(bytes.try_into().unwrap()) as f64,
            DType::Int32 => i32::from_le_bytes(bytes.try_into().unwrap()) as f64,
            DType::Int64 => i64::from_le_bytes(bytes.try_into().unwrap()) as f64,
            DType::UInt8 => bytes[0] as f64,
            DType::UInt16 => u16::from_le_bytes(bytes.try_into().unwrap()) as f64,
            DType::Bool => {
                if bytes[0] != 0 {
                    1.0
                } else {
                    0.0
                }
            }
            DType::String => unreachable!("checked above"),
        })
    }

    /// Read element `idx` as an `i64`. Fails for string dtype or an
    /// out-of-bounds index.
    pub fn get_i64(&self, idx: usize) -> StrataResult<i64> {
        Ok(self.get_f64(idx)? as i64)
    }

    /// Concatenate tensors across the outermost dimension. All inputs
    /// must share dtype and trailing shape (every dimension but the
    /// first).
    pub fn concat(tensors: &[Tensor]) -> StrataResult<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| StrataError::invalid_input("concat requires at least one tensor"))?;
        let dtype = first.dtype();
        let trailing = &first.shape()[1..];
        let mut outer = 0usize;
        let mut blob = Vec::new();
        for t in tensors {
            if t.dtype() != dtype || &t.shape()[1..] != trailing {
                return Err(StrataError::dag_run(
                    "batch concat requires matching dtype and trailing shape",
                ));
            }
            outer += t.shape().first().copied().unwrap_or(0);
            blob.extend_from_slice(t.blob());
        }
        let mut shape = vec![outer];
        shape.extend_from_slice(trailing);
        Tensor::from_blob(dtype, shape, blob)
    }

    /// Slice along the outermost dimension: `[offset, offset+len)`.
    pub fn slice_outer(&self, offset: usize, len: usize) -> StrataResult<Tensor> {
        let outer = *self.shape().first().unwrap_or(&0);
        if offset + len > outer {
            return Err(StrataError::invalid_input(format!(
                "slice [{offset}, {}) exceeds outer extent {outer}",
                offset + len
            )));
        }
        if self.0.dtype.is_string() {
            let start = self.0.offsets[offset * self.row_stride_elems()];
            let end_idx = (offset + len) * self.row_stride_elems();
            let end = if end_idx < self.0.offsets.len() {
                self.0.offsets[end_idx]
            } else {
                self.0.blob.len()
            };
            let blob = self.0.blob[start..end].to_vec();
            let mut shape = vec![len];
            shape.extend_from_slice(&self.shape()[1..]);
            return Tensor::from_blob(self.0.dtype, shape, blob);
        }
        let elem_bytes = self.0.dtype.element_bytes().expect("non-string dtype");
        let row_elems: usize = self.shape()[1..].iter().product();
        let start = offset * row_elems * elem_bytes;
        let end = (offset + len) * row_elems * elem_bytes;
        let blob = self.0.blob[start..end].to_vec();
        let mut shape = vec![len];
        shape.extend_from_slice(&self.shape()[1..]);
        Tensor::from_blob(self.0.dtype, shape, blob)
    }

    fn row_stride_elems(&self) -> usize {
        self.shape()[1..].iter().product::<usize>().max(1)
    }

    /// A DLPack-style zero-copy view: everything a backend needs to read
    /// this tensor's data in place (spec.md §3 "DLPack-style view").
    pub fn dlpack_view(&self) -> DlpackView<'_> {
        DlpackView {
            data: self.0.blob.as_ptr(),
            byte_len: self.0.blob.len(),
            ndim: self.0.shape.len(),
            shape: &self.0.shape,
            strides: &self.0.strides,
            dtype: self.0.dtype,
            byte_offset: 0,
        }
    }
}

/// Zero-copy view of a tensor's data, shaped after DLPack's `DLTensor`.
///
/// Borrows from the originating `Tensor`; a backend that needs the data
/// past the view's lifetime must `Tensor::clone()` the owner first.
#[derive(Debug)]
pub struct DlpackView<'a> {
    /// Raw pointer to the start of the data blob.
    pub data: *const u8,
    /// Length of the data blob in bytes.
    pub byte_len: usize,
    /// Number of dimensions.
    pub ndim: usize,
    /// Shape, one extent per dimension.
    pub shape: &'a [usize],
    /// Row-major strides, one per dimension.
    pub strides: &'a [usize],
    /// Element dtype.
    pub dtype: DType,
    /// Byte offset of the first element (always 0; kept for DLPack
    /// struct-shape parity).
    pub byte_offset: usize,
}

fn parse_string_offsets(blob: &[u8], expected_count: usize) -> StrataResult<Vec<usize>> {
    if expected_count == 0 {
        if !blob.is_empty() {
            return Err(StrataError::BadStringBlob {
                reason: "non-empty blob for zero-element tensor".to_string(),
            });
        }
        return Ok(Vec::new());
    }
    if blob.last() != Some(&0) {
        return Err(StrataError::BadStringBlob {
            reason: "blob does not end with a null terminator".to_string(),
        });
    }
    let mut offsets = Vec::with_capacity(expected_count);
    let mut start = 0usize;
    for (i, &b) in blob.iter().enumerate() {
        if start == i {
            offsets.push(start);
        }
        if b == 0 {
            start = i + 1;
        }
    }
    if offsets.len() != expected_count {
        return Err(StrataError::BadStringBlob {
            reason: format!(
                "expected {expected_count} null-terminated strings, found {}",
                offsets.len()
            ),
        });
    }
    Ok(offsets)
}

fn encode_scalar(dtype: DType, value: &Scalar, out: &mut Vec<u8>) -> StrataResult<()> {
    let bad = || StrataError::BadValue {
        value: format!("{value:?}"),
        dtype: dtype.to_string(),
    };
    match dtype {
        DType::Bool => {
            let Scalar::Bool(b) = value else { return Err(bad()) };
            out.push(if *b { 1 } else { 0 });
        }
        DType::Float32 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            out.extend_from_slice(&(*n as f32).to_le_bytes());
        }
        DType::Float64 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            out.extend_from_slice(&n.to_le_bytes());
        }
        DType::Int8 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            let i = *n as i64;
            if i < i8::MIN as i64 || i > i8::MAX as i64 {
                return Err(bad());
            }
            out.push(i as i8 as u8);
        }
        DType::Int16 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            let i = *n as i64;
            if i < i16::MIN as i64 || i > i16::MAX as i64 {
                return Err(bad());
            }
            out.extend_from_slice(&(i as i16).to_le_bytes());
        }
        DType::Int32 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            let i = *n as i64;
            if i < i32::MIN as i64 || i > i32::MAX as i64 {
                return Err(bad());
            }
            out.extend_from_slice(&(i as i32).to_le_bytes());
        }
        DType::Int64 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            out.extend_from_slice(&(*n as i64).to_le_bytes());
        }
        DType::UInt8 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            let i = *n as i64;
            if !(0..=u8::MAX as i64).contains(&i) {
                return Err(bad());
            }
            out.push(i as u8);
        }
        DType::UInt16 => {
            let Scalar::Number(n) = value else { return Err(bad()) };
            let i = *n as i64;
            if !(0..=u16::MAX as i64).contains(&i) {
                return Err(bad());
            }
            out.extend_from_slice(&(i as u16).to_le_bytes());
        }
        DType::String => unreachable!("string dtype handled separately"),
    }
    Ok(())
}
