//! Versioned on-disk encoding for the three keyspace object kinds a
//! persisted DAG output can be: tensors, models, and scripts (spec.md §6
//! "Persistence encoding").
//!
//! Every record starts with a `u32` format version. The engine always
//! *writes* [`CURRENT_VERSION`]; it must keep decoding the older layouts
//! below it wrote in earlier releases. Tensor records can be decoded
//! directly into `strata_core::Tensor` because that type already lives in
//! `strata-core`, which this crate depends on; `Model`/`Script` live in
//! `strata-engine` (which depends on *this* crate), so their persisted
//! shape is a plain record the engine maps to/from its own types.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use strata_core::{DType, StrataError, StrataResult, Tensor};

/// The format version every new write uses.
pub const CURRENT_VERSION: u32 = 4;

fn dtype_code(dtype: DType) -> u8 {
    match dtype {
        DType::Float32 => 0,
        DType::Float64 => 1,
        DType::Int8 => 2,
        DType::Int16 => 3,
        DType::Int32 => 4,
        DType::Int64 => 5,
        DType::UInt8 => 6,
        DType::UInt16 => 7,
        DType::Bool => 8,
        DType::String => 9,
    }
}

fn dtype_from_code(code: u8) -> StrataResult<DType> {
    Ok(match code {
        0 => DType::Float32,
        1 => DType::Float64,
        2 => DType::Int8,
        3 => DType::Int16,
        4 => DType::Int32,
        5 => DType::Int64,
        6 => DType::UInt8,
        7 => DType::UInt16,
        8 => DType::Bool,
        9 => DType::String,
        other => {
            return Err(StrataError::Corruption {
                message: format!("unknown dtype code {other}"),
            })
        }
    })
}

fn dtype_bits(dtype: DType) -> u16 {
    match dtype.element_bytes() {
        Some(bytes) => bytes as u16 * 8,
        None => 0, // string: variable length, no fixed bit width
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(cur: &mut Cursor<&[u8]>) -> StrataResult<String> {
    let len = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes).map_err(corrupt)?;
    String::from_utf8(bytes).map_err(|_| StrataError::Corruption {
        message: "string field is not valid utf-8".to_string(),
    })
}

fn write_blob(buf: &mut Vec<u8>, blob: &[u8]) {
    buf.write_u64::<LittleEndian>(blob.len() as u64).unwrap();
    buf.extend_from_slice(blob);
}

fn read_blob(cur: &mut Cursor<&[u8]>, len_bytes: u8) -> StrataResult<Vec<u8>> {
    let len = if len_bytes == 4 {
        cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize
    } else {
        cur.read_u64::<LittleEndian>().map_err(corrupt)? as usize
    };
    let mut blob = vec![0u8; len];
    cur.read_exact(&mut blob).map_err(corrupt)?;
    Ok(blob)
}

fn corrupt(e: std::io::Error) -> StrataError {
    StrataError::Corruption {
        message: format!("truncated record: {e}"),
    }
}

// ---------------------------------------------------------------------
// Tensor
// ---------------------------------------------------------------------

/// Encode a tensor at [`CURRENT_VERSION`]: dtype code, dtype bits, ndim,
/// shape entries, the data blob, and — only for string tensors — the
/// offsets array.
pub fn encode_tensor(tensor: &Tensor) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(CURRENT_VERSION).unwrap();
    buf.write_u8(dtype_code(tensor.dtype())).unwrap();
    buf.write_u16::<LittleEndian>(dtype_bits(tensor.dtype())).unwrap();
    buf.write_u32::<LittleEndian>(tensor.shape().len() as u32)
        .unwrap();
    for &extent in tensor.shape() {
        buf.write_u64::<LittleEndian>(extent as u64).unwrap();
    }
    write_blob(&mut buf, tensor.blob());
    if tensor.dtype().is_string() {
        buf.write_u64::<LittleEndian>(tensor.offsets().len() as u64)
            .unwrap();
        for &off in tensor.offsets() {
            buf.write_u64::<LittleEndian>(off as u64).unwrap();
        }
    }
    buf
}

/// Decode a tensor record written at any of versions 0 through
/// [`CURRENT_VERSION`].
pub fn decode_tensor(bytes: &[u8]) -> StrataResult<Tensor> {
    let mut cur = Cursor::new(bytes);
    let version = cur.read_u32::<LittleEndian>().map_err(corrupt)?;
    match version {
        0 => decode_tensor_v0(&mut cur),
        1 => decode_tensor_v1(&mut cur),
        2..=4 => decode_tensor_v2_plus(&mut cur, version),
        other => Err(StrataError::Corruption {
            message: format!("unsupported tensor record version {other}"),
        }),
    }
}

// v0: dtype code only (no bits field), u32 shape entries, u32 blob length,
// no string-tensor support.
fn decode_tensor_v0(cur: &mut Cursor<&[u8]>) -> StrataResult<Tensor> {
    let dtype = dtype_from_code(cur.read_u8().map_err(corrupt)?)?;
    if dtype.is_string() {
        return Err(StrataError::Corruption {
            message: "string tensors are not representable in v0 records".to_string(),
        });
    }
    let ndim = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize);
    }
    let blob = read_blob(cur, 4)?;
    Tensor::from_blob(dtype, shape, blob)
}

// v1: adds the dtype_bits field after the code; shape/blob still u32.
fn decode_tensor_v1(cur: &mut Cursor<&[u8]>) -> StrataResult<Tensor> {
    let dtype = dtype_from_code(cur.read_u8().map_err(corrupt)?)?;
    let _bits = cur.read_u16::<LittleEndian>().map_err(corrupt)?;
    if dtype.is_string() {
        return Err(StrataError::Corruption {
            message: "string tensors are not representable in v1 records".to_string(),
        });
    }
    let ndim = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize);
    }
    let blob = read_blob(cur, 4)?;
    Tensor::from_blob(dtype, shape, blob)
}

// v2..=CURRENT_VERSION: u64 shape/blob lengths, explicit offsets array for
// string tensors. v2/v3/v4 share this layout; the version bumps between
// them only ever signaled intent, not a structural change.
fn decode_tensor_v2_plus(cur: &mut Cursor<&[u8]>, _version: u32) -> StrataResult<Tensor> {
    let dtype = dtype_from_code(cur.read_u8().map_err(corrupt)?)?;
    let _bits = cur.read_u16::<LittleEndian>().map_err(corrupt)?;
    let ndim = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(cur.read_u64::<LittleEndian>().map_err(corrupt)? as usize);
    }
    let blob = read_blob(cur, 8)?;
    if dtype.is_string() {
        // The offsets array is redundant with what `Tensor::from_blob`
        // derives by walking the blob's null terminators; we still read
        // it off the wire to stay positioned correctly, then discard it
        // in favor of re-deriving (and thereby re-validating) it.
        let count = cur.read_u64::<LittleEndian>().map_err(corrupt)? as usize;
        for _ in 0..count {
            cur.read_u64::<LittleEndian>().map_err(corrupt)?;
        }
    }
    Tensor::from_blob(dtype, shape, blob)
}

// ---------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------

/// The persisted shape of a `Model` object. `strata-engine` maps its own
/// `Model` type to and from this record; kept here (rather than in
/// `strata-engine`) because the dependency only goes `engine -> durability`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRecord {
    /// Backend identifier (`TF`, `TFLITE`, `TORCH`, `ONNX`, …).
    pub backend: String,
    /// Device string (`CPU`, `GPU:0`, …).
    pub device: String,
    /// User-supplied tag.
    pub tag: String,
    /// Max batch size (0 = batching disabled).
    pub batchsize: u64,
    /// Minimum batch size required before `minbatchtimeout_ms` is honored.
    pub minbatchsize: u64,
    /// How long a partial batch may wait for more arrivals.
    pub minbatchtimeout_ms: u64,
    /// Declared input names, if the framework requires them.
    pub inputs: Vec<String>,
    /// Declared output names, if the framework requires them.
    pub outputs: Vec<String>,
    /// The model's serialized definition, chunked for storage (spec.md §6
    /// `model_chunk_size`).
    pub chunks: Vec<Vec<u8>>,
}

/// Encode a model record at [`CURRENT_VERSION`].
pub fn encode_model(rec: &ModelRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(CURRENT_VERSION).unwrap();
    write_string(&mut buf, &rec.backend);
    write_string(&mut buf, &rec.device);
    write_string(&mut buf, &rec.tag);
    buf.write_u64::<LittleEndian>(rec.batchsize).unwrap();
    buf.write_u64::<LittleEndian>(rec.minbatchsize).unwrap();
    buf.write_u64::<LittleEndian>(rec.minbatchtimeout_ms)
        .unwrap();
    buf.write_u32::<LittleEndian>(rec.inputs.len() as u32)
        .unwrap();
    for name in &rec.inputs {
        write_string(&mut buf, name);
    }
    buf.write_u32::<LittleEndian>(rec.outputs.len() as u32)
        .unwrap();
    for name in &rec.outputs {
        write_string(&mut buf, name);
    }
    buf.write_u32::<LittleEndian>(rec.chunks.len() as u32)
        .unwrap();
    for chunk in &rec.chunks {
        write_blob(&mut buf, chunk);
    }
    buf
}

/// Decode a model record written at any of versions 0 through
/// [`CURRENT_VERSION`].
pub fn decode_model(bytes: &[u8]) -> StrataResult<ModelRecord> {
    let mut cur = Cursor::new(bytes);
    let version = cur.read_u32::<LittleEndian>().map_err(corrupt)?;
    let backend = read_string(&mut cur)?;
    let device = read_string(&mut cur)?;
    let tag = read_string(&mut cur)?;

    let (batchsize, minbatchsize, minbatchtimeout_ms) = if version >= 1 {
        (
            cur.read_u64::<LittleEndian>().map_err(corrupt)?,
            cur.read_u64::<LittleEndian>().map_err(corrupt)?,
            cur.read_u64::<LittleEndian>().map_err(corrupt)?,
        )
    } else {
        (0, 0, 0)
    };

    let (inputs, outputs) = if version >= 2 {
        let n_in = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
        let mut inputs = Vec::with_capacity(n_in);
        for _ in 0..n_in {
            inputs.push(read_string(&mut cur)?);
        }
        let n_out = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
        let mut outputs = Vec::with_capacity(n_out);
        for _ in 0..n_out {
            outputs.push(read_string(&mut cur)?);
        }
        (inputs, outputs)
    } else {
        (Vec::new(), Vec::new())
    };

    let chunks = if version >= 3 {
        let n_chunks = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
        let mut chunks = Vec::with_capacity(n_chunks);
        for _ in 0..n_chunks {
            chunks.push(read_blob(&mut cur, 8)?);
        }
        chunks
    } else {
        // v0 wrote a single unsplit blob.
        vec![read_blob(&mut cur, 8)?]
    };

    Ok(ModelRecord {
        backend,
        device,
        tag,
        batchsize,
        minbatchsize,
        minbatchtimeout_ms,
        inputs,
        outputs,
        chunks,
    })
}

// ---------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------

/// The persisted shape of a `Script` object.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRecord {
    /// Device string.
    pub device: String,
    /// User-supplied tag.
    pub tag: String,
    /// Script source text.
    pub source: String,
    /// Declared entry-point function names.
    pub entry_points: Vec<String>,
}

/// Encode a script record at [`CURRENT_VERSION`].
pub fn encode_script(rec: &ScriptRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(CURRENT_VERSION).unwrap();
    write_string(&mut buf, &rec.device);
    write_string(&mut buf, &rec.tag);
    write_string(&mut buf, &rec.source);
    buf.write_u32::<LittleEndian>(rec.entry_points.len() as u32)
        .unwrap();
    for name in &rec.entry_points {
        write_string(&mut buf, name);
    }
    buf
}

/// Decode a script record written at any of versions 0 through
/// [`CURRENT_VERSION`]. v0 predates entry-point declarations; those decode
/// to an empty list.
pub fn decode_script(bytes: &[u8]) -> StrataResult<ScriptRecord> {
    let mut cur = Cursor::new(bytes);
    let version = cur.read_u32::<LittleEndian>().map_err(corrupt)?;
    let device = read_string(&mut cur)?;
    let tag = read_string(&mut cur)?;
    let source = read_string(&mut cur)?;
    let entry_points = if version >= 1 {
        let n = cur.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
        let mut names = Vec::with_capacity(n);
        for _ in 0..n {
            names.push(read_string(&mut cur)?);
        }
        names
    } else {
        Vec::new()
    };
    Ok(ScriptRecord {
        device,
        tag,
        source,
        entry_points,
    })
}
