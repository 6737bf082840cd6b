// src/gguf.rs
//! GGUF header, metadata and tensor-descriptor reader. Tensor data is never
//! read.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const GGUF_MAGIC: &[u8; 4] = b"GGUF";

/// GGUF "value type" enum (for metadata / kv pairs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GgufValueType {
    Uint8 = 0,
    Int8 = 1,
    Uint16 = 2,
    Int16 = 3,
    Uint32 = 4,
    Int32 = 5,
    Float32 = 6,
    Bool = 7,
    String = 8,
    Array = 9,
    Uint64 = 10,
    Int64 = 11,
    Float64 = 12,
}

impl TryFrom<u32> for GgufValueType {
    type Error = anyhow::Error;

    fn try_from(x: u32) -> Result<Self> {
        use GgufValueType::*;
        Ok(match x {
            0 => Uint8,
            1 => Int8,
            2 => Uint16,
            3 => Int16,
            4 => Uint32,
            5 => Int32,
            6 => Float32,
            7 => Bool,
            8 => String,
            9 => Array,
            10 => Uint64,
            11 => Int64,
            12 => Float64,
            other => bail!("unknown GGUF value type: {other}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GgufScalar {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
}

impl GgufScalar {
    /// Any integer type that fits in `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        use GgufScalar::*;
        match *self {
            U8(x) => Some(x as u32),
            U16(x) => Some(x as u32),
            U32(x) => Some(x),
            U64(x) => x.try_into().ok(),
            I8(x) => x.try_into().ok(),
            I16(x) => x.try_into().ok(),
            I32(x) => x.try_into().ok(),
            I64(x) => x.try_into().ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            GgufScalar::F32(x) => Some(x),
            GgufScalar::F64(x) => Some(x as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            GgufScalar::Bool(b) => Some(b),
            _ => None,
        }
    }
}

/// A GGUF metadata value: either a single scalar or an array of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GgufValue {
    Scalar(GgufScalar),
    Array(Vec<GgufScalar>),
}

impl GgufValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GgufValue::Scalar(GgufScalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            GgufValue::Scalar(s) => s.as_u32(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            GgufValue::Scalar(s) => s.as_f32(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GgufValue::Scalar(s) => s.as_bool(),
            _ => None,
        }
    }

    /// Every element must convert; a single bad element rejects the array.
    pub fn as_u32_array(&self) -> Option<Vec<u32>> {
        match self {
            GgufValue::Array(items) => items.iter().map(GgufScalar::as_u32).collect(),
            _ => None,
        }
    }
}

/// One entry of the tensor-info section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GgufTensor {
    pub name: String,
    pub dims: Vec<u64>,
    /// Raw ggml type id.
    pub dtype: u32,
    /// Relative to the start of the tensor data section.
    pub offset: u64,
}

impl GgufTensor {
    pub fn n_elements(&self) -> u64 {
        self.dims.iter().product()
    }
}

/// Header, metadata and tensor descriptors of a GGUF file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GgufModel {
    pub version: u32,
    pub metadata: HashMap<String, GgufValue>,
    pub tensors: Vec<GgufTensor>,
}

impl GgufModel {
    /// `general.architecture`, the prefix of every model-specific key.
    pub fn architecture(&self) -> Option<&str> {
        self.metadata
            .get("general.architecture")
            .and_then(GgufValue::as_str)
    }

    pub fn tensor(&self, name: &str) -> Option<&GgufTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }
}

pub fn load_gguf(path: &Path) -> Result<GgufModel> {
    let f = File::open(path).with_context(|| format!("failed to open GGUF file {:?}", path))?;
    read_gguf(&mut BufReader::new(f)).with_context(|| format!("failed to parse GGUF file {:?}", path))
}

/// Parse the header, metadata and tensor descriptors from any reader
/// positioned at the start of a GGUF stream.
pub fn read_gguf<R: Read>(r: &mut R) -> Result<GgufModel> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).context("reading GGUF magic")?;
    if &magic != GGUF_MAGIC {
        bail!("Not a GGUF file (magic != GGUF)");
    }

    let version = read_u32(r)?;
    if !(2..=3).contains(&version) {
        tracing::warn!(version, "unexpected GGUF version, parsing as v3");
    }

    let n_tensors = read_u64(r)?;
    let n_kv = read_u64(r)?;

    let mut metadata = HashMap::new();
    for _ in 0..n_kv {
        let key = read_string(r)?;
        let vt = GgufValueType::try_from(read_u32(r)?)
            .with_context(|| format!("metadata key '{key}'"))?;

        let val = match vt {
            GgufValueType::Array => {
                let elem_type = GgufValueType::try_from(read_u32(r)?)
                    .with_context(|| format!("array element type of '{key}'"))?;
                if elem_type == GgufValueType::Array {
                    bail!("nested GGUF arrays are not supported ('{key}')");
                }
                let len = read_u64(r)?;
                let mut elems = Vec::with_capacity(len.min(1 << 16) as usize);
                for _ in 0..len {
                    elems.push(read_scalar(r, elem_type)?);
                }
                GgufValue::Array(elems)
            }
            other => GgufValue::Scalar(read_scalar(r, other)?),
        };

        metadata.insert(key, val);
    }

    let mut tensors = Vec::with_capacity(n_tensors.min(1 << 16) as usize);
    for _ in 0..n_tensors {
        let name = read_string(r)?;
        let n_dims = read_u32(r)?;
        let dims = (0..n_dims)
            .map(|_| read_u64(r))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("dims of tensor '{name}'"))?;
        let dtype = read_u32(r)?;
        let offset = read_u64(r)?;
        tensors.push(GgufTensor {
            name,
            dims,
            dtype,
            offset,
        });
    }

    tracing::debug!(version, n_tensors, n_kv, "parsed GGUF header");

    Ok(GgufModel {
        version,
        metadata,
        tensors,
    })
}

// ---------- helpers ----------

fn read_array<const N: usize, R: Read>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(r)?))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array(r)?))
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    // GGUF strings: length (u64), then that many raw bytes (no null terminator)
    let len = read_u64(r)?;
    let mut buf = Vec::new();
    r.by_ref().take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        bail!("truncated GGUF string: expected {len} bytes, got {}", buf.len());
    }
    String::from_utf8(buf).context("GGUF string is not valid UTF-8")
}

fn read_scalar<R: Read>(r: &mut R, vt: GgufValueType) -> Result<GgufScalar> {
    use GgufScalar::*;
    let scalar = match vt {
        GgufValueType::Uint8 => U8(u8::from_le_bytes(read_array(r)?)),
        GgufValueType::Int8 => I8(i8::from_le_bytes(read_array(r)?)),
        GgufValueType::Uint16 => U16(u16::from_le_bytes(read_array(r)?)),
        GgufValueType::Int16 => I16(i16::from_le_bytes(read_array(r)?)),
        GgufValueType::Uint32 => U32(read_u32(r)?),
        GgufValueType::Int32 => I32(i32::from_le_bytes(read_array(r)?)),
        GgufValueType::Uint64 => U64(read_u64(r)?),
        GgufValueType::Int64 => I64(i64::from_le_bytes(read_array(r)?)),
        GgufValueType::Float32 => F32(f32::from_le_bytes(read_array(r)?)),
        GgufValueType::Float64 => F64(f64::from_le_bytes(read_array(r)?)),
        GgufValueType::Bool => {
            let [b] = read_array::<1, _>(r)?;
            Bool(b != 0)
        }
        GgufValueType::String => Str(read_string(r)?),
        GgufValueType::Array => bail!("read_scalar called with ARRAY type"),
    };
    Ok(scalar)
}
