//! N-dimensional array wire types
//!
//! `DenseArray` carries a raw little-endian element buffer together with the
//! metadata needed to reverse any quantization applied to it. `SparseArray`
//! stores coordinate/value pairs for mostly-zero data. Encoding and decoding
//! live in the `codec` crate; this module only holds the structures and
//! their structural invariants.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical element type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float16,
    Float32,
    Float64,
    Uint8,
    Int32,
    Int64,
}

impl DType {
    /// Size of one element in bytes
    pub const fn element_size(self) -> usize {
        match self {
            DType::Uint8 => 1,
            DType::Float16 => 2,
            DType::Float32 | DType::Int32 => 4,
            DType::Float64 | DType::Int64 => 8,
        }
    }

    /// Canonical lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Uint8 => "uint8",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
        }
    }

    /// True for the floating point element types
    pub const fn is_float(self) -> bool {
        matches!(self, DType::Float16 | DType::Float32 | DType::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float16" | "f16" | "<f2" => Ok(DType::Float16),
            "float32" | "f32" | "<f4" => Ok(DType::Float32),
            "float64" | "f64" | "<f8" => Ok(DType::Float64),
            "uint8" | "u8" | "|u1" => Ok(DType::Uint8),
            "int32" | "i32" | "<i4" => Ok(DType::Int32),
            "int64" | "i64" | "<i8" => Ok(DType::Int64),
            other => Err(TypesError::configuration(
                format!("Unknown dtype '{}'", other),
                Some("dtype"),
            )),
        }
    }
}

/// Quantization applied to a dense buffer
///
/// The numeric values are part of the wire contract.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuantizationMode {
    #[default]
    None = 0,
    Fp16 = 1,
    Uint8 = 2,
    Fp32 = 3,
}

impl QuantizationMode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QuantizationMode::None),
            1 => Ok(QuantizationMode::Fp16),
            2 => Ok(QuantizationMode::Uint8),
            3 => Ok(QuantizationMode::Fp32),
            other => Err(TypesError::configuration(
                format!("Unknown quantization mode {}", other),
                Some("quantization"),
            )),
        }
    }
}

/// Dense n-dimensional array in wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseArray {
    /// Raw little-endian element bytes
    pub buffer: Vec<u8>,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub quantization: QuantizationMode,
    pub max_val: f64,
    pub min_val: f64,
    pub scale: f64,
    /// Element type before quantization (equal to `dtype` when unquantized)
    pub original_dtype: DType,
}

impl DenseArray {
    /// Unquantized array over an existing buffer
    pub fn new(buffer: Vec<u8>, shape: Vec<usize>, dtype: DType) -> Result<Self> {
        let array = Self {
            buffer,
            shape,
            dtype,
            quantization: QuantizationMode::None,
            max_val: 0.0,
            min_val: 0.0,
            scale: 0.0,
            original_dtype: dtype,
        };
        array.validate()?;
        Ok(array)
    }

    /// Number of logical elements, saturating at `usize::MAX`
    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }

    /// Expected buffer length for the current shape and dtype
    pub fn expected_len(&self) -> Result<usize> {
        checked_element_count(&self.shape)?
            .checked_mul(self.dtype.element_size())
            .ok_or_else(|| overflow(&self.shape))
    }

    /// Check buffer length and quantization metadata
    pub fn validate(&self) -> Result<()> {
        let expected = self.expected_len()?;
        if self.buffer.len() != expected {
            return Err(TypesError::shape_mismatch(
                format!(
                    "buffer of {} array with shape {:?} has wrong length",
                    self.dtype, self.shape
                ),
                expected,
                self.buffer.len(),
            ));
        }

        match self.quantization {
            QuantizationMode::None => Ok(()),
            mode => {
                if self.original_dtype == self.dtype {
                    return Err(TypesError::configuration(
                        format!(
                            "quantized array ({:?}) must record a different original dtype, both are {}",
                            mode, self.dtype
                        ),
                        Some("original_dtype"),
                    ));
                }
                if mode == QuantizationMode::Uint8
                    && !(self.scale > 0.0
                        && self.scale.is_finite()
                        && self.min_val.is_finite()
                        && self.max_val.is_finite()
                        && self.max_val >= self.min_val)
                {
                    return Err(TypesError::configuration(
                        format!(
                            "uint8 quantization requires a finite scale > 0 and finite min <= max, got scale {} range {}..{}",
                            self.scale, self.min_val, self.max_val
                        ),
                        Some("scale"),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Sparse n-dimensional array in coordinate form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseArray {
    /// Int64 coordinates with logical shape `[N, ndims]`
    pub indices: DenseArray,
    /// Values with logical shape `[N]`
    pub values: DenseArray,
    /// Logical dense shape
    pub shape: Vec<usize>,
}

impl SparseArray {
    /// Number of stored (non-zero) entries
    pub fn nnz(&self) -> usize {
        self.values.element_count()
    }

    /// Check that index rows and values agree in count and arity
    pub fn validate_layout(&self) -> Result<()> {
        if self.indices.dtype != DType::Int64 {
            return Err(TypesError::configuration(
                format!("sparse indices must be int64, got {}", self.indices.dtype),
                Some("indices.dtype"),
            ));
        }
        let rows = self.indices.shape.first().copied().unwrap_or(0);
        if rows != self.values.element_count() {
            return Err(TypesError::shape_mismatch(
                "sparse index rows and value count disagree",
                self.values.element_count(),
                rows,
            ));
        }
        let arity = self.indices.shape.get(1).copied().unwrap_or(0);
        if rows > 0 && arity != self.shape.len() {
            return Err(TypesError::shape_mismatch(
                "sparse index arity does not match dense rank",
                self.shape.len(),
                arity,
            ));
        }
        Ok(())
    }
}

/// Either a dense or a sparse array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NdArray {
    Dense(DenseArray),
    Sparse(SparseArray),
}

impl NdArray {
    /// Logical (dense) shape of either variant
    pub fn shape(&self) -> &[usize] {
        match self {
            NdArray::Dense(dense) => &dense.shape,
            NdArray::Sparse(sparse) => &sparse.shape,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, NdArray::Sparse(_))
    }

    /// Structural checks of either variant, without decoding
    pub fn validate(&self) -> Result<()> {
        match self {
            NdArray::Dense(dense) => dense.validate(),
            NdArray::Sparse(sparse) => {
                sparse.validate_layout()?;
                sparse.indices.validate()?;
                sparse.values.validate()
            }
        }
    }
}

impl From<DenseArray> for NdArray {
    fn from(array: DenseArray) -> Self {
        NdArray::Dense(array)
    }
}

impl From<SparseArray> for NdArray {
    fn from(array: SparseArray) -> Self {
        NdArray::Sparse(array)
    }
}

/// Product of dimensions (1 for a scalar shape), saturating at `usize::MAX`
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().fold(1usize, |acc, dim| acc.saturating_mul(*dim))
}

/// Product of dimensions, or ShapeMismatch when it overflows `usize`
pub fn checked_element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| overflow(shape))
}

fn overflow(shape: &[usize]) -> TypesError {
    TypesError::shape_mismatch(
        format!("element count of shape {:?} overflows usize", shape),
        format!("at most {}", usize::MAX),
        "overflow",
    )
}
