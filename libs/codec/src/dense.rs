//! Dense array codec with optional quantization
//!
//! `encode` turns an in-memory [`RawArray`] into the wire [`DenseArray`],
//! optionally narrowing it:
//!
//! | mode  | source       | stored as | decode                           |
//! |-------|--------------|-----------|----------------------------------|
//! | NONE  | any          | same      | exact little-endian copy         |
//! | FP16  | f32, f64     | f16       | widened to the source dtype      |
//! | FP32  | f64          | f32       | widened to f64                   |
//! | UINT8 | f16/f32/f64  | u8        | `q * scale + min`, capped at max |
//!
//! Encoding is pure and deterministic. Decoding dispatches on the
//! quantization tag and restores `original_dtype`.

use crate::error::{CodecError, Result};
use half::f16;
use ndarray::{ArrayD, IxDyn};
use std::fmt;
use tracing::trace;
use types::array::element_count;
use types::{DType, DenseArray, QuantizationMode};

/// Element types that can live in a [`RawArray`]
pub trait Element: Copy + bytemuck::Pod + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);

    /// `bytes` holds exactly one element
    fn read_le(bytes: &[u8]) -> Self;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;

    fn wrap(array: ArrayD<Self>) -> RawArray;

    /// Hands the array back unchanged when it holds another dtype
    fn unwrap(raw: RawArray) -> std::result::Result<ArrayD<Self>, RawArray>;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident, $to_f64:expr, $from_f64:expr) => {
        impl Element for $t {
            const DTYPE: DType = DType::$variant;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }

            fn to_f64(self) -> f64 {
                ($to_f64)(self)
            }

            fn from_f64(value: f64) -> Self {
                ($from_f64)(value)
            }

            fn wrap(array: ArrayD<Self>) -> RawArray {
                RawArray::$variant(array)
            }

            fn unwrap(raw: RawArray) -> std::result::Result<ArrayD<Self>, RawArray> {
                match raw {
                    RawArray::$variant(array) => Ok(array),
                    other => Err(other),
                }
            }
        }
    };
}

impl_element!(f16, Float16, |v: f16| v.to_f64(), f16::from_f64);
impl_element!(f32, Float32, |v: f32| v as f64, |v: f64| v as f32);
impl_element!(f64, Float64, |v: f64| v, |v: f64| v);
impl_element!(u8, Uint8, |v: u8| v as f64, |v: f64| v as u8);
impl_element!(i32, Int32, |v: i32| v as f64, |v: f64| v as i32);
impl_element!(i64, Int64, |v: i64| v as f64, |v: f64| v as i64);

/// In-memory n-dimensional array, one variant per supported dtype
#[derive(Debug, Clone, PartialEq)]
pub enum RawArray {
    Float16(ArrayD<f16>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
    Uint8(ArrayD<u8>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
}

/// Run `$body` with `$array` bound to the typed array of any variant
macro_rules! dispatch {
    ($raw:expr, $array:ident => $body:expr) => {
        match $raw {
            RawArray::Float16($array) => $body,
            RawArray::Float32($array) => $body,
            RawArray::Float64($array) => $body,
            RawArray::Uint8($array) => $body,
            RawArray::Int32($array) => $body,
            RawArray::Int64($array) => $body,
        }
    };
}
pub(crate) use dispatch;

impl RawArray {
    pub fn dtype(&self) -> DType {
        match self {
            RawArray::Float16(_) => DType::Float16,
            RawArray::Float32(_) => DType::Float32,
            RawArray::Float64(_) => DType::Float64,
            RawArray::Uint8(_) => DType::Uint8,
            RawArray::Int32(_) => DType::Int32,
            RawArray::Int64(_) => DType::Int64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, array => array.shape())
    }

    pub fn len(&self) -> usize {
        dispatch!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elementwise widening to f64
    pub fn to_f64(&self) -> ArrayD<f64> {
        dispatch!(self, array => array.mapv(Element::to_f64))
    }

    /// Take the typed array out, failing if it holds another dtype
    pub fn into_array<T: Element>(self) -> Result<ArrayD<T>> {
        T::unwrap(self).map_err(|other| {
            CodecError::configuration(
                format!("array holds {} elements, not {}", other.dtype(), T::DTYPE),
                Some("dtype"),
            )
        })
    }
}

impl<T: Element> From<ArrayD<T>> for RawArray {
    fn from(array: ArrayD<T>) -> Self {
        T::wrap(array)
    }
}

/// Encode `raw` into wire form using `mode`
pub fn encode(raw: &RawArray, mode: QuantizationMode) -> Result<DenseArray> {
    let shape = raw.shape().to_vec();
    let source = raw.dtype();

    let encoded = match mode {
        QuantizationMode::None => {
            DenseArray::new(dispatch!(raw, array => to_le_buffer(array)), shape, source)?
        }
        QuantizationMode::Fp16 => {
            let narrowed = match raw {
                RawArray::Float32(array) => array.mapv(f16::from_f32),
                RawArray::Float64(array) => array.mapv(f16::from_f64),
                other => return Err(CodecError::unsupported(other.dtype(), "fp16 quantization")),
            };
            let (min, max) = bounds(raw);
            quantized(to_le_buffer(&narrowed), shape, DType::Float16, mode, source, min, max, 0.0)?
        }
        QuantizationMode::Fp32 => {
            let narrowed = match raw {
                RawArray::Float64(array) => array.mapv(|v| v as f32),
                other => return Err(CodecError::unsupported(other.dtype(), "fp32 quantization")),
            };
            let (min, max) = bounds(raw);
            quantized(to_le_buffer(&narrowed), shape, DType::Float32, mode, source, min, max, 0.0)?
        }
        QuantizationMode::Uint8 => {
            if !source.is_float() {
                return Err(CodecError::unsupported(source, "uint8 quantization"));
            }
            let values = raw.to_f64();
            if values.iter().any(|v| !v.is_finite()) {
                return Err(CodecError::configuration(
                    "uint8 quantization requires finite values",
                    Some("quantization"),
                ));
            }
            let (min, max) = bounds(raw);
            let range = max - min;
            if !range.is_finite() {
                return Err(CodecError::configuration(
                    format!("uint8 quantization range {}..{} overflows f64", min, max),
                    Some("quantization"),
                ));
            }
            let step = range / 255.0;
            // constant and empty inputs still need a positive scale
            let scale = if step > 0.0 { step } else { 1.0 };
            let codes = values
                .iter()
                .map(|v| ((v - min) / scale).round().clamp(0.0, 255.0) as u8)
                .collect();
            quantized(codes, shape, DType::Uint8, mode, source, min, max, scale)?
        }
    };

    trace!(
        mode = ?mode,
        source = %source,
        elements = raw.len(),
        bytes = encoded.buffer.len(),
        "Encoded dense array"
    );
    Ok(encoded)
}

/// Decode a wire array back to its original dtype
pub fn decode(array: &DenseArray) -> Result<RawArray> {
    array.validate()?;
    let shape = array.shape.as_slice();

    match array.quantization {
        QuantizationMode::None => read_raw(array.dtype, &array.buffer, shape),
        QuantizationMode::Fp16 => {
            expect_stored(array, DType::Float16)?;
            let narrowed: Vec<f16> = read_elements(&array.buffer);
            match array.original_dtype {
                DType::Float32 => Ok(RawArray::Float32(build(
                    shape,
                    narrowed.into_iter().map(f16::to_f32).collect(),
                )?)),
                DType::Float64 => Ok(RawArray::Float64(build(
                    shape,
                    narrowed.into_iter().map(f16::to_f64).collect(),
                )?)),
                other => Err(CodecError::unsupported(other, "fp16 dequantization")),
            }
        }
        QuantizationMode::Fp32 => {
            expect_stored(array, DType::Float32)?;
            if array.original_dtype != DType::Float64 {
                return Err(CodecError::unsupported(array.original_dtype, "fp32 dequantization"));
            }
            let narrowed: Vec<f32> = read_elements(&array.buffer);
            Ok(RawArray::Float64(build(
                shape,
                narrowed.into_iter().map(f64::from).collect(),
            )?))
        }
        QuantizationMode::Uint8 => {
            expect_stored(array, DType::Uint8)?;
            if !array.original_dtype.is_float() {
                return Err(CodecError::unsupported(array.original_dtype, "uint8 dequantization"));
            }
            let values = array
                .buffer
                .iter()
                .map(|q| (f64::from(*q) * array.scale + array.min_val).min(array.max_val))
                .collect();
            from_f64_values(array.original_dtype, shape, values)
        }
    }
}

/// Row-major little-endian bytes of `array`, whatever its memory layout
pub(crate) fn to_le_buffer<T: Element>(array: &ArrayD<T>) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        if let Some(slice) = array.as_slice() {
            return bytemuck::cast_slice(slice).to_vec();
        }
    }
    let mut out = Vec::with_capacity(array.len() * T::DTYPE.element_size());
    for value in array.iter() {
        value.write_le(&mut out);
    }
    out
}

pub(crate) fn read_elements<T: Element>(buffer: &[u8]) -> Vec<T> {
    buffer
        .chunks_exact(T::DTYPE.element_size())
        .map(T::read_le)
        .collect()
}

pub(crate) fn build<T: Element>(shape: &[usize], values: Vec<T>) -> Result<ArrayD<T>> {
    let got = values.len();
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|err| {
        CodecError::shape_mismatch(
            format!("cannot shape {} elements as {:?}: {}", got, shape, err),
            element_count(shape),
            got,
        )
    })
}

fn read_typed<T: Element>(buffer: &[u8], shape: &[usize]) -> Result<RawArray> {
    Ok(T::wrap(build(shape, read_elements::<T>(buffer))?))
}

fn read_raw(dtype: DType, buffer: &[u8], shape: &[usize]) -> Result<RawArray> {
    match dtype {
        DType::Float16 => read_typed::<f16>(buffer, shape),
        DType::Float32 => read_typed::<f32>(buffer, shape),
        DType::Float64 => read_typed::<f64>(buffer, shape),
        DType::Uint8 => read_typed::<u8>(buffer, shape),
        DType::Int32 => read_typed::<i32>(buffer, shape),
        DType::Int64 => read_typed::<i64>(buffer, shape),
    }
}

fn typed_from_f64<T: Element>(shape: &[usize], values: Vec<f64>) -> Result<RawArray> {
    Ok(T::wrap(build(
        shape,
        values.into_iter().map(T::from_f64).collect(),
    )?))
}

fn from_f64_values(dtype: DType, shape: &[usize], values: Vec<f64>) -> Result<RawArray> {
    match dtype {
        DType::Float16 => typed_from_f64::<f16>(shape, values),
        DType::Float32 => typed_from_f64::<f32>(shape, values),
        DType::Float64 => typed_from_f64::<f64>(shape, values),
        DType::Uint8 => typed_from_f64::<u8>(shape, values),
        DType::Int32 => typed_from_f64::<i32>(shape, values),
        DType::Int64 => typed_from_f64::<i64>(shape, values),
    }
}

/// `(min, max)` over all elements, `(0, 0)` when empty
fn bounds(raw: &RawArray) -> (f64, f64) {
    let values = raw.to_f64();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(*v), hi.max(*v))
    })
}

fn expect_stored(array: &DenseArray, stored: DType) -> Result<()> {
    if array.dtype != stored {
        return Err(CodecError::configuration(
            format!(
                "{:?} quantized buffer must be stored as {}, found {}",
                array.quantization, stored, array.dtype
            ),
            Some("dtype"),
        ));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn quantized(
    buffer: Vec<u8>,
    shape: Vec<usize>,
    dtype: DType,
    quantization: QuantizationMode,
    original_dtype: DType,
    min_val: f64,
    max_val: f64,
    scale: f64,
) -> Result<DenseArray> {
    let array = DenseArray {
        buffer,
        shape,
        dtype,
        quantization,
        max_val,
        min_val,
        scale,
        original_dtype,
    };
    array.validate()?;
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    #[test]
    fn test_none_is_exact_for_every_dtype() {
        let raws: Vec<RawArray> = vec![
            array![[1.5f32, -2.0], [3.25, 0.0]].into_dyn().into(),
            array![1e300f64, -1e-300].into_dyn().into(),
            array![0u8, 255, 7].into_dyn().into(),
            array![[i32::MIN, i32::MAX]].into_dyn().into(),
            array![i64::MIN, 0, i64::MAX].into_dyn().into(),
            array![f16::from_f32(0.5), f16::MAX].into_dyn().into(),
        ];
        for raw in raws {
            let encoded = encode(&raw, QuantizationMode::None).unwrap();
            assert_eq!(encoded.dtype, raw.dtype());
            assert_eq!(encoded.original_dtype, raw.dtype());
            assert_eq!(decode(&encoded).unwrap(), raw);
        }
    }

    #[test]
    fn test_none_buffer_is_little_endian_row_major() {
        let raw: RawArray = array![[1i32, 2], [3, 4]].into_dyn().into();
        let encoded = encode(&raw, QuantizationMode::None).unwrap();
        assert_eq!(&encoded.buffer[..8], &[1, 0, 0, 0, 2, 0, 0, 0]);

        // transposed view has non-standard strides; bytes follow logical order
        let transposed: RawArray = array![[1i32, 2], [3, 4]].reversed_axes().into_dyn().into();
        let encoded = encode(&transposed, QuantizationMode::None).unwrap();
        assert_eq!(&encoded.buffer[..8], &[1, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(decode(&encoded).unwrap(), transposed);
    }

    #[test]
    fn test_uint8_error_within_scale() {
        let values = Array::linspace(-3.0f64, 7.5, 100).into_dyn();
        let raw: RawArray = values.clone().into();
        let encoded = encode(&raw, QuantizationMode::Uint8).unwrap();
        assert_eq!(encoded.dtype, DType::Uint8);
        assert_eq!(encoded.original_dtype, DType::Float64);
        assert_eq!(encoded.min_val, -3.0);
        assert!((encoded.max_val - 7.5).abs() < 1e-9);
        assert!((encoded.scale - 10.5 / 255.0).abs() < 1e-9);

        let decoded = decode(&encoded).unwrap().into_array::<f64>().unwrap();
        for (x, y) in values.iter().zip(decoded.iter()) {
            assert!((x - y).abs() <= encoded.scale, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_uint8_range_overflow_rejected() {
        let raw: RawArray = array![-1.0e308f64, 0.0, 1.0e308].into_dyn().into();
        assert!(encode(&raw, QuantizationMode::Uint8).unwrap_err().is_configuration());

        let wide: RawArray = array![0.0f64, f64::MAX].into_dyn().into();
        let encoded = encode(&wide, QuantizationMode::Uint8).unwrap();
        let decoded = decode(&encoded).unwrap().into_array::<f64>().unwrap();
        assert!(decoded.iter().all(|v| v.is_finite()));
        assert!((f64::MAX - decoded[1]).abs() <= encoded.scale);
    }

    #[test]
    fn test_uint8_degenerate_and_empty() {
        let constant: RawArray = ArrayD::from_elem(IxDyn(&[2, 3]), 4.25f32).into();
        let encoded = encode(&constant, QuantizationMode::Uint8).unwrap();
        assert_eq!(encoded.scale, 1.0);
        assert!(encoded.buffer.iter().all(|q| *q == 0));
        assert_eq!(decode(&encoded).unwrap(), constant);

        let empty: RawArray = ArrayD::<f32>::zeros(IxDyn(&[0, 4])).into();
        let encoded = encode(&empty, QuantizationMode::Uint8).unwrap();
        assert_eq!((encoded.min_val, encoded.max_val, encoded.scale), (0.0, 0.0, 1.0));
        assert_eq!(decode(&encoded).unwrap().shape(), &[0, 4]);
    }

    #[test]
    fn test_quantization_source_restrictions() {
        let ints: RawArray = array![1i64, 2, 3].into_dyn().into();
        let err = encode(&ints, QuantizationMode::Uint8).unwrap_err();
        assert!(err.is_configuration());

        let singles: RawArray = array![1.0f32].into_dyn().into();
        assert!(encode(&singles, QuantizationMode::Fp32).is_err());
        assert!(encode(&ints, QuantizationMode::Fp16).is_err());

        let nan: RawArray = array![1.0f64, f64::NAN].into_dyn().into();
        assert!(encode(&nan, QuantizationMode::Uint8).is_err());
    }

    #[test]
    fn test_fp16_and_fp32_restore_original_dtype() {
        let raw: RawArray = array![0.5f64, -1.25, 1024.0].into_dyn().into();

        let fp16 = encode(&raw, QuantizationMode::Fp16).unwrap();
        assert_eq!(fp16.buffer.len(), 6);
        assert_eq!(decode(&fp16).unwrap(), raw);

        let fp32 = encode(&raw, QuantizationMode::Fp32).unwrap();
        assert_eq!(fp32.dtype, DType::Float32);
        assert_eq!(decode(&fp32).unwrap(), raw);

        let singles: RawArray = array![0.1f32, 3.0].into_dyn().into();
        let fp16 = encode(&singles, QuantizationMode::Fp16).unwrap();
        let back = decode(&fp16).unwrap().into_array::<f32>().unwrap();
        assert!((back[[0]] - 0.1).abs() < 1e-3);
        assert_eq!(back[[1]], 3.0);
    }

    #[test]
    fn test_decode_rejects_bad_buffers() {
        let raw: RawArray = array![1.0f32, 2.0].into_dyn().into();
        let mut encoded = encode(&raw, QuantizationMode::None).unwrap();
        encoded.buffer.pop();
        assert!(decode(&encoded).unwrap_err().is_shape_mismatch());

        let mut quantized = encode(&raw, QuantizationMode::Uint8).unwrap();
        quantized.scale = 0.0;
        assert!(decode(&quantized).unwrap_err().is_configuration());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let raw: RawArray = Array::linspace(0.0f32, 1.0, 33).into_dyn().into();
        for mode in [
            QuantizationMode::None,
            QuantizationMode::Fp16,
            QuantizationMode::Uint8,
        ] {
            assert_eq!(encode(&raw, mode).unwrap(), encode(&raw, mode).unwrap());
        }
    }
}
