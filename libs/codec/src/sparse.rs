//! Sparse coordinate encoding
//!
//! Non-zero elements are stored as an `[N, ndims]` int64 index matrix plus an
//! `[N]` value vector. Rows are emitted in row-major scan order, so index
//! tuples come out lexicographically sorted.

use crate::dense::{self, dispatch, Element, RawArray};
use crate::error::{CodecError, Result};
use ndarray::{Array1, ArrayD, Dimension};
use std::collections::HashSet;
use tracing::trace;
use types::array::{checked_element_count, element_count};
use types::{DType, DenseArray, SparseArray};

/// Largest dense array [`decode_sparse`] will materialise (1 GiB)
pub const MAX_DENSE_BYTES: usize = 1024 * 1024 * 1024;

/// Keep every element for which `is_zero` returns false
///
/// The predicate sees each element widened to f64.
pub fn encode_sparse<F>(raw: &RawArray, is_zero: F) -> Result<SparseArray>
where
    F: Fn(f64) -> bool,
{
    let shape = raw.shape().to_vec();
    let (coords, values) = dispatch!(raw, array => {
        let (coords, kept) = scan(array, &is_zero);
        (coords, DenseArray::new(dense::to_le_buffer(&kept), kept.shape().to_vec(), raw.dtype())?)
    });

    let nnz = values.element_count();
    let buffer = coords.iter().flat_map(|c| c.to_le_bytes()).collect();
    let indices = DenseArray::new(buffer, vec![nnz, shape.len()], DType::Int64)?;

    trace!(nnz, total = element_count(&shape), "Encoded sparse array");
    Ok(SparseArray {
        indices,
        values,
        shape,
    })
}

/// Sparse encoding that treats exact zeros as empty
pub fn encode_sparse_default(raw: &RawArray) -> Result<SparseArray> {
    encode_sparse(raw, |x| x == 0.0)
}

/// Scatter the stored values into a zero-filled dense array
pub fn decode_sparse(sparse: &SparseArray) -> Result<RawArray> {
    decode_sparse_bounded(sparse, MAX_DENSE_BYTES)
}

/// [`decode_sparse`] refusing dense results larger than `max_bytes`
pub fn decode_sparse_bounded(sparse: &SparseArray, max_bytes: usize) -> Result<RawArray> {
    sparse.validate_layout()?;
    sparse.indices.validate()?;
    checked_element_count(&sparse.shape)?
        .checked_mul(sparse.values.original_dtype.element_size())
        .filter(|bytes| *bytes <= max_bytes)
        .ok_or_else(|| {
            CodecError::shape_mismatch(
                format!("dense form of sparse shape {:?} is too large", sparse.shape),
                format!("at most {} bytes", max_bytes),
                "more",
            )
        })?;
    let values = dense::decode(&sparse.values)?;
    let offsets = flat_offsets(sparse)?;
    dispatch!(values, array => scatter(&sparse.shape, &offsets, array))
}

fn scan<T: Element, F: Fn(f64) -> bool>(array: &ArrayD<T>, is_zero: &F) -> (Vec<i64>, ArrayD<T>) {
    let mut coords = Vec::new();
    let mut kept = Vec::new();
    for (index, value) in array.indexed_iter() {
        if !is_zero(value.to_f64()) {
            coords.extend(index.slice().iter().map(|i| *i as i64));
            kept.push(*value);
        }
    }
    (coords, Array1::from_vec(kept).into_dyn())
}

/// Row-major offset of every index row, checking bounds and uniqueness
fn flat_offsets(sparse: &SparseArray) -> Result<Vec<usize>> {
    let shape = &sparse.shape;
    let ndims = shape.len();
    let coords: Vec<i64> = dense::read_elements(&sparse.indices.buffer);
    let mut seen = HashSet::with_capacity(sparse.nnz());
    let mut offsets = Vec::with_capacity(sparse.nnz());

    for row in 0..sparse.nnz() {
        let tuple = &coords[row * ndims..(row + 1) * ndims];
        let mut offset = 0usize;
        for (axis, (coord, extent)) in tuple.iter().zip(shape).enumerate() {
            if *coord < 0 || *coord as usize >= *extent {
                return Err(CodecError::shape_mismatch(
                    format!("sparse index row {} is out of bounds on axis {}", row, axis),
                    format!("0..{}", extent),
                    coord,
                ));
            }
            offset = offset * extent + *coord as usize;
        }
        if !seen.insert(offset) {
            return Err(CodecError::shape_mismatch(
                format!("sparse index row {} repeats coordinate {:?}", row, tuple),
                "unique coordinates",
                "duplicate",
            ));
        }
        offsets.push(offset);
    }
    Ok(offsets)
}

fn scatter<T: Element>(shape: &[usize], offsets: &[usize], values: ArrayD<T>) -> Result<RawArray> {
    let mut out = vec![T::from_f64(0.0); element_count(shape)];
    for (offset, value) in offsets.iter().zip(values.iter()) {
        out[*offset] = *value;
    }
    Ok(T::wrap(dense::build(shape, out)?))
}
