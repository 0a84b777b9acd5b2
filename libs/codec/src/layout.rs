//! Conversions between raw arrays and the closed `NdArray` wire enum

use crate::dense::{self, RawArray};
use crate::error::Result;
use crate::sparse;
use types::{NdArray, QuantizationMode};

/// Target wire layout for [`encode_ndarray`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Dense(QuantizationMode),
    /// Coordinate form, exact zeros dropped
    Sparse,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Dense(QuantizationMode::None)
    }
}

pub fn encode_ndarray(raw: &RawArray, layout: Layout) -> Result<NdArray> {
    Ok(match layout {
        Layout::Dense(mode) => NdArray::Dense(dense::encode(raw, mode)?),
        Layout::Sparse => NdArray::Sparse(sparse::encode_sparse_default(raw)?),
    })
}

pub fn decode_ndarray(array: &NdArray) -> Result<RawArray> {
    match array {
        NdArray::Dense(dense) => dense::decode(dense),
        NdArray::Sparse(sparse) => sparse::decode_sparse(sparse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_layouts_decode_to_same_values() {
        let raw: RawArray = array![[0.0f64, 2.0], [0.0, -4.0]].into_dyn().into();
        for layout in [
            Layout::default(),
            Layout::Dense(QuantizationMode::Fp32),
            Layout::Sparse,
        ] {
            let encoded = encode_ndarray(&raw, layout).unwrap();
            assert_eq!(encoded.shape(), &[2, 2]);
            assert_eq!(encoded.is_sparse(), layout == Layout::Sparse);
            assert_eq!(decode_ndarray(&encoded).unwrap(), raw);
        }
    }
}
