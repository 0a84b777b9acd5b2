//! # Docmesh Codec
//!
//! ## Purpose
//!
//! The "rules" layer between the plain data model in `types` and the
//! transport in `network`:
//! - Dense ndarray encoding with NONE / FP16 / FP32 / UINT8 quantization
//! - Sparse coordinate encoding for mostly-zero arrays
//! - `bincode` serialization of the message set
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓            ↓
//! Pure Data   Encoding     Framing, compression
//! Structures  Validation   Routing
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Compression or framing of serialized bytes (belongs in network/)
//! - Data structure definitions (belongs in libs/types)
//!
//! ## Quick Start
//!
//! ```rust
//! use codec::{decode, encode, RawArray};
//! use types::QuantizationMode;
//!
//! let raw: RawArray = ndarray::array![[0.0f32, 0.5], [1.0, 2.0]].into_dyn().into();
//! let wire = encode(&raw, QuantizationMode::Uint8).unwrap();
//! assert_eq!(wire.buffer.len(), 4);
//!
//! let back = decode(&wire).unwrap().into_array::<f32>().unwrap();
//! assert!((back[[1, 1]] - 2.0).abs() <= wire.scale as f32);
//! ```

pub mod dense;
pub mod error;
pub mod layout;
pub mod sparse;
pub mod wire;

pub use dense::{decode, encode, Element, RawArray};
pub use error::{CodecError, Result};
pub use layout::{decode_ndarray, encode_ndarray, Layout};
pub use sparse::{decode_sparse, decode_sparse_bounded, encode_sparse, encode_sparse_default};
pub use wire::{decode_message, decode_request, encode_message, encode_request};
