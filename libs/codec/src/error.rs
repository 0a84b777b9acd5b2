//! Codec errors for array encoding and message serialization
//!
//! Every variant carries enough context to tell which array or message
//! failed and why. Data model violations raised by `types` are folded in
//! through `From<TypesError>` so callers only handle one error type.

use thiserror::Error;
use types::{DType, TypesError};

/// Errors raised while encoding or decoding arrays and messages
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Buffer length, coordinate bounds or index layout disagree with the shape
    #[error("Shape mismatch: {message} (expected: {expected}, got: {got})")]
    ShapeMismatch {
        message: String,
        expected: String,
        got: String,
    },

    /// Caller asked for an encoding the input cannot satisfy
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Element type is not valid for the requested operation
    #[error("Unsupported dtype {dtype} for {operation}")]
    UnsupportedDType { dtype: DType, operation: String },

    /// Message set could not be (de)serialized
    #[error("Serialization error: {message} (context: {context})")]
    Serialization { message: String, context: String },
}

impl CodecError {
    /// Create a shape mismatch error
    pub fn shape_mismatch(
        message: impl Into<String>,
        expected: impl ToString,
        got: impl ToString,
    ) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(String::from),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported(dtype: DType, operation: impl Into<String>) -> Self {
        Self::UnsupportedDType {
            dtype,
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl ToString, context: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.to_string(),
            context: context.into(),
        }
    }

    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. })
    }

    /// Unsupported dtypes count as configuration problems too
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::UnsupportedDType { .. }
        )
    }
}

impl From<TypesError> for CodecError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::ShapeMismatch {
                message,
                expected,
                got,
            } => Self::ShapeMismatch {
                message,
                expected,
                got,
            },
            TypesError::Configuration { message, field } => Self::Configuration { message, field },
        }
    }
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
