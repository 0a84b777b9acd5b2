//! Data model errors
//!
//! Local, synchronous failures raised while constructing or validating the
//! wire data model. These are never recovered silently: every operation that
//! can violate an invariant returns them straight to its caller.

use thiserror::Error;

/// Errors raised by data model constructors and validators
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    /// Array buffer, shape or coordinate bounds disagree
    #[error("Shape mismatch: {message} (expected: {expected}, got: {got})")]
    ShapeMismatch {
        message: String,
        expected: String,
        got: String,
    },

    /// A structural rule of the data model was broken by the caller
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

impl TypesError {
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
            field: field.map(|s| s.to_string()),
        }
    }

    /// Check whether this is a shape mismatch
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. })
    }

    /// Check whether this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Result type for data model operations
pub type Result<T> = std::result::Result<T, TypesError>;
