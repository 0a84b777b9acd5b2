//! Transport Error Types
//!
//! Errors raised while framing, compressing, routing and delivering
//! messages between pods.

use codec::CodecError;
use thiserror::Error;
use types::TypesError;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Frame layout, version or integrity errors
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Compression/decompression errors
    #[error("Compression error: {codec}: {message}")]
    Compression { codec: String, message: String },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Routing table violations: wrong active pod, unknown targets, dead ends
    #[error("Routing error: {message} (pod: {pod:?})")]
    Routing { message: String, pod: Option<String> },

    /// Array or message codec failures
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// In-process channel closed or missing
    #[error("Channel error: {channel}: {message}")]
    Channel { channel: String, message: String },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a compression error
    pub fn compression(codec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compression {
            codec: codec.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a routing error
    pub fn routing(message: impl Into<String>, pod: Option<&str>) -> Self {
        Self::Routing {
            message: message.into(),
            pod: pod.map(|s| s.to_string()),
        }
    }

    /// Create a channel error
    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout { .. } => true,
            TransportError::Channel { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Compression { .. } => false,
            TransportError::Routing { .. } => false,
            TransportError::Codec(_) => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Protocol { .. } => "protocol",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Compression { .. } => "compression",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Routing { .. } => "routing",
            TransportError::Codec(_) => "codec",
            TransportError::Channel { .. } => "channel",
            TransportError::Io { .. } => "io",
        }
    }

    pub fn is_configuration(&self) -> bool {
        match self {
            TransportError::Configuration { .. } => true,
            TransportError::Codec(err) => err.is_configuration(),
            _ => false,
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Data model violations keep their kind: configuration stays configuration
impl From<TypesError> for TransportError {
    fn from(error: TypesError) -> Self {
        match error {
            TypesError::Configuration { message, field } => {
                TransportError::Configuration { message, field }
            }
            other => TransportError::Codec(CodecError::from(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = TransportError::routing("no out edges", Some("encoder"));
        assert_eq!(err.category(), "routing");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("encoder"));

        let err = TransportError::timeout("deliver to ranker", 5000);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Timeout error: deliver to ranker exceeded 5000ms");
    }

    #[test]
    fn test_types_error_conversion() {
        let err: TransportError = TypesError::configuration("bad ratio", Some("min_ratio")).into();
        match err {
            TransportError::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("min_ratio"));
            }
            other => panic!("Expected Configuration error, got {:?}", other),
        }

        let err: TransportError = TypesError::shape_mismatch("short buffer", 8, 4).into();
        assert_eq!(err.category(), "codec");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: TransportError = io.into();
        assert_eq!(err.category(), "io");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_codec_configuration_is_configuration() {
        let err: TransportError = CodecError::configuration("uint8 needs floats", None).into();
        assert!(err.is_configuration());
    }
}
