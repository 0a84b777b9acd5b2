//! Network Protocol Infrastructure
//!
//! Serialization, compression negotiation and framing for messages moving
//! between pods.

pub mod compression;
pub mod frame;

pub use compression::{
    compression_ratio, Compressor, CompressorRegistry, NoneCompressor, ZstdCompressor,
};
pub use frame::{Frame, FrameFlags, WireFormat};

use crate::{Result, TransportError};
use mesh_config::{defaults, MeshConfig};
use tracing::{debug, trace};
use types::{CompressConfig, Message, VersionInfo};

const MAX_MESSAGE_SIZE_LIMIT: usize = 1024 * 1024 * 1024;

/// Protocol configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolConfig {
    /// Maximum serialized message size in bytes
    pub max_message_size: usize,
    /// Reject inbound envelopes from incompatible protocol versions
    pub check_version: bool,
    /// Used when the envelope itself does not name an algorithm
    pub compression: CompressConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_message_size: defaults::protocol::MAX_MESSAGE_SIZE,
            check_version: false,
            compression: CompressConfig::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn from_settings(config: &MeshConfig) -> Self {
        let settings = &config.compression;
        let mut compression = CompressConfig::new(settings.algorithm.clone())
            .with_min_bytes(settings.min_bytes)
            .with_min_ratio(settings.min_ratio);
        if let Some(level) = settings.level {
            compression = compression.with_parameter("level", i64::from(level));
        }
        Self {
            max_message_size: config.protocol.max_message_size,
            check_version: config.protocol.check_version,
            compression,
        }
    }

    /// Validate the protocol configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_message_size == 0 {
            return Err(TransportError::configuration(
                "max_message_size cannot be zero",
                Some("max_message_size"),
            ));
        }

        if self.max_message_size > MAX_MESSAGE_SIZE_LIMIT {
            return Err(TransportError::configuration(
                "max_message_size exceeds 1GB limit",
                Some("max_message_size"),
            ));
        }

        self.compression.validate()?;
        Ok(())
    }
}

/// Turns messages into frames and back
#[derive(Debug)]
pub struct ProtocolProcessor {
    config: ProtocolConfig,
    registry: CompressorRegistry,
}

impl ProtocolProcessor {
    /// Processor with the built-in compressors
    pub fn new(config: ProtocolConfig) -> Result<Self> {
        let registry = CompressorRegistry::new(config.max_message_size);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: ProtocolConfig, registry: CompressorRegistry) -> Result<Self> {
        config.validate()?;
        if !config.compression.is_disabled() {
            registry.get(&config.compression.algorithm)?;
        }
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn registry(&self) -> &CompressorRegistry {
        &self.registry
    }

    /// Serialize, negotiate compression and frame
    pub fn process_outbound(&self, message: &Message) -> Result<Vec<u8>> {
        let bytes = codec::encode_message(message)?;
        if bytes.len() > self.config.max_message_size {
            return Err(TransportError::protocol(format!(
                "Message size {} exceeds maximum {}",
                bytes.len(),
                self.config.max_message_size
            )));
        }

        let compression = self.compression_for(message);
        let (payload, compressed) = self.registry.maybe_compress(&bytes, compression)?;
        let frame = if compressed {
            let id = self.registry.get(&compression.algorithm)?.id();
            Frame::compressed(id, payload)
        } else {
            Frame::new(payload)
        };

        trace!(
            request_id = %message.request_id(),
            serialized = bytes.len(),
            framed = frame.encoded_len(),
            compressed,
            "Framed outbound message"
        );
        frame.encode(self.config.max_message_size)
    }

    /// Verify the frame, decompress and deserialize
    pub fn process_inbound(&self, data: &[u8]) -> Result<Message> {
        let frame = Frame::decode(data, self.config.max_message_size)?;
        let payload = if frame.flags.compressed {
            self.registry
                .by_id(frame.algorithm_id)?
                .decompress(&frame.payload)?
        } else {
            frame.payload
        };

        let message = codec::decode_message(&payload)?;
        self.check_version(&message)?;
        debug!(
            request_id = %message.request_id(),
            bytes = data.len(),
            "Accepted inbound message"
        );
        Ok(message)
    }

    fn compression_for<'a>(&'a self, message: &'a Message) -> &'a CompressConfig {
        if message.envelope.compression.is_disabled() {
            &self.config.compression
        } else {
            &message.envelope.compression
        }
    }

    fn check_version(&self, message: &Message) -> Result<()> {
        let local = VersionInfo::current();
        let envelope = &message.envelope;
        if (self.config.check_version || envelope.check_version)
            && !envelope.version.is_compatible(&local)
        {
            return Err(TransportError::protocol(format!(
                "sender protocol {} is incompatible with local {}",
                envelope.version.proto, local.proto
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Document, Envelope, Request, RoutingTable, TargetPod};

    fn message(text: &str) -> Message {
        let table = RoutingTable::new("gateway", TargetPod::new("127.0.0.1", 5555));
        let doc = Document::builder("d1").text(text).unwrap().build();
        Message::new(Envelope::new("", table), Request::data("req-1", vec![doc]))
    }

    #[test]
    fn test_round_trip_uncompressed() {
        let processor = ProtocolProcessor::new(ProtocolConfig::default()).unwrap();
        let original = message("hello");
        let bytes = processor.process_outbound(&original).unwrap();
        let frame = Frame::decode(&bytes, 1 << 20).unwrap();
        assert!(!frame.flags.compressed);
        assert_eq!(processor.process_inbound(&bytes).unwrap(), original);
    }

    #[test]
    fn test_envelope_compression_applied() {
        let processor = ProtocolProcessor::new(ProtocolConfig::default()).unwrap();
        let mut original = message(&"docmesh ".repeat(1000));
        original.envelope.compression = CompressConfig::new("zstd");

        let bytes = processor.process_outbound(&original).unwrap();
        let frame = Frame::decode(&bytes, 1 << 20).unwrap();
        assert!(frame.flags.compressed);
        assert_eq!(frame.algorithm_id, ZstdCompressor::ID);
        assert_eq!(processor.process_inbound(&bytes).unwrap(), original);
    }

    #[test]
    fn test_pod_default_compression() {
        let config = ProtocolConfig {
            compression: CompressConfig::new("zstd").with_min_bytes(16),
            ..Default::default()
        };
        let processor = ProtocolProcessor::new(config).unwrap();
        let bytes = processor
            .process_outbound(&message(&"abc".repeat(500)))
            .unwrap();
        assert!(Frame::decode(&bytes, 1 << 20).unwrap().flags.compressed);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ProtocolConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(ProtocolProcessor::new(config).unwrap_err().is_configuration());

        let config = ProtocolConfig {
            compression: CompressConfig::new("lzma"),
            ..Default::default()
        };
        assert!(ProtocolProcessor::new(config).unwrap_err().is_configuration());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let config = ProtocolConfig {
            max_message_size: 64,
            ..Default::default()
        };
        let processor = ProtocolProcessor::new(config).unwrap();
        let err = processor.process_outbound(&message(&"x".repeat(256))).unwrap_err();
        assert_eq!(err.category(), "protocol");
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let config = ProtocolConfig {
            check_version: true,
            ..Default::default()
        };
        let processor = ProtocolProcessor::new(config).unwrap();
        let mut original = message("hi");
        original.envelope.version.proto = "99.0.0".to_string();
        let bytes = processor.process_outbound(&original).unwrap();
        assert!(processor.process_inbound(&bytes).is_err());

        let lenient = ProtocolProcessor::new(ProtocolConfig::default()).unwrap();
        assert!(lenient.process_inbound(&bytes).is_ok());
    }

    #[test]
    fn test_from_settings() {
        let mut settings = MeshConfig::default();
        settings.compression.algorithm = "zstd".into();
        settings.compression.level = Some(5);
        let config = ProtocolConfig::from_settings(&settings);
        assert_eq!(config.compression.algorithm, "zstd");
        assert_eq!(
            config.compression.parameters.get("level").and_then(|v| v.as_i64()),
            Some(5)
        );
        assert!(config.validate().is_ok());
    }
}
