//! Compression Negotiation
//!
//! Outbound payloads are compressed only when it pays off: payloads below
//! `min_bytes` are sent as-is, and a compressed result is kept only when
//! `compressed / original < min_ratio`. Algorithms are looked up by name in a
//! [`CompressorRegistry`]; each carries a one-byte id used in frames.

use crate::{Result, TransportError};
use mesh_config::defaults;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};
use types::{CompressConfig, Struct};

/// A named compression algorithm
pub trait Compressor: Send + Sync {
    /// Registry name, matched case-insensitively against `CompressConfig::algorithm`
    fn name(&self) -> &str;

    /// Frame identifier, unique within a registry
    fn id(&self) -> u8;

    fn compress(&self, data: &[u8], parameters: &Struct) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Identity algorithm; negotiation never applies it
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneCompressor;

impl NoneCompressor {
    pub const ID: u8 = 0;
}

impl Compressor for NoneCompressor {
    fn name(&self) -> &str {
        "none"
    }

    fn id(&self) -> u8 {
        Self::ID
    }

    fn compress(&self, data: &[u8], _parameters: &Struct) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Zstd with an optional integer `level` parameter
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    max_decompressed_size: usize,
}

impl ZstdCompressor {
    pub const ID: u8 = 1;

    pub fn new(max_decompressed_size: usize) -> Self {
        Self {
            max_decompressed_size,
        }
    }

    fn level(parameters: &Struct) -> Result<i32> {
        let Some(value) = parameters.get("level") else {
            return Ok(defaults::compression::ZSTD_LEVEL);
        };
        let level = value
            .as_i64()
            .and_then(|l| i32::try_from(l).ok())
            .ok_or_else(|| {
                TransportError::configuration(
                    format!("zstd level must be an integer, got {:?}", value),
                    Some("compression.parameters.level"),
                )
            })?;
        if !zstd::compression_level_range().contains(&level) {
            return Err(TransportError::configuration(
                format!("zstd level {} is out of range", level),
                Some("compression.parameters.level"),
            ));
        }
        Ok(level)
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(defaults::protocol::MAX_MESSAGE_SIZE)
    }
}

impl Compressor for ZstdCompressor {
    fn name(&self) -> &str {
        "zstd"
    }

    fn id(&self) -> u8 {
        Self::ID
    }

    fn compress(&self, data: &[u8], parameters: &Struct) -> Result<Vec<u8>> {
        let level = Self::level(parameters)?;
        zstd::bulk::compress(data, level)
            .map_err(|e| TransportError::compression("zstd", format!("Compression failed: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::decompress(data, self.max_decompressed_size).map_err(|e| {
            TransportError::compression("zstd", format!("Decompression failed: {}", e))
        })
    }
}

/// Compressed size over original size; empty input counts as incompressible
pub fn compression_ratio(original_size: usize, compressed_size: usize) -> f64 {
    if original_size == 0 {
        return 1.0;
    }
    compressed_size as f64 / original_size as f64
}

/// Compressors addressable by name and by frame id
#[derive(Clone)]
pub struct CompressorRegistry {
    by_name: HashMap<String, Arc<dyn Compressor>>,
    by_id: HashMap<u8, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    /// Registry with no algorithms at all
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    /// Registry with the built-in `none` and `zstd` algorithms
    pub fn new(max_decompressed_size: usize) -> Self {
        let mut registry = Self::empty();
        registry.insert(Arc::new(NoneCompressor));
        registry.insert(Arc::new(ZstdCompressor::new(max_decompressed_size)));
        registry
    }

    /// Add a compressor; names and ids must be unused
    pub fn register(&mut self, compressor: Arc<dyn Compressor>) -> Result<()> {
        let name = compressor.name().to_ascii_lowercase();
        if self.by_name.contains_key(&name) {
            return Err(TransportError::configuration(
                format!("compressor '{}' is already registered", name),
                Some("compression.algorithm"),
            ));
        }
        if let Some(existing) = self.by_id.get(&compressor.id()) {
            return Err(TransportError::configuration(
                format!(
                    "compressor id {} is already used by '{}'",
                    compressor.id(),
                    existing.name()
                ),
                Some("compression.algorithm"),
            ));
        }
        self.insert(compressor);
        Ok(())
    }

    fn insert(&mut self, compressor: Arc<dyn Compressor>) {
        self.by_id.insert(compressor.id(), compressor.clone());
        self.by_name
            .insert(compressor.name().to_ascii_lowercase(), compressor);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Compressor>> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| {
                TransportError::configuration(
                    format!("unknown compression algorithm '{}'", name),
                    Some("compression.algorithm"),
                )
            })
    }

    pub fn by_id(&self, id: u8) -> Result<&Arc<dyn Compressor>> {
        self.by_id
            .get(&id)
            .ok_or_else(|| TransportError::protocol(format!("unknown compression id {}", id)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Compress `payload` if the watermarks in `config` allow it
    ///
    /// Returns the bytes to send and whether they are compressed. An unknown
    /// algorithm is rejected even for payloads that would be skipped.
    pub fn maybe_compress(&self, payload: &[u8], config: &CompressConfig) -> Result<(Vec<u8>, bool)> {
        if config.is_disabled() {
            return Ok((payload.to_vec(), false));
        }
        config.validate()?;
        let compressor = self.get(&config.algorithm)?;

        if payload.len() < config.min_bytes {
            trace!(
                bytes = payload.len(),
                min_bytes = config.min_bytes,
                "Payload below compression watermark"
            );
            return Ok((payload.to_vec(), false));
        }

        let compressed = compressor.compress(payload, &config.parameters)?;
        let ratio = compression_ratio(payload.len(), compressed.len());
        let keep = ratio < config.min_ratio;
        debug!(
            algorithm = compressor.name(),
            original = payload.len(),
            compressed = compressed.len(),
            ratio,
            kept = keep,
            "Compression negotiated"
        );

        if keep {
            Ok((compressed, true))
        } else {
            Ok((payload.to_vec(), false))
        }
    }

    pub fn decompress(&self, algorithm: &str, data: &[u8]) -> Result<Vec<u8>> {
        self.get(algorithm)?.decompress(data)
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new(defaults::protocol::MAX_MESSAGE_SIZE)
    }
}

impl std::fmt::Debug for CompressorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressorRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}

fn default_registry() -> &'static CompressorRegistry {
    static REGISTRY: OnceLock<CompressorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(CompressorRegistry::default)
}

/// [`CompressorRegistry::maybe_compress`] against the built-in algorithms
pub fn maybe_compress(payload: &[u8], config: &CompressConfig) -> Result<(Vec<u8>, bool)> {
    default_registry().maybe_compress(payload, config)
}

/// [`CompressorRegistry::decompress`] against the built-in algorithms
pub fn decompress(algorithm: &str, data: &[u8]) -> Result<Vec<u8>> {
    default_registry().decompress(algorithm, data)
}
