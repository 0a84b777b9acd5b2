//! Pod Configuration Module
//!
//! Loads `MeshConfig` from an optional TOML file layered with `DOCMESH_`
//! environment overrides. Nested keys use a double underscore:
//! `DOCMESH_COMPRESSION__ALGORITHM=zstd`, `DOCMESH_FAN_IN__TIMEOUT_SECS=30`.

use crate::defaults::{self, ENV_PREFIX};
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Main pod configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    /// Global settings
    pub global: GlobalConfig,

    /// Compression watermarks applied to outbound envelopes
    pub compression: CompressionSettings,

    /// Fan-in barrier settings
    pub fan_in: FanInSettings,

    /// Wire protocol limits
    pub protocol: ProtocolSettings,
}

/// Log output format
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Global configuration settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// `EnvFilter` directive, e.g. `info` or `network=debug,info`
    pub log_level: String,
    pub log_format: LogFormat,
    /// Name this process runs as inside the routing table
    pub pod_name: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::logging::LOG_LEVEL.to_string(),
            log_format: LogFormat::Text,
            pod_name: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CompressionSettings {
    pub algorithm: String,
    pub min_bytes: usize,
    pub min_ratio: f64,
    /// Algorithm level, only read by compressors that have one
    pub level: Option<i32>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            algorithm: defaults::compression::ALGORITHM.to_string(),
            min_bytes: defaults::compression::MIN_BYTES,
            min_ratio: defaults::compression::MIN_RATIO,
            level: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FanInSettings {
    /// Default barrier timeout when an envelope does not carry one
    pub timeout_secs: u32,
    pub sweep_interval_ms: u64,
}

impl Default for FanInSettings {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::fan_in::TIMEOUT_SECS,
            sweep_interval_ms: defaults::fan_in::SWEEP_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProtocolSettings {
    pub max_message_size: usize,
    pub channel_capacity: usize,
    /// Reject envelopes whose sender runs an incompatible protocol version
    pub check_version: bool,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            max_message_size: defaults::protocol::MAX_MESSAGE_SIZE,
            channel_capacity: defaults::protocol::CHANNEL_CAPACITY,
            check_version: false,
        }
    }
}

impl MeshConfig {
    /// Load from an optional TOML file with process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit environment map instead of the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env_overrides: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading configuration: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env_overrides),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let mesh: MeshConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        mesh.validate()?;
        debug!(?mesh, "Configuration loaded");
        Ok(mesh)
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;
        let mesh: MeshConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        mesh.validate()?;
        Ok(mesh)
    }

    /// Render as TOML, e.g. to write a starter config file
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.compression.min_ratio > 0.0 && self.compression.min_ratio <= 1.0) {
            bail!(
                "compression.min_ratio must be in (0, 1], got {}",
                self.compression.min_ratio
            );
        }
        if self.fan_in.sweep_interval_ms == 0 {
            bail!("fan_in.sweep_interval_ms must be positive");
        }
        if self.protocol.max_message_size == 0 {
            bail!("protocol.max_message_size must be positive");
        }
        if self.protocol.channel_capacity == 0 {
            bail!("protocol.channel_capacity must be positive");
        }
        Ok(())
    }
}

/// Convenience function to load configuration from `path` and the environment
pub fn load_config(path: Option<&Path>) -> Result<MeshConfig> {
    MeshConfig::load(path)
}
