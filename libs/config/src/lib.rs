//! # Docmesh Centralized Configuration
//!
//! This crate provides configuration loading, shared defaults and logging
//! setup for every docmesh pod.
//!
//! ## Features
//!
//! - **Layered Loading**: TOML file overlaid with `DOCMESH_` environment variables
//! - **Defaults**: compression watermarks, fan-in timeouts and protocol limits
//! - **Logging**: `tracing-subscriber` installation with text or JSON output
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mesh_config::{init_tracing, MeshConfig};
//! use std::path::Path;
//!
//! let config = MeshConfig::load(Some(Path::new("config/docmesh.toml")))?;
//! init_tracing(&config.global)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod defaults;
pub mod logging;
pub mod settings;

// Re-export commonly used types
pub use logging::{build_filter, init_tracing};
pub use settings::{
    load_config, CompressionSettings, FanInSettings, GlobalConfig, LogFormat, MeshConfig,
    ProtocolSettings,
};
