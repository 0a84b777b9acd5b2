//! Envelope carried alongside every request between pods

use super::routing::{Route, RoutingTable};
use super::status::Status;
use crate::error::{Result, TypesError};
use crate::structured::{Struct, StructValue};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMPRESSION_ALGORITHM: &str = "none";
pub const DEFAULT_COMPRESSION_MIN_BYTES: usize = 1024;
pub const DEFAULT_COMPRESSION_MIN_RATIO: f64 = 0.9;

/// Compression watermarks negotiated per envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressConfig {
    /// Registered compressor name, `"none"` disables compression
    pub algorithm: String,
    /// Payloads smaller than this are sent as-is
    pub min_bytes: usize,
    /// Compressed/original ratio must be strictly below this to keep the result
    pub min_ratio: f64,
    /// Algorithm specific settings, e.g. `level` for zstd
    pub parameters: Struct,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            algorithm: DEFAULT_COMPRESSION_ALGORITHM.to_string(),
            min_bytes: DEFAULT_COMPRESSION_MIN_BYTES,
            min_ratio: DEFAULT_COMPRESSION_MIN_RATIO,
            parameters: Struct::new(),
        }
    }
}

impl CompressConfig {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            ..Default::default()
        }
    }

    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn with_min_ratio(mut self, min_ratio: f64) -> Self {
        self.min_ratio = min_ratio;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<StructValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.algorithm.is_empty() || self.algorithm.eq_ignore_ascii_case("none")
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_ratio > 0.0 && self.min_ratio <= 1.0) {
            return Err(TypesError::configuration(
                format!("min_ratio must be in (0, 1], got {}", self.min_ratio),
                Some("compression.min_ratio"),
            ));
        }
        Ok(())
    }
}

/// Version triple stamped by the sender
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    pub jina: String,
    pub proto: String,
    pub vcs: String,
}

impl VersionInfo {
    /// Version of this crate for `jina` and `proto`, no vcs revision
    pub fn current() -> Self {
        Self {
            jina: env!("CARGO_PKG_VERSION").to_string(),
            proto: env!("CARGO_PKG_VERSION").to_string(),
            vcs: String::new(),
        }
    }

    /// Protocol compatibility is decided on the major.minor of `proto`
    pub fn is_compatible(&self, other: &VersionInfo) -> bool {
        major_minor(&self.proto) == major_minor(&other.proto)
    }
}

fn major_minor(version: &str) -> (&str, &str) {
    let mut parts = version.split('.');
    (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
}

/// Execution hints attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    /// Executor endpoint to invoke, e.g. `/index`
    pub exec_endpoint: String,
    /// Pod a control command is addressed to, empty for broadcast
    pub target_peapod: String,
    /// Finish the traversal at the current hop instead of forwarding
    pub no_propagate: bool,
}

impl Header {
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            exec_endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn targeting(pod: impl Into<String>) -> Self {
        Self {
            target_peapod: pod.into(),
            ..Default::default()
        }
    }

    pub fn target(&self) -> Option<&str> {
        if self.target_peapod.is_empty() {
            None
        } else {
            Some(&self.target_peapod)
        }
    }
}

/// Metadata wrapped around a request while it moves between pods
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_id: String,
    pub receiver_id: String,
    pub request_id: String,
    /// Fan-in timeout in seconds, 0 disables
    pub timeout: u32,
    pub version: VersionInfo,
    pub request_type: String,
    pub check_version: bool,
    pub compression: CompressConfig,
    /// Hops visited so far, append-only
    pub routes: Vec<Route>,
    pub routing_table: RoutingTable,
    pub status: Status,
    pub header: Header,
    /// Set when identity-addressed delivery is in force
    pub receiver_identity: Option<String>,
}

impl Envelope {
    pub fn new(request_id: impl Into<String>, routing_table: RoutingTable) -> Self {
        Self {
            request_id: request_id.into(),
            version: VersionInfo::current(),
            routing_table,
            ..Default::default()
        }
    }

    /// A message is returning once at least one hop has been recorded
    pub fn is_returning(&self) -> bool {
        !self.routes.is_empty()
    }

    pub fn last_route(&self) -> Option<&Route> {
        self.routes.last()
    }

    pub fn last_route_mut(&mut self) -> Option<&mut Route> {
        self.routes.last_mut()
    }

    /// Reject envelopes from incompatible senders when `check_version` is set
    pub fn check_compatibility(&self, local: &VersionInfo) -> Result<()> {
        if self.check_version && !self.version.is_compatible(local) {
            return Err(TypesError::configuration(
                format!(
                    "sender protocol {} is incompatible with local {}",
                    self.version.proto, local.proto
                ),
                Some("version"),
            ));
        }
        Ok(())
    }
}
