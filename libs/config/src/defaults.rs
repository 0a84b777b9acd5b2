//! Default configuration values
//!
//! Shared by `MeshConfig` defaults and by crates that need a value before
//! any configuration is loaded.

/// Environment variable prefix for overrides, e.g. `DOCMESH_FAN_IN__TIMEOUT_SECS`
pub const ENV_PREFIX: &str = "DOCMESH";

/// Logging defaults
pub mod logging {
    /// Filter used when neither `RUST_LOG` nor the config sets one
    pub const LOG_LEVEL: &str = "info";
}

/// Compression negotiation defaults
pub mod compression {
    /// Compression is off unless an algorithm is configured
    pub const ALGORITHM: &str = "none";

    /// Payloads below this size are never compressed
    pub const MIN_BYTES: usize = 1024;

    /// Compressed output must be below this fraction of the input to be kept
    pub const MIN_RATIO: f64 = 0.9;

    /// zstd level when none is given
    pub const ZSTD_LEVEL: i32 = 3;
}

/// Fan-in barrier defaults
pub mod fan_in {
    /// Seconds a partially gathered request may wait; 0 disables the deadline
    pub const TIMEOUT_SECS: u32 = 0;

    /// How often expired buckets are swept (milliseconds)
    pub const SWEEP_INTERVAL_MS: u64 = 500;

    /// Timed-out or cancelled requests remembered per store, so late parts
    /// are dropped instead of opening a new bucket
    pub const CLOSED_KEY_LIMIT: usize = 4096;
}

/// Wire protocol defaults
pub mod protocol {
    /// Largest accepted frame payload (64 MiB)
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

    /// Per-pod inbound queue depth for in-process transports
    pub const CHANNEL_CAPACITY: usize = 1024;
}
