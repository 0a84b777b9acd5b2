//! Wall-clock timestamps for routes and fan-in deadlines
//!
//! Routes record nanoseconds since the UNIX epoch. Hop processing takes
//! `now` as an argument so tests can drive time explicitly; runtimes read it
//! from here.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Current time in nanoseconds since the UNIX epoch
pub fn current_timestamp_ns() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => safe_duration_to_ns(duration),
        Err(e) => {
            warn!(error = %e, "System time before UNIX epoch");
            0
        }
    }
}

/// Saturating conversion; u64 nanoseconds overflow in the year 2554
pub fn safe_duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

pub fn secs_to_ns(secs: u32) -> u64 {
    u64::from(secs) * NANOS_PER_SEC
}
