//! Status aggregation along a traversal
//!
//! Detecting pods set ERROR, ERROR_DUPLICATE or ERROR_NOTALLOWED themselves.
//! ERROR_CHAINED is only ever produced here, when a failure from upstream
//! reaches another hop, whether through a merge point or a plain edge.
//! PENDING and READY are advisory and never leave a finished request:
//! [`finalize`] turns them into ERROR.

use types::{Status, StatusCode};

/// Combine this hop's status with the statuses of gathered parts
///
/// - a local error wins unchanged
/// - otherwise the first incoming error is chained, keeping its exception
/// - otherwise the first advisory status (local, then incoming) is kept
/// - otherwise the result is the local success
pub fn merge(local: &Status, incoming: &[Status]) -> Status {
    if local.code.is_error() {
        return local.clone();
    }
    if let Some(failed) = incoming.iter().find(|s| s.code.is_error()) {
        return chain(failed);
    }
    if local.code.is_advisory() {
        return local.clone();
    }
    incoming
        .iter()
        .find(|s| s.code.is_advisory())
        .cloned()
        .unwrap_or_else(|| local.clone())
}

/// Status a hop takes on for a message it received
///
/// Any error on arrival was raised upstream and is chained.
pub fn arrived(incoming: Status) -> Status {
    if incoming.code.is_error() {
        chain(&incoming)
    } else {
        incoming
    }
}

/// Wrap an upstream failure; already chained statuses pass through
pub fn chain(upstream: &Status) -> Status {
    if upstream.code == StatusCode::ErrorChained {
        return upstream.clone();
    }
    let executor = upstream.failing_executor().unwrap_or("unknown executor");
    Status {
        code: StatusCode::ErrorChained,
        description: format!(
            "{} from upstream {}: {}",
            upstream.code, executor, upstream.description
        ),
        exception: upstream.exception.clone(),
    }
}

/// Map advisory codes to ERROR so only terminal codes reach the caller
pub fn finalize(status: Status) -> Status {
    if status.is_terminal() {
        return status;
    }
    Status {
        code: StatusCode::Error,
        description: format!("request finished while {}: {}", status.code, status.description),
        exception: status.exception,
    }
}
