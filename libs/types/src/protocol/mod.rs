//! Envelope, routing and status types exchanged between pods
//!
//! Everything here is plain data: the hop state machine that drives a
//! [`RoutingTable`] lives in the `network` crate.

pub mod envelope;
pub mod request;
pub mod routing;
pub mod status;

pub use envelope::{CompressConfig, Envelope, Header, VersionInfo};
pub use request::{ControlCommand, Message, Request, RequestBody};
pub use routing::{OutEdge, Route, RoutingTable, TargetPod};
pub use status::{ExceptionInfo, Status, StatusCode};
