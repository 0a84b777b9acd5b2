//! # Docmesh Network
//!
//! Moves enveloped requests between pods:
//!
//! - `protocol`: compression negotiation and the `DMSH` wire frame
//! - `routing`: hop processing along the envelope's routing table, fan-in barriers
//! - `status`: status merging where branches meet
//! - `control`: control commands and the dealer state machine
//! - `service`: request stream, ingest and transport contracts, in-process transport
//! - `pod`: the runtime tying the above together for one pod
//!
//! ## Message Flow
//!
//! ```text
//! client ─▶ Gateway ─▶ PodRuntime(gateway) ─▶ Transport ─▶ PodRuntime(a) ─▶ ...
//!                           ▲                                               │
//!                           └────────── fan-in, status merge ◀──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use network::routing::{FanInStore, HopOutcome, HopProcessor};
//! use std::sync::Arc;
//! use types::{Envelope, Message, OutEdge, Request, RoutingTable, TargetPod};
//!
//! let mut table = RoutingTable::new(
//!     "gateway",
//!     TargetPod::new("127.0.0.1", 5555).with_edge(OutEdge::connect("encoder")),
//! );
//! table.add_pod(
//!     "encoder",
//!     TargetPod::new("127.0.0.1", 5556).with_edge(OutEdge::connect("gateway")),
//! );
//! let message = Message::new(Envelope::new("", table), Request::data("req-1", vec![]));
//!
//! let gateway = HopProcessor::new("gateway", Arc::new(FanInStore::new()));
//! match gateway.process(message, 0).unwrap() {
//!     HopOutcome::Forward(deliveries) => assert_eq!(deliveries[0].target, "encoder"),
//!     other => panic!("unexpected outcome {:?}", other),
//! }
//! ```

pub mod control;
pub mod error;
pub mod pod;
pub mod protocol;
pub mod routing;
pub mod service;
pub mod status;
pub mod time;

pub use control::{ControlHooks, DealerState, NoopHooks};
pub use error::{Result, TransportError};
pub use pod::{Executor, ExecutorError, PassThrough, PodRuntime, PodRuntimeBuilder, Report};
pub use protocol::compression::{decompress, maybe_compress};
pub use protocol::{Compressor, CompressorRegistry, ProtocolConfig, ProtocolProcessor};
pub use routing::{Delivery, FanInStore, HopOutcome, HopProcessor, TraversalState};
pub use service::{Gateway, Inbox, LoopbackTransport, MessageIngest, RequestStream, Transport};
pub use time::current_timestamp_ns;
