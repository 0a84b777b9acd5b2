//! # Docmesh Types Library
//!
//! Wire data model shared by every docmesh pod: n-dimensional arrays,
//! recursive documents, and the envelope that carries routing, compression
//! and status metadata between processing stages.
//!
//! ## Design Philosophy
//!
//! - **Plain Data**: no I/O and no async; every type is `serde` serializable
//! - **Closed Sum Types**: document content, array layout and request body are enums
//! - **Checked Construction**: invariants are validated where values are built
//! - **Stable Wire Values**: status codes, quantization modes and control commands
//!   carry explicit discriminants exposed through `as_u8` / `from_u8`
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Document, Request, RoutingTable, TargetPod, OutEdge, Envelope, Message};
//!
//! let mut doc = Document::builder("doc-1").text("hello").unwrap().build();
//! doc.push_chunk("doc-1/0");
//! assert_eq!(doc.chunks()[0].granularity, 1);
//!
//! let mut table = RoutingTable::new(
//!     "gateway",
//!     TargetPod::new("127.0.0.1", 5555).with_edge(OutEdge::connect("encoder")),
//! );
//! table.add_pod("encoder", TargetPod::new("127.0.0.1", 5556).with_edge(OutEdge::connect("gateway")));
//! assert!(table.validate().is_ok());
//!
//! let message = Message::new(Envelope::new("", table), Request::data("req-1", vec![doc]));
//! assert_eq!(message.request_id(), "req-1");
//! ```
//!
//! ## Modules
//!
//! - [`array`]: dense and sparse array containers with quantization metadata
//! - [`document`]: document tree, arena storage, scores and traversal
//! - [`protocol`]: envelope, routing table, status and request types
//! - [`structured`]: free-form key/value maps for tags and parameters

pub mod array;
pub mod document;
pub mod error;
pub mod protocol;
pub mod structured;

pub use array::{DType, DenseArray, NdArray, QuantizationMode, SparseArray};
pub use document::{
    batch, dangling_matches, traverse, traverse_flat, traverse_flat_per_path, Content, DocIndex,
    Document, DocumentArena, DocumentBuilder, DocumentIndex, Graph, MatchIndex, MatchRef,
    NamedScore, ScoreMap, TraversalPath, Walk,
};
pub use error::{Result, TypesError};
pub use protocol::{
    CompressConfig, ControlCommand, Envelope, ExceptionInfo, Header, Message, OutEdge, Request,
    RequestBody, Route, RoutingTable, Status, StatusCode, TargetPod, VersionInfo,
};
pub use structured::{Struct, StructValue};
