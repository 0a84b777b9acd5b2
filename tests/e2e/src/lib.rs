//! End-to-End Test Framework for Docmesh
//!
//! Runs a whole topology in one process: every pod of a routing table gets
//! a [`network::PodRuntime`] fed by a shared loopback transport, and
//! requests enter and leave through the gateway's request stream.

pub mod executors;
pub mod framework;

pub use executors::{Embedder, Failing, Tagger};
pub use framework::{diamond, Topology, TopologyBuilder};
