//! Request Routing
//!
//! Hop-by-hop traversal of the routing table carried in each envelope, and
//! the fan-in barrier used where branches merge.

pub mod fan_in;
pub mod hop;

pub use fan_in::{FanIn, FanInStore, ReleasedBucket};
pub use hop::{merge_parts, Delivery, Gathered, HopOutcome, HopProcessor, TraversalState};
