//! Routing table and per-hop route records
//!
//! The routing table is computed once by an external planner and travels
//! inside the envelope. It only says *where* a message goes next; the
//! transport decides *how* bytes move.

use super::status::Status;
use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One visited hop
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Route {
    pub pod: String,
    pub pod_id: String,
    /// Nanoseconds since UNIX epoch, 0 while unset
    pub start_time: u64,
    /// Nanoseconds since UNIX epoch, 0 while the hop is still open
    pub end_time: u64,
    pub status: Status,
}

impl Route {
    pub fn open(pod: impl Into<String>, pod_id: impl Into<String>, start_time: u64) -> Self {
        Self {
            pod: pod.into(),
            pod_id: pod_id.into(),
            start_time,
            end_time: 0,
            status: Status::success(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time == 0
    }

    pub fn duration_ns(&self) -> Option<u64> {
        if self.is_open() {
            None
        } else {
            Some(self.end_time.saturating_sub(self.start_time))
        }
    }
}

/// Downstream edge of a pod
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutEdge {
    pub pod: String,
    /// Sender binds instead of connects; carried through, never interpreted
    pub send_as_bind: bool,
}

impl OutEdge {
    pub fn connect(pod: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            send_as_bind: false,
        }
    }

    pub fn bind(pod: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            send_as_bind: true,
        }
    }
}

/// Addressing and topology information for one pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPod {
    pub host: String,
    pub port_in: u16,
    pub port_out: u16,
    /// Upstream parts to collect before proceeding (fan-in)
    pub expected_parts: u32,
    pub out_edges: Vec<OutEdge>,
    /// Identity for router-dealer demultiplexing on a shared inbound channel
    pub target_identity: Option<String>,
}

impl Default for TargetPod {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port_in: 0,
            port_out: 0,
            expected_parts: 1,
            out_edges: Vec::new(),
            target_identity: None,
        }
    }
}

impl TargetPod {
    pub fn new(host: impl Into<String>, port_in: u16) -> Self {
        Self {
            host: host.into(),
            port_in,
            ..Default::default()
        }
    }

    pub fn with_edge(mut self, edge: OutEdge) -> Self {
        self.out_edges.push(edge);
        self
    }

    pub fn with_expected_parts(mut self, parts: u32) -> Self {
        self.expected_parts = parts;
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.target_identity = Some(identity.into());
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port_in)
    }
}

/// Multi-hop delivery plan
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    pub pods: BTreeMap<String, TargetPod>,
    /// Cursor: pod currently handling the message
    pub active_pod: String,
    /// Pod that is both entry and exit of the topology
    pub gateway: String,
}

impl RoutingTable {
    /// Table with only the gateway; `active_pod` starts at the gateway
    pub fn new(gateway: impl Into<String>, gateway_pod: TargetPod) -> Self {
        let gateway = gateway.into();
        let mut pods = BTreeMap::new();
        pods.insert(gateway.clone(), gateway_pod);
        Self {
            pods,
            active_pod: gateway.clone(),
            gateway,
        }
    }

    pub fn add_pod(&mut self, name: impl Into<String>, pod: TargetPod) -> &mut Self {
        self.pods.insert(name.into(), pod);
        self
    }

    pub fn active(&self) -> Option<&TargetPod> {
        self.pods.get(&self.active_pod)
    }

    pub fn is_at_gateway(&self) -> bool {
        self.active_pod == self.gateway
    }

    /// Move the cursor; the target must exist in the table
    pub fn set_active(&mut self, pod: &str) -> Result<()> {
        if !self.pods.contains_key(pod) {
            return Err(TypesError::configuration(
                format!("pod '{}' is not in the routing table", pod),
                Some("active_pod"),
            ));
        }
        self.active_pod = pod.to_string();
        Ok(())
    }

    /// Check cursor, gateway, edge targets and fan-in counts
    pub fn validate(&self) -> Result<()> {
        if !self.pods.contains_key(&self.gateway) {
            return Err(TypesError::configuration(
                format!("gateway '{}' is not in the routing table", self.gateway),
                Some("gateway"),
            ));
        }
        if !self.pods.contains_key(&self.active_pod) {
            return Err(TypesError::configuration(
                format!("active pod '{}' is not in the routing table", self.active_pod),
                Some("active_pod"),
            ));
        }
        for (name, pod) in &self.pods {
            if pod.expected_parts == 0 {
                return Err(TypesError::configuration(
                    format!("pod '{}' expects zero parts", name),
                    Some("expected_parts"),
                ));
            }
            if let Some(edge) = pod.out_edges.iter().find(|e| !self.pods.contains_key(&e.pod)) {
                return Err(TypesError::configuration(
                    format!("pod '{}' has an edge to unknown pod '{}'", name, edge.pod),
                    Some("out_edges"),
                ));
            }
        }
        Ok(())
    }
}
