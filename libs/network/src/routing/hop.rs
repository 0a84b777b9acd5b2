//! Per-pod hop processing
//!
//! A message visits pods by following the routing table carried in its
//! envelope. At each pod the [`HopProcessor`] gathers fan-in parts, records
//! a route, and either completes the traversal (back at the gateway, or
//! wherever `header.no_propagate` stops it) or fans the message out along
//! the pod's out-edges. An error arriving from upstream is chained on
//! arrival, so the caller sees ERROR_CHAINED whatever the topology.

use super::fan_in::{FanIn, FanInStore, ReleasedBucket};
use crate::status;
use crate::{Result, TransportError};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use types::{Envelope, Message, RequestBody, Route, Status, TargetPod};
use uuid::Uuid;

/// Where a request is in its traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Created,
    /// Number of routes recorded so far
    InFlight(usize),
    Completed,
    TimedOut,
    Failed,
}

impl TraversalState {
    /// State observable from the envelope alone
    ///
    /// TimedOut and Failed are decided by the runtime and never inferred.
    pub fn of(envelope: &Envelope) -> Self {
        let table = &envelope.routing_table;
        match envelope.last_route() {
            None => TraversalState::Created,
            Some(last)
                if envelope.routes.len() > 1
                    && table.is_at_gateway()
                    && last.pod == table.gateway
                    && !last.is_open() =>
            {
                TraversalState::Completed
            }
            Some(_) => TraversalState::InFlight(envelope.routes.len()),
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TraversalState::Completed | TraversalState::TimedOut | TraversalState::Failed
        )
    }
}

/// One outbound copy of a message
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Pod name the copy is addressed to
    pub target: String,
    /// `host:port_in` of the target
    pub address: String,
    pub send_as_bind: bool,
    pub message: Message,
}

#[derive(Debug)]
pub enum Gathered {
    Held { received: usize, expected: u32 },
    Ready(Message),
    /// Part arrived after the fan-in deadline; carries the partial result
    /// with a FanInTimeout ERROR
    TimedOut(Message),
    /// Late part of a request already timed out or cancelled here
    Discarded,
}

#[derive(Debug)]
pub enum HopOutcome {
    /// Waiting on more fan-in parts
    Held { received: usize, expected: u32 },
    /// One delivery per out-edge, in out-edge order
    Forward(Vec<Delivery>),
    /// Finished with a final status, at the gateway or a `no_propagate` hop
    Completed(Message),
    /// Fan-in deadline passed before the barrier was met
    TimedOut(Message),
    Discarded,
}

pub struct HopProcessor {
    pod: String,
    pod_id: String,
    fan_in: Arc<FanInStore>,
    default_timeout_secs: u32,
}

impl HopProcessor {
    pub fn new(pod: impl Into<String>, fan_in: Arc<FanInStore>) -> Self {
        Self {
            pod: pod.into(),
            pod_id: Uuid::new_v4().to_string(),
            fan_in,
            default_timeout_secs: 0,
        }
    }

    pub fn with_pod_id(mut self, pod_id: impl Into<String>) -> Self {
        self.pod_id = pod_id.into();
        self
    }

    /// Fan-in timeout for envelopes that carry `timeout = 0`
    pub fn with_default_timeout(mut self, secs: u32) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    pub fn pod_id(&self) -> &str {
        &self.pod_id
    }

    pub fn fan_in(&self) -> &Arc<FanInStore> {
        &self.fan_in
    }

    /// Gather then dispatch in one step
    pub fn process(&self, message: Message, now: u64) -> Result<HopOutcome> {
        match self.gather(message, now)? {
            Gathered::Held { received, expected } => Ok(HopOutcome::Held { received, expected }),
            Gathered::Ready(message) => self.dispatch(message, now),
            Gathered::TimedOut(message) => Ok(HopOutcome::TimedOut(message)),
            Gathered::Discarded => Ok(HopOutcome::Discarded),
        }
    }

    /// Check the cursor and wait for fan-in parts when this pod merges
    pub fn gather(&self, mut message: Message, now: u64) -> Result<Gathered> {
        let expected = self.active_target(&message.envelope)?.expected_parts;
        message.envelope.status = status::arrived(std::mem::take(&mut message.envelope.status));
        if expected <= 1 || !message.envelope.is_returning() {
            return Ok(Gathered::Ready(message));
        }

        let timeout = match message.envelope.timeout {
            0 => self.default_timeout_secs,
            secs => secs,
        };
        let request_id = message.request_id().to_string();
        match self.fan_in.offer(&self.pod, message, expected, timeout, now) {
            FanIn::Held { received, expected } => {
                debug!(
                    request_id = %request_id,
                    pod = %self.pod,
                    received,
                    expected,
                    "Holding part for fan-in"
                );
                Ok(Gathered::Held { received, expected })
            }
            FanIn::Ready(parts) => Ok(Gathered::Ready(merge_parts(parts)?)),
            FanIn::Expired(bucket) => Ok(match self.time_out(bucket, now) {
                Some(message) => Gathered::TimedOut(message),
                None => Gathered::Discarded,
            }),
            FanIn::Discarded => {
                debug!(request_id = %request_id, pod = %self.pod, "Dropped late part");
                Ok(Gathered::Discarded)
            }
        }
    }

    /// Record this hop and complete or fan out
    pub fn dispatch(&self, mut message: Message, now: u64) -> Result<HopOutcome> {
        let target = self.active_target(&message.envelope)?.clone();
        let returning = message.envelope.is_returning();

        let mut route = Route::open(self.pod.clone(), self.pod_id.clone(), now);
        route.status = message.envelope.status.clone();
        route.end_time = now;

        let at_gateway = returning && message.envelope.routing_table.is_at_gateway();
        if at_gateway || message.request.header.no_propagate {
            let final_status = status::finalize(message.envelope.status.clone());
            route.status = final_status.clone();
            message.envelope.status = final_status;
            message.envelope.routes.push(route);
            debug!(
                request_id = %message.request_id(),
                pod = %self.pod,
                hops = message.envelope.routes.len(),
                code = %message.envelope.status.code,
                at_gateway,
                "Traversal completed"
            );
            return Ok(HopOutcome::Completed(message));
        }

        if target.out_edges.is_empty() {
            return Err(TransportError::routing(
                format!(
                    "pod '{}' has no out-edges for request {}",
                    self.pod,
                    message.request_id()
                ),
                Some(&self.pod),
            ));
        }

        message.envelope.routes.push(route);
        message.envelope.sender_id = self.pod.clone();

        let deliveries = target
            .out_edges
            .iter()
            .map(|edge| -> Result<Delivery> {
                let mut copy = message.clone();
                copy.envelope.routing_table.set_active(&edge.pod)?;
                let next = copy.envelope.routing_table.active().ok_or_else(|| {
                    TransportError::routing(format!("unknown pod '{}'", edge.pod), Some(&edge.pod))
                })?;
                let address = next.address();
                let identity = next.target_identity.clone();
                copy.envelope.receiver_identity = identity;
                copy.envelope.receiver_id = edge.pod.clone();
                Ok(Delivery {
                    target: edge.pod.clone(),
                    address,
                    send_as_bind: edge.send_as_bind,
                    message: copy,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            request_id = %message.request_id(),
            pod = %self.pod,
            targets = deliveries.len(),
            "Forwarding"
        );
        Ok(HopOutcome::Forward(deliveries))
    }

    /// Close out a bucket whose deadline passed with a FanInTimeout ERROR
    pub fn time_out(&self, bucket: ReleasedBucket, now: u64) -> Option<Message> {
        let detail = format!("{} of {} parts arrived", bucket.parts.len(), bucket.expected);
        warn!(
            pod = %self.pod,
            request_id = %bucket.request_id,
            %detail,
            "Fan-in timed out"
        );
        let status = Status::error_from(self.pod.clone(), "FanInTimeout", vec![detail]);
        self.abandon(bucket, status, now)
    }

    /// Close out a bucket that never met its barrier
    ///
    /// The arrived parts are merged and a closed route carrying `status`
    /// is appended. Returns `None` when the bucket held no parts.
    pub fn abandon(&self, bucket: ReleasedBucket, status: Status, now: u64) -> Option<Message> {
        let mut message = match merge_parts(bucket.parts) {
            Ok(message) => message,
            Err(err) => {
                warn!(request_id = %bucket.request_id, error = %err, "Abandoned an empty bucket");
                return None;
            }
        };
        let mut route = Route::open(self.pod.clone(), self.pod_id.clone(), now);
        route.end_time = now;
        route.status = status.clone();
        message.envelope.routes.push(route);
        message.envelope.status = status;
        Some(message)
    }

    fn active_target<'a>(&self, envelope: &'a Envelope) -> Result<&'a TargetPod> {
        let table = &envelope.routing_table;
        if table.active_pod != self.pod {
            return Err(TransportError::routing(
                format!(
                    "request {} is addressed to '{}', not '{}'",
                    envelope.request_id, table.active_pod, self.pod
                ),
                Some(&self.pod),
            ));
        }
        table.active().ok_or_else(|| {
            TransportError::routing(
                format!("pod '{}' is not in the routing table", self.pod),
                Some(&self.pod),
            )
        })
    }
}

/// Fold gathered parts into one message
///
/// Routes are unioned in start-time order, statuses merged, and documents
/// de-duplicated by id keeping the first arrival.
pub fn merge_parts(parts: Vec<Message>) -> Result<Message> {
    let mut parts = parts.into_iter();
    let Some(mut merged) = parts.next() else {
        return Err(TransportError::routing("no parts to merge", None));
    };
    let rest: Vec<Message> = parts.collect();
    if rest.is_empty() {
        return Ok(merged);
    }

    let statuses: Vec<Status> = std::iter::once(merged.envelope.status.clone())
        .chain(rest.iter().map(|m| m.envelope.status.clone()))
        .collect();
    merged.envelope.status = status::merge(&Status::success(), &statuses);

    let mut seen_routes: HashSet<(String, String, u64)> = merged
        .envelope
        .routes
        .iter()
        .map(route_key)
        .collect();
    let mut seen_docs: HashSet<String> = merged.request.docs().iter().map(|d| d.id.clone()).collect();

    for part in rest {
        for route in part.envelope.routes {
            if seen_routes.insert(route_key(&route)) {
                merged.envelope.routes.push(route);
            }
        }
        if let (Some(docs), RequestBody::Data { docs: incoming, .. }) =
            (merged.request.docs_mut(), part.request.body)
        {
            docs.extend(incoming.into_iter().filter(|d| seen_docs.insert(d.id.clone())));
        }
    }
    merged.envelope.routes.sort_by_key(|r| r.start_time);
    Ok(merged)
}

fn route_key(route: &Route) -> (String, String, u64) {
    (route.pod.clone(), route.pod_id.clone(), route.start_time)
}
