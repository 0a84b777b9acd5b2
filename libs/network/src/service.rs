//! Service contracts and the in-process transport
//!
//! - [`RequestStream`]: bidirectional request streaming into the gateway
//! - [`MessageIngest`]: fire-and-forget delivery of an enveloped message
//! - [`Transport`]: how a pod ships a [`Delivery`] to its target
//!
//! [`LoopbackTransport`] frames every delivery with the [`ProtocolProcessor`]
//! and hands the bytes to a per-pod tokio channel, so in-process topologies
//! exercise the same wire path as remote ones.

use crate::pod::{PodRuntime, Report};
use crate::protocol::ProtocolProcessor;
use crate::routing::Delivery;
use crate::{Result, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use mesh_config::defaults;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use types::{CompressConfig, Envelope, Message, Request, RoutingTable, Status};

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Stream requests in, receive finished requests out
#[async_trait]
pub trait RequestStream: Send + Sync {
    async fn call(&self, requests: mpsc::Receiver<Request>) -> Result<mpsc::Receiver<Request>>;
}

/// Accept one enveloped message without waiting for its result
#[async_trait]
pub trait MessageIngest: Send + Sync {
    async fn ingest(&self, message: Message) -> Result<()>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, delivery: Delivery) -> Result<()>;
}

/// Receiving end of a [`LoopbackTransport`] registration
pub struct Inbox {
    pod: String,
    receiver: mpsc::Receiver<Vec<u8>>,
    protocol: Arc<ProtocolProcessor>,
}

impl Inbox {
    pub fn pod(&self) -> &str {
        &self.pod
    }

    /// Next decoded message; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Result<Message>> {
        let frame = self.receiver.recv().await?;
        Some(self.protocol.process_inbound(&frame))
    }
}

/// Transport between pods living in one process
pub struct LoopbackTransport {
    protocol: Arc<ProtocolProcessor>,
    inboxes: DashMap<String, mpsc::Sender<Vec<u8>>>,
    capacity: usize,
    send_timeout: Duration,
}

impl LoopbackTransport {
    pub fn new(protocol: Arc<ProtocolProcessor>) -> Self {
        Self {
            protocol,
            inboxes: DashMap::new(),
            capacity: defaults::protocol::CHANNEL_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Create the inbox for `name`, replacing any earlier one
    ///
    /// `name` is matched against a delivery's receiver identity first and
    /// its target pod second.
    pub fn register(&self, name: impl Into<String>) -> Inbox {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(self.capacity);
        if self.inboxes.insert(name.clone(), sender).is_some() {
            warn!(pod = %name, "Replaced existing inbox");
        }
        Inbox {
            pod: name,
            receiver,
            protocol: self.protocol.clone(),
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.inboxes.remove(name).is_some()
    }

    fn sender_for(&self, delivery: &Delivery) -> Option<mpsc::Sender<Vec<u8>>> {
        let identity = delivery.message.envelope.receiver_identity.as_deref();
        identity
            .and_then(|id| self.inboxes.get(id))
            .or_else(|| self.inboxes.get(&delivery.target))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, delivery: Delivery) -> Result<()> {
        let sender = self.sender_for(&delivery).ok_or_else(|| {
            TransportError::routing(
                format!("no inbox registered for '{}'", delivery.target),
                Some(&delivery.target),
            )
        })?;
        let frame = self.protocol.process_outbound(&delivery.message)?;
        let bytes = frame.len();

        match tokio::time::timeout(self.send_timeout, sender.send(frame)).await {
            Ok(Ok(())) => {
                trace!(
                    target_pod = %delivery.target,
                    request_id = %delivery.message.request_id(),
                    bytes,
                    "Delivered frame"
                );
                Ok(())
            }
            Ok(Err(_)) => Err(TransportError::channel(&delivery.target, "inbox closed")),
            Err(_) => Err(TransportError::timeout(
                format!("deliver to {}", delivery.target),
                self.send_timeout.as_millis() as u64,
            )),
        }
    }
}

/// Entry and exit of a topology
///
/// Wraps incoming requests in envelopes carrying the gateway's routing
/// table, feeds them to the gateway runtime, and streams back each request
/// once the runtime reports it finished.
pub struct Gateway {
    runtime: Arc<PodRuntime>,
    template: Envelope,
    reports: Mutex<Option<mpsc::UnboundedReceiver<Report>>>,
    capacity: usize,
}

impl Gateway {
    pub fn new(
        runtime: Arc<PodRuntime>,
        table: RoutingTable,
        reports: mpsc::UnboundedReceiver<Report>,
    ) -> Result<Self> {
        table.validate()?;
        if table.gateway != runtime.name() {
            return Err(TransportError::configuration(
                format!(
                    "routing table gateway '{}' does not match runtime '{}'",
                    table.gateway,
                    runtime.name()
                ),
                Some("gateway"),
            ));
        }
        let mut template = Envelope::new("", table);
        template.sender_id = runtime.name().to_string();
        Ok(Self {
            runtime,
            template,
            reports: Mutex::new(Some(reports)),
            capacity: defaults::protocol::CHANNEL_CAPACITY,
        })
    }

    /// Fan-in timeout stamped on every envelope
    pub fn with_timeout(mut self, secs: u32) -> Self {
        self.template.timeout = secs;
        self
    }

    pub fn with_compression(mut self, compression: CompressConfig) -> Self {
        self.template.compression = compression;
        self
    }

    pub fn envelope(&self) -> &Envelope {
        &self.template
    }
}

#[async_trait]
impl RequestStream for Gateway {
    /// Only one stream may be open per gateway
    async fn call(&self, mut requests: mpsc::Receiver<Request>) -> Result<mpsc::Receiver<Request>> {
        let mut reports = self
            .reports
            .lock()
            .take()
            .ok_or_else(|| TransportError::channel("gateway", "request stream already open"))?;
        let (responses, output) = mpsc::channel(self.capacity);
        let runtime = self.runtime.clone();
        let template = self.template.clone();

        tokio::spawn(async move {
            let mut inflight = 0usize;
            let mut input_open = true;
            loop {
                if !input_open && inflight == 0 {
                    break;
                }
                tokio::select! {
                    request = requests.recv(), if input_open => match request {
                        Some(request) => {
                            inflight += 1;
                            let fallback = request.clone();
                            let message = Message::new(template.clone(), request);
                            if let Err(err) = runtime.ingest(message).await {
                                inflight -= 1;
                                warn!(request_id = %fallback.request_id, error = %err, "Gateway rejected request");
                                let mut failed = fallback;
                                failed.status = Status::error_from(
                                    runtime.name(),
                                    "TransportError",
                                    vec![err.to_string()],
                                );
                                if responses.send(failed).await.is_err() {
                                    break;
                                }
                            }
                        }
                        None => input_open = false,
                    },
                    report = reports.recv() => match report {
                        Some(report) => {
                            inflight = inflight.saturating_sub(1);
                            debug!(
                                request_id = %report.request.request_id,
                                state = ?report.state,
                                "Request finished"
                            );
                            if responses.send(report.request).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            info!("Gateway request stream closed");
        });

        Ok(output)
    }
}
