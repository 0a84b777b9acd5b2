//! Pod Runtime
//!
//! Drives one pod: decodes inbound frames, gathers fan-in parts, runs the
//! pod's [`Executor`], routes the result onward and handles control
//! commands. Finished requests (completed at the gateway, timed out, or
//! abandoned on terminate) are published as [`Report`]s.
//!
//! ## Control commands
//!
//! | Command    | Bookkeeping                                        |
//! |------------|----------------------------------------------------|
//! | CANCEL     | drop the fan-in buckets of `header.target_peapod`  |
//! | TERMINATE  | report every held request as ERROR, stop the loop  |
//! | STATUS     | reply with dealer state and pending bucket count   |
//! | IDLE, ACTIVATE, DEACTIVATE | dealer state only                  |
//!
//! [`ControlHooks`] run after the bookkeeping.

use crate::control::{self, ControlHooks, DealerState, NoopHooks};
use crate::routing::{FanInStore, Gathered, HopOutcome, HopProcessor, TraversalState};
use crate::service::{Inbox, MessageIngest, Transport};
use crate::time::current_timestamp_ns;
use crate::Result;
use crate::TransportError;
use async_trait::async_trait;
use futures::future::try_join_all;
use mesh_config::FanInSettings;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use types::{ControlCommand, ExceptionInfo, Message, Request, Status, StatusCode, StructValue};

/// A request that left the pod for good
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub pod: String,
    pub state: TraversalState,
    pub request: Request,
}

/// Failure raised by an executor; recorded as an ERROR status, not propagated
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{name}: {message}")]
pub struct ExecutorError {
    pub name: String,
    pub message: String,
}

impl ExecutorError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Work a pod applies to data requests before routing them on
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &mut Request) -> std::result::Result<(), ExecutorError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl Executor for PassThrough {
    async fn execute(&self, _request: &mut Request) -> std::result::Result<(), ExecutorError> {
        Ok(())
    }
}

pub struct PodRuntimeBuilder {
    name: String,
    transport: Arc<dyn Transport>,
    fan_in: Option<Arc<FanInStore>>,
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn ControlHooks>,
    settings: FanInSettings,
    pod_id: Option<String>,
}

impl PodRuntimeBuilder {
    /// Share a fan-in store with other runtimes in this process
    pub fn fan_in(mut self, store: Arc<FanInStore>) -> Self {
        self.fan_in = Some(store);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ControlHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn settings(mut self, settings: &FanInSettings) -> Self {
        self.settings = settings.clone();
        self
    }

    pub fn pod_id(mut self, pod_id: impl Into<String>) -> Self {
        self.pod_id = Some(pod_id.into());
        self
    }

    /// The runtime starts activated, in [`DealerState::Ready`]
    pub fn build(self) -> (Arc<PodRuntime>, mpsc::UnboundedReceiver<Report>) {
        let fan_in = self.fan_in.unwrap_or_default();
        let mut hop = HopProcessor::new(self.name, fan_in)
            .with_default_timeout(self.settings.timeout_secs);
        if let Some(pod_id) = self.pod_id {
            hop = hop.with_pod_id(pod_id);
        }
        let (reports, receiver) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let runtime = PodRuntime {
            hop,
            transport: self.transport,
            executor: self.executor,
            hooks: self.hooks,
            state: RwLock::new(DealerState::Ready),
            reports,
            shutdown,
            sweep_interval: Duration::from_millis(self.settings.sweep_interval_ms.max(1)),
        };
        (Arc::new(runtime), receiver)
    }
}

pub struct PodRuntime {
    hop: HopProcessor,
    transport: Arc<dyn Transport>,
    executor: Arc<dyn Executor>,
    hooks: Arc<dyn ControlHooks>,
    state: RwLock<DealerState>,
    reports: mpsc::UnboundedSender<Report>,
    shutdown: watch::Sender<bool>,
    sweep_interval: Duration,
}

impl PodRuntime {
    pub fn builder(name: impl Into<String>, transport: Arc<dyn Transport>) -> PodRuntimeBuilder {
        PodRuntimeBuilder {
            name: name.into(),
            transport,
            fan_in: None,
            executor: Arc::new(PassThrough),
            hooks: Arc::new(NoopHooks),
            settings: FanInSettings::default(),
            pod_id: None,
        }
    }

    pub fn name(&self) -> &str {
        self.hop.pod()
    }

    pub fn state(&self) -> DealerState {
        *self.state.read()
    }

    pub fn fan_in(&self) -> &Arc<FanInStore> {
        self.hop.fan_in()
    }

    /// Handle one decoded message
    pub async fn handle(&self, message: Message) -> Result<()> {
        if self.state().is_terminated() {
            return Err(TransportError::channel(self.name(), "pod is terminated"));
        }
        if let Some(command) = message.request.command() {
            return self.handle_control(command, message).await;
        }
        self.state().begin_work()?;

        let mut message = match self.hop.gather(message, current_timestamp_ns())? {
            Gathered::Held { .. } | Gathered::Discarded => return Ok(()),
            Gathered::TimedOut(message) => {
                self.report(TraversalState::TimedOut, message.into_request());
                return Ok(());
            }
            Gathered::Ready(message) => message,
        };
        self.execute(&mut message).await;

        match self.hop.dispatch(message, current_timestamp_ns())? {
            HopOutcome::Held { .. } | HopOutcome::Discarded => Ok(()),
            HopOutcome::Forward(deliveries) => {
                try_join_all(deliveries.into_iter().map(|d| self.transport.send(d))).await?;
                Ok(())
            }
            HopOutcome::Completed(message) => {
                self.report(TraversalState::Completed, message.into_request());
                Ok(())
            }
            HopOutcome::TimedOut(message) => {
                self.report(TraversalState::TimedOut, message.into_request());
                Ok(())
            }
        }
    }

    /// Release this pod's expired fan-in buckets as ERROR reports
    pub fn sweep(&self, now: u64) -> usize {
        let released = self.fan_in().sweep_expired_for(self.name(), now);
        let count = released.len();
        for bucket in released {
            if let Some(message) = self.hop.time_out(bucket, now) {
                self.report(TraversalState::TimedOut, message.into_request());
            }
        }
        count
    }

    /// Read frames until the inbox closes or the pod terminates
    pub async fn run(self: Arc<Self>, mut inbox: Inbox) {
        let sweeper = self.clone().spawn_sweeper();
        let mut shutdown = self.shutdown.subscribe();
        info!(pod = %self.name(), "Pod runtime started");

        loop {
            tokio::select! {
                frame = inbox.recv() => match frame {
                    Some(Ok(message)) => {
                        let request_id = message.request_id().to_string();
                        if let Err(err) = self.handle(message).await {
                            warn!(
                                pod = %self.name(),
                                request_id = %request_id,
                                category = err.category(),
                                error = %err,
                                "Failed to handle message"
                            );
                        }
                    }
                    Some(Err(err)) => {
                        warn!(pod = %self.name(), error = %err, "Dropped undecodable frame");
                    }
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
            if self.state().is_terminated() {
                break;
            }
        }

        sweeper.abort();
        info!(pod = %self.name(), "Pod runtime stopped");
    }

    fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep(current_timestamp_ns());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn execute(&self, message: &mut Message) {
        if message.envelope.routing_table.is_at_gateway() || message.envelope.status.code.is_error() {
            return;
        }
        *self.state.write() = DealerState::Busy;
        let result = self.executor.execute(&mut message.request).await;
        {
            let mut state = self.state.write();
            if *state == DealerState::Busy {
                *state = DealerState::Ready;
            }
        }

        if let Err(err) = result {
            warn!(
                pod = %self.name(),
                request_id = %message.request_id(),
                error = %err,
                "Executor failed"
            );
            message.envelope.status = Status::error_from(self.name(), err.name, vec![err.message]);
        }
    }

    async fn handle_control(&self, command: ControlCommand, message: Message) -> Result<()> {
        {
            let mut state = self.state.write();
            *state = state.on_command(command)?;
        }
        debug!(pod = %self.name(), %command, request_id = %message.request_id(), "Control command");

        match command {
            ControlCommand::Cancel => {
                let target = message.request.header.target().unwrap_or(self.name());
                self.fan_in().cancel_pod(target);
            }
            ControlCommand::Terminate => self.abandon_all(),
            _ => {}
        }

        control::dispatch(self.hooks.as_ref(), command, &message.request).await?;

        let mut request = message.into_request();
        request.status = Status::success();
        if command == ControlCommand::Status {
            request
                .parameters
                .insert("state".into(), StructValue::from(self.state().to_string()));
            let pending = self.fan_in().pending_for(self.name()) as i64;
            request
                .parameters
                .insert("pending_buckets".into(), StructValue::from(pending));
        }
        self.report(TraversalState::Completed, request);

        if command == ControlCommand::Terminate {
            self.shutdown.send_replace(true);
        }
        Ok(())
    }

    /// Report every request held here as ERROR "terminated"
    fn abandon_all(&self) {
        let now = current_timestamp_ns();
        let drained = self.fan_in().drain_pod(self.name());
        info!(pod = %self.name(), count = drained.len(), "Abandoning held requests");
        for bucket in drained {
            let status = Status {
                code: StatusCode::Error,
                description: "terminated".to_string(),
                exception: Some(ExceptionInfo::new("Terminated", self.name())),
            };
            if let Some(message) = self.hop.abandon(bucket, status, now) {
                self.report(TraversalState::Failed, message.into_request());
            }
        }
    }

    fn report(&self, state: TraversalState, request: Request) {
        let report = Report {
            pod: self.name().to_string(),
            state,
            request,
        };
        if self.reports.send(report).is_err() {
            debug!(pod = %self.name(), "Report receiver dropped");
        }
    }
}

#[async_trait]
impl MessageIngest for PodRuntime {
    async fn ingest(&self, message: Message) -> Result<()> {
        self.handle(message).await
    }
}
