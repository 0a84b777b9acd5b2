//! Core E2E testing framework

use anyhow::{anyhow, Context, Result};
use mesh_config::MeshConfig;
use network::{
    Executor, Gateway, LoopbackTransport, PodRuntime, ProtocolConfig, ProtocolProcessor, Report,
    RequestStream,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::{
    ControlCommand, Envelope, Header, Message, OutEdge, Request, RoutingTable, TargetPod,
};

/// gateway -> a -> {b, c} -> gateway, with the gateway waiting for both branches
pub fn diamond() -> RoutingTable {
    let mut table = RoutingTable::new(
        "gateway",
        TargetPod::new("127.0.0.1", 5555)
            .with_edge(OutEdge::connect("a"))
            .with_expected_parts(2),
    );
    table
        .add_pod(
            "a",
            TargetPod::new("127.0.0.1", 5556)
                .with_edge(OutEdge::connect("b"))
                .with_edge(OutEdge::connect("c")),
        )
        .add_pod(
            "b",
            TargetPod::new("127.0.0.1", 5557).with_edge(OutEdge::connect("gateway")),
        )
        .add_pod(
            "c",
            TargetPod::new("127.0.0.1", 5558).with_edge(OutEdge::connect("gateway")),
        );
    table
}

/// Log to the test writer, once per process
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub struct TopologyBuilder {
    table: RoutingTable,
    config: MeshConfig,
    executors: HashMap<String, Arc<dyn Executor>>,
    timeout_secs: u32,
}

impl TopologyBuilder {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table,
            config: MeshConfig::default(),
            executors: HashMap::new(),
            timeout_secs: 0,
        }
    }

    pub fn config(mut self, config: MeshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, pod: &str, executor: impl Executor + 'static) -> Self {
        self.executors.insert(pod.to_string(), Arc::new(executor));
        self
    }

    /// Fan-in timeout stamped on every request envelope
    pub fn timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Spawn one runtime per pod and wire the gateway
    pub fn start(mut self) -> Result<Topology> {
        self.table.validate()?;
        let protocol_config = ProtocolConfig::from_settings(&self.config);
        let compression = protocol_config.compression.clone();
        let protocol = Arc::new(ProtocolProcessor::new(protocol_config)?);
        let transport = Arc::new(
            LoopbackTransport::new(protocol).with_capacity(self.config.protocol.channel_capacity),
        );

        let mut runtimes = HashMap::new();
        let mut reports = HashMap::new();
        let mut tasks = Vec::new();
        for name in self.table.pods.keys() {
            let mut builder =
                PodRuntime::builder(name.as_str(), transport.clone()).settings(&self.config.fan_in);
            if let Some(executor) = self.executors.remove(name) {
                builder = builder.executor(executor);
            }
            let (runtime, pod_reports) = builder.build();
            let inbox = transport.register(name.as_str());
            tasks.push(tokio::spawn(runtime.clone().run(inbox)));
            runtimes.insert(name.clone(), runtime);
            reports.insert(name.clone(), pod_reports);
        }
        if let Some(unused) = self.executors.keys().next() {
            warn!(pod = %unused, "Executor given for a pod outside the routing table");
        }

        let gateway_name = self.table.gateway.clone();
        let gateway_runtime = runtimes
            .get(&gateway_name)
            .cloned()
            .ok_or_else(|| anyhow!("gateway '{}' has no runtime", gateway_name))?;
        let gateway_reports = reports
            .remove(&gateway_name)
            .ok_or_else(|| anyhow!("gateway '{}' has no report channel", gateway_name))?;
        let gateway = Gateway::new(gateway_runtime, self.table.clone(), gateway_reports)?
            .with_timeout(self.timeout_secs)
            .with_compression(compression);

        info!(pods = runtimes.len(), gateway = %gateway_name, "Topology started");
        Ok(Topology {
            table: self.table,
            gateway,
            runtimes,
            reports,
            tasks,
        })
    }
}

/// A running in-process topology
pub struct Topology {
    table: RoutingTable,
    gateway: Gateway,
    runtimes: HashMap<String, Arc<PodRuntime>>,
    reports: HashMap<String, mpsc::UnboundedReceiver<Report>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Topology {
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn runtime(&self, pod: &str) -> Option<&Arc<PodRuntime>> {
        self.runtimes.get(pod)
    }

    /// Send every request, close the stream and collect the responses
    pub async fn roundtrip(&self, requests: Vec<Request>, wait: Duration) -> Result<Vec<Request>> {
        let (sender, receiver) = mpsc::channel(requests.len().max(1));
        let mut responses = self.gateway.call(receiver).await?;
        for request in requests {
            sender
                .send(request)
                .await
                .map_err(|_| anyhow!("gateway stream closed early"))?;
        }
        drop(sender);

        let mut finished = Vec::new();
        loop {
            match tokio::time::timeout(wait, responses.recv()).await {
                Ok(Some(request)) => finished.push(request),
                Ok(None) => break,
                Err(_) => {
                    return Err(anyhow!(
                        "timed out after {:?} with {} responses",
                        wait,
                        finished.len()
                    ))
                }
            }
        }
        Ok(finished)
    }

    /// Deliver a control command to `pod`, optionally naming a target pod
    pub async fn control(
        &self,
        pod: &str,
        command: ControlCommand,
        target: Option<&str>,
    ) -> Result<()> {
        let runtime = self
            .runtime(pod)
            .ok_or_else(|| anyhow!("unknown pod '{}'", pod))?;
        let mut request = Request::control(format!("{}-{}", pod, command), command);
        if let Some(target) = target {
            request = request.with_header(Header::targeting(target));
        }
        let message = Message::new(Envelope::new("", self.table.clone()), request);
        runtime
            .handle(message)
            .await
            .with_context(|| format!("{} rejected {}", pod, command))
    }

    /// Reports published by a pod other than the gateway
    pub fn drain_reports(&mut self, pod: &str) -> Vec<Report> {
        let mut out = Vec::new();
        if let Some(reports) = self.reports.get_mut(pod) {
            while let Ok(report) = reports.try_recv() {
                out.push(report);
            }
        }
        out
    }

    /// Terminate every pod and wait for the runtimes to stop
    pub async fn shutdown(self) -> Result<()> {
        for (name, runtime) in &self.runtimes {
            if runtime.state().is_terminated() {
                continue;
            }
            let message = Message::new(
                Envelope::new("", self.table.clone()),
                Request::control(format!("{}-shutdown", name), ControlCommand::Terminate),
            );
            runtime.handle(message).await?;
        }
        for task in self.tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .context("runtime did not stop")??;
        }
        info!("Topology stopped");
        Ok(())
    }
}
