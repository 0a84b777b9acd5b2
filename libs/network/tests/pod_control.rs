//! Pod runtime control commands and fan-in teardown

use network::{
    FanInStore, LoopbackTransport, PodRuntime, ProtocolConfig, ProtocolProcessor, Report,
    TraversalState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use types::{
    ControlCommand, Document, Envelope, Header, Message, OutEdge, Request, Route, RoutingTable,
    StatusCode, TargetPod,
};

const SEC: u64 = 1_000_000_000;

fn transport() -> Arc<LoopbackTransport> {
    let protocol = ProtocolProcessor::new(ProtocolConfig::default()).unwrap();
    Arc::new(LoopbackTransport::new(Arc::new(protocol)))
}

fn merge_table(active: &str) -> RoutingTable {
    let mut table = RoutingTable::new(
        "gateway",
        TargetPod::new("127.0.0.1", 5555).with_edge(OutEdge::connect("b")),
    );
    table
        .add_pod(
            "b",
            TargetPod::new("127.0.0.1", 5556).with_edge(OutEdge::connect("merger")),
        )
        .add_pod(
            "merger",
            TargetPod::new("127.0.0.1", 5557)
                .with_edge(OutEdge::connect("gateway"))
                .with_expected_parts(2),
        );
    table.set_active(active).unwrap();
    table
}

/// A part on its way back into `pod`, which expects two parts
fn returning_part(pod: &str, request_id: &str, timeout: u32) -> Message {
    let mut envelope = Envelope::new("", merge_table(pod));
    envelope.timeout = timeout;
    envelope.routes.push(Route::open("b", "b-0", 1));
    Message::new(envelope, Request::data(request_id, vec![Document::new("doc")]))
}

fn control(command: ControlCommand) -> Message {
    let table = RoutingTable::new("gateway", TargetPod::new("127.0.0.1", 5555));
    Message::new(Envelope::new("", table), Request::control("ctl", command))
}

fn drain(reports: &mut mpsc::UnboundedReceiver<Report>) -> Vec<Report> {
    let mut out = Vec::new();
    while let Ok(report) = reports.try_recv() {
        out.push(report);
    }
    out
}

#[tokio::test]
async fn test_cancel_clears_only_targeted_pod() {
    let store = Arc::new(FanInStore::new());
    store.offer("gateway", returning_part("gateway", "r1", 0), 2, 0, 0);

    let (merger, mut reports) = PodRuntime::builder("merger", transport())
        .fan_in(store.clone())
        .build();
    merger.handle(returning_part("merger", "r1", 0)).await.unwrap();
    merger.handle(returning_part("merger", "r2", 0)).await.unwrap();
    assert_eq!(store.pending_for("merger"), 2);

    let mut cancel = control(ControlCommand::Cancel);
    cancel.request = cancel.request.with_header(Header::targeting("merger"));
    merger.handle(cancel).await.unwrap();

    assert_eq!(store.pending_for("merger"), 0);
    assert_eq!(store.received("gateway", "r1"), Some(1));

    let replies = drain(&mut reports);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].request.command(), Some(ControlCommand::Cancel));
    assert!(replies[0].request.status.is_success());
}

#[tokio::test]
async fn test_cancel_defaults_to_own_buckets() {
    let (merger, _reports) = PodRuntime::builder("merger", transport()).build();
    merger.handle(returning_part("merger", "r1", 0)).await.unwrap();
    assert_eq!(merger.fan_in().len(), 1);

    merger.handle(control(ControlCommand::Cancel)).await.unwrap();
    assert!(merger.fan_in().is_empty());
}

#[tokio::test]
async fn test_terminate_abandons_held_requests() {
    let (merger, mut reports) = PodRuntime::builder("merger", transport()).build();
    merger.handle(returning_part("merger", "r1", 0)).await.unwrap();
    merger.handle(returning_part("merger", "r2", 0)).await.unwrap();

    merger.handle(control(ControlCommand::Terminate)).await.unwrap();
    assert!(merger.state().is_terminated());
    assert!(merger.fan_in().is_empty());

    let reports = drain(&mut reports);
    let mut failed: Vec<_> = reports
        .iter()
        .filter(|r| r.state == TraversalState::Failed)
        .map(|r| {
            assert_eq!(r.request.status.code, StatusCode::Error);
            assert_eq!(r.request.status.description, "terminated");
            r.request.request_id.as_str()
        })
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["r1", "r2"]);
    assert_eq!(reports.last().map(|r| r.state), Some(TraversalState::Completed));

    let err = merger.handle(returning_part("merger", "r3", 0)).await.unwrap_err();
    assert_eq!(err.category(), "channel");
}

#[tokio::test]
async fn test_fan_in_timeout_reports_error() {
    let (merger, mut reports) = PodRuntime::builder("merger", transport()).build();
    merger.handle(returning_part("merger", "slow", 1)).await.unwrap();
    merger.handle(returning_part("merger", "patient", 0)).await.unwrap();

    let later = network::current_timestamp_ns() + 2 * SEC;
    assert_eq!(merger.sweep(later), 1);
    assert_eq!(merger.fan_in().len(), 1);

    let reports = drain(&mut reports);
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.state, TraversalState::TimedOut);
    assert_eq!(report.request.request_id, "slow");
    assert_eq!(report.request.status.code, StatusCode::Error);
    assert_eq!(report.request.status.failing_executor(), Some("merger"));
    assert_eq!(
        report.request.status.exception.as_ref().map(|e| e.name.as_str()),
        Some("FanInTimeout")
    );
    assert_eq!(report.request.routes.last().map(|r| r.pod.as_str()), Some("merger"));
}

#[tokio::test]
async fn test_part_after_deadline_times_out_without_sweep() {
    let (merger, mut reports) = PodRuntime::builder("merger", transport()).build();
    merger.handle(returning_part("merger", "late", 1)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    merger.handle(returning_part("merger", "late", 1)).await.unwrap();

    assert!(merger.fan_in().is_empty());
    let reports = drain(&mut reports);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, TraversalState::TimedOut);
    assert_eq!(reports[0].request.status.code, StatusCode::Error);
    assert_eq!(
        reports[0].request.status.exception.as_ref().map(|e| e.name.as_str()),
        Some("FanInTimeout")
    );
}

#[tokio::test]
async fn test_straggler_after_timeout_is_reported_once() {
    let (merger, mut reports) = PodRuntime::builder("merger", transport()).build();
    merger.handle(returning_part("merger", "slow", 1)).await.unwrap();
    let later = network::current_timestamp_ns() + 2 * SEC;
    assert_eq!(merger.sweep(later), 1);

    merger.handle(returning_part("merger", "slow", 1)).await.unwrap();
    assert!(merger.fan_in().is_empty());
    assert_eq!(merger.sweep(later + 10 * SEC), 0);
    assert_eq!(drain(&mut reports).len(), 1);
}

#[tokio::test]
async fn test_status_reports_dealer_state() {
    let (pod, mut reports) = PodRuntime::builder("merger", transport()).build();
    pod.handle(returning_part("merger", "r1", 0)).await.unwrap();
    pod.handle(control(ControlCommand::Status)).await.unwrap();

    let reply = drain(&mut reports).pop().unwrap();
    let params = &reply.request.parameters;
    assert_eq!(params.get("state").and_then(|v| v.as_str()), Some("ready"));
    assert_eq!(params.get("pending_buckets").and_then(|v| v.as_i64()), Some(1));
}

#[tokio::test]
async fn test_deactivated_pod_rejects_data() {
    let (pod, _reports) = PodRuntime::builder("merger", transport()).build();
    pod.handle(control(ControlCommand::Deactivate)).await.unwrap();
    assert!(pod.handle(returning_part("merger", "r1", 0)).await.is_err());

    pod.handle(control(ControlCommand::Activate)).await.unwrap();
    pod.handle(returning_part("merger", "r1", 0)).await.unwrap();
    assert_eq!(pod.fan_in().len(), 1);
}

#[test]
fn test_idle_requires_activation() {
    let (pod, _reports) = PodRuntime::builder("merger", transport()).build();
    tokio_test::block_on(async {
        pod.handle(control(ControlCommand::Deactivate)).await.unwrap();
        assert!(pod.handle(control(ControlCommand::Idle)).await.is_err());
        pod.handle(control(ControlCommand::Activate)).await.unwrap();
        pod.handle(control(ControlCommand::Idle)).await.unwrap();
    });
    assert_eq!(pod.state(), network::DealerState::Ready);
}
