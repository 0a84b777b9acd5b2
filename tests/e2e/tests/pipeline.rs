//! Requests traversing a diamond topology end to end

use codec::decode_ndarray;
use docmesh_e2e_tests::framework::init_test_tracing;
use docmesh_e2e_tests::{diamond, Embedder, Failing, Tagger, TopologyBuilder};
use std::collections::BTreeSet;
use std::time::Duration;
use types::{
    ControlCommand, Document, OutEdge, QuantizationMode, Request, RoutingTable, StatusCode,
    TargetPod,
};

const WAIT: Duration = Duration::from_secs(5);

fn query(id: &str, text: &str) -> Request {
    let doc = Document::builder(format!("{}-query", id))
        .text(text)
        .unwrap()
        .build();
    Request::data(id, vec![doc])
}

#[tokio::test]
async fn test_diamond_merges_both_branches() {
    init_test_tracing();
    let embedder = Embedder::new(8, QuantizationMode::Uint8);
    let topology = TopologyBuilder::new(diamond())
        .executor("a", embedder.clone())
        .executor("b", Tagger::new("b"))
        .executor("c", Tagger::new("c"))
        .start()
        .unwrap();

    let responses = topology
        .roundtrip(vec![query("req-1", "hello mesh")], WAIT)
        .await
        .unwrap();
    assert_eq!(responses.len(), 1);
    let response = &responses[0];
    assert_eq!(response.request_id, "req-1");
    assert_eq!(response.status.code, StatusCode::Success);

    let pods: Vec<&str> = response.routes.iter().map(|r| r.pod.as_str()).collect();
    assert_eq!(pods.len(), 5);
    assert_eq!(pods[0], "gateway");
    assert_eq!(pods[1], "a");
    assert_eq!(
        pods[2..4].iter().copied().collect::<BTreeSet<_>>(),
        BTreeSet::from(["b", "c"])
    );
    assert_eq!(pods[4], "gateway");
    assert!(response.routes.iter().all(|r| r.end_time >= r.start_time));

    let ids: BTreeSet<&str> = response.docs().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, BTreeSet::from(["req-1-query", "b-doc", "c-doc"]));

    let query_doc = &response.docs()[0];
    assert_eq!(query_doc.id, "req-1-query");
    let embedding = decode_ndarray(query_doc.embedding.as_ref().unwrap())
        .unwrap()
        .to_f64();
    let expected = embedder.embed("hello mesh");
    let tolerance = 1.0 / 255.0;
    for (got, want) in embedding.iter().zip(expected.iter()) {
        assert!((got - *want as f64).abs() <= tolerance, "{} vs {}", got, want);
    }

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_complete_independently() {
    init_test_tracing();
    let topology = TopologyBuilder::new(diamond())
        .executor("b", Tagger::new("b"))
        .executor("c", Tagger::new("c"))
        .start()
        .unwrap();

    let requests = (0..16)
        .map(|i| query(&format!("req-{}", i), "parallel"))
        .collect();
    let responses = topology.roundtrip(requests, WAIT).await.unwrap();

    let ids: BTreeSet<String> = responses.iter().map(|r| r.request_id.clone()).collect();
    assert_eq!(ids.len(), 16);
    for response in &responses {
        assert!(response.status.is_success());
        assert_eq!(response.docs().len(), 3);
    }
    assert!(topology.runtime("gateway").unwrap().fan_in().is_empty());

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_branch_failure_is_chained_at_gateway() {
    init_test_tracing();
    let topology = TopologyBuilder::new(diamond())
        .executor("b", Tagger::new("b"))
        .executor("c", Failing::new("ValueError", "bad input"))
        .start()
        .unwrap();

    let responses = topology
        .roundtrip(vec![query("req-err", "boom")], WAIT)
        .await
        .unwrap();
    let status = &responses[0].status;
    assert_eq!(status.code, StatusCode::ErrorChained);
    assert_eq!(status.failing_executor(), Some("c"));
    let exception = status.exception.as_ref().unwrap();
    assert_eq!(exception.name, "ValueError");
    assert_eq!(exception.args, vec!["bad input".to_string()]);

    let gateway_route = responses[0].routes.last().unwrap();
    assert_eq!(gateway_route.status.code, StatusCode::ErrorChained);

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_linear_failure_is_chained_at_gateway() {
    init_test_tracing();
    let mut table = RoutingTable::new(
        "gateway",
        TargetPod::new("127.0.0.1", 5555).with_edge(OutEdge::connect("w")),
    );
    table.add_pod(
        "w",
        TargetPod::new("127.0.0.1", 5556).with_edge(OutEdge::connect("gateway")),
    );
    let topology = TopologyBuilder::new(table)
        .executor("w", Failing::new("ValueError", "bad input"))
        .start()
        .unwrap();

    let responses = topology
        .roundtrip(vec![query("req-w", "boom")], WAIT)
        .await
        .unwrap();
    let status = &responses[0].status;
    assert_eq!(status.code, StatusCode::ErrorChained);
    assert_eq!(status.failing_executor(), Some("w"));
    assert_eq!(responses[0].routes[1].status.code, StatusCode::Error);

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_branch_times_out() {
    init_test_tracing();
    let mut table = diamond();
    table.pods.get_mut("gateway").unwrap().expected_parts = 3;
    let mut config = mesh_config::MeshConfig::default();
    config.fan_in.sweep_interval_ms = 20;

    let topology = TopologyBuilder::new(table)
        .config(config)
        .timeout(1)
        .start()
        .unwrap();

    let responses = topology
        .roundtrip(vec![query("req-slow", "never whole")], WAIT)
        .await
        .unwrap();
    let status = &responses[0].status;
    assert_eq!(status.code, StatusCode::Error);
    assert_eq!(status.failing_executor(), Some("gateway"));
    assert_eq!(
        status.exception.as_ref().map(|e| e.name.as_str()),
        Some("FanInTimeout")
    );
    assert!(topology.runtime("gateway").unwrap().fan_in().is_empty());

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancel_then_shutdown() {
    init_test_tracing();
    let mut topology = TopologyBuilder::new(diamond()).start().unwrap();

    topology
        .control("a", ControlCommand::Cancel, Some("gateway"))
        .await
        .unwrap();
    let replies = topology.drain_reports("a");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].request.command(), Some(ControlCommand::Cancel));

    topology.control("b", ControlCommand::Terminate, None).await.unwrap();
    assert!(topology.runtime("b").unwrap().state().is_terminated());
    assert!(topology
        .control("b", ControlCommand::Activate, None)
        .await
        .is_err());

    topology.shutdown().await.unwrap();
}
