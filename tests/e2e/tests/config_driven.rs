//! Topologies configured from a TOML file

use docmesh_e2e_tests::framework::init_test_tracing;
use docmesh_e2e_tests::{diamond, Embedder, Tagger, TopologyBuilder};
use mesh_config::MeshConfig;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use types::{Document, Request, StatusCode};

const PIPELINE_TOML: &str = r#"
[global]
log_level = "warn"

[compression]
algorithm = "zstd"
min_bytes = 0
min_ratio = 1.0
level = 5

[fan_in]
timeout_secs = 10
sweep_interval_ms = 50

[protocol]
channel_capacity = 64
"#;

fn load(content: &str) -> (TempDir, MeshConfig) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("docmesh.toml");
    fs::write(&path, content).unwrap();
    let config = MeshConfig::load_with_env(Some(path.as_path()), Some(Default::default())).unwrap();
    (dir, config)
}

#[tokio::test]
async fn test_compressed_pipeline_from_file() {
    init_test_tracing();
    let (_dir, config) = load(PIPELINE_TOML);
    assert_eq!(config.compression.algorithm, "zstd");
    assert_eq!(config.fan_in.sweep_interval_ms, 50);

    let topology = TopologyBuilder::new(diamond())
        .config(config)
        .executor("a", Embedder::sparse(32))
        .executor("b", Tagger::new("b"))
        .executor("c", Tagger::new("c"))
        .start()
        .unwrap();
    assert_eq!(topology.gateway().envelope().compression.algorithm, "zstd");

    let text = "a long and very repetitive text ".repeat(64);
    let doc = Document::builder("long").text(text).unwrap().build();
    let responses = topology
        .roundtrip(vec![Request::data("req-z", vec![doc])], Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status.code, StatusCode::Success);
    let long = &responses[0].docs()[0];
    assert!(long.embedding.as_ref().unwrap().is_sparse());
    assert_eq!(long.embedding.as_ref().unwrap().shape(), &[32]);

    topology.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("docmesh.toml");
    fs::write(&path, PIPELINE_TOML).unwrap();

    let env = [("DOCMESH_COMPRESSION__ALGORITHM", "none")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = MeshConfig::load_with_env(Some(path.as_path()), Some(env)).unwrap();
    assert_eq!(config.compression.algorithm, "none");
    assert_eq!(config.compression.level, Some(5));

    let topology = TopologyBuilder::new(diamond()).config(config).start().unwrap();
    assert!(topology.gateway().envelope().compression.is_disabled());
    topology.shutdown().await.unwrap();
}

#[test]
fn test_unknown_algorithm_rejected_at_start() {
    let (_dir, mut config) = load(PIPELINE_TOML);
    config.compression.algorithm = "brotli".to_string();
    let started = tokio_test::block_on(async {
        TopologyBuilder::new(diamond()).config(config).start().is_ok()
    });
    assert!(!started);
}
