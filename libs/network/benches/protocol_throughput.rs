//! Outbound and inbound frame processing
//!
//! A request carrying 64 text documents, framed with and without zstd.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use network::{maybe_compress, ProtocolConfig, ProtocolProcessor};
use types::{
    CompressConfig, Document, Envelope, Message, OutEdge, Request, RoutingTable, TargetPod,
};

fn message(compression: CompressConfig) -> Message {
    let mut table = RoutingTable::new(
        "gateway",
        TargetPod::new("127.0.0.1", 5555).with_edge(OutEdge::connect("encoder")),
    );
    table.add_pod("encoder", TargetPod::new("127.0.0.1", 5556));
    let docs = (0..64)
        .map(|i| {
            Document::builder(format!("doc-{}", i))
                .text(format!("sentence {} of a fairly repetitive benchmark corpus", i))
                .unwrap()
                .build()
        })
        .collect();
    let mut envelope = Envelope::new("", table);
    envelope.compression = compression;
    Message::new(envelope, Request::data("bench", docs))
}

fn bench_frames(c: &mut Criterion) {
    let processor = ProtocolProcessor::new(ProtocolConfig::default()).unwrap();
    let mut group = c.benchmark_group("frame");
    for algorithm in ["none", "zstd"] {
        let message = message(CompressConfig::new(algorithm).with_min_bytes(0));
        let frame = processor.process_outbound(&message).unwrap();
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_function(format!("outbound/{}", algorithm), |b| {
            b.iter(|| processor.process_outbound(black_box(&message)).unwrap())
        });
        group.bench_function(format!("inbound/{}", algorithm), |b| {
            b.iter(|| processor.process_inbound(black_box(&frame)).unwrap())
        });
    }
    group.finish();
}

fn bench_negotiation(c: &mut Criterion) {
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let config = CompressConfig::new("zstd").with_min_bytes(1024);
    c.bench_function("maybe_compress/64KiB", |b| {
        b.iter(|| maybe_compress(black_box(&payload), &config).unwrap())
    });
}

criterion_group!(benches, bench_frames, bench_negotiation);
criterion_main!(benches);
