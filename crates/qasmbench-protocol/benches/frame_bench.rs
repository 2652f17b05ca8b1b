//! Benchmarks for request framing
//!
//! Run with: cargo bench -p qasmbench-protocol

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use qasmbench_protocol::{FrameDecoder, Framing};

fn program(lines: usize) -> String {
    let mut src = String::from("OPENQASM 3.0;\ninclude \"stdgates.inc\";\nqubit[8] q;\n");
    for i in 0..lines {
        src.push_str(&format!("h q[{}];\ncx q[{}], q[{}];\n", i % 8, i % 8, (i + 1) % 8));
    }
    src
}

/// Encode + decode one request per framing mode.
fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_roundtrip");

    for lines in &[10usize, 100, 1000] {
        let src = program(*lines);
        group.throughput(Throughput::Bytes(src.len() as u64));
        for framing in [Framing::Nul, Framing::Length] {
            group.bench_with_input(BenchmarkId::new(framing.name(), lines), &src, |b, src| {
                b.iter(|| {
                    let wire = framing.encode(black_box(src.as_bytes())).unwrap_or_default();
                    let mut decoder = FrameDecoder::new(framing);
                    decoder.extend(&wire);
                    black_box(decoder.next_frame())
                });
            });
        }
    }

    group.finish();
}

/// Decode a stream that arrives in small chunks.
fn bench_chunked_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_chunked_decode");
    let src = program(200);
    let mut wire = Vec::new();
    for _ in 0..16 {
        wire.extend(Framing::Nul.encode(src.as_bytes()).unwrap_or_default());
    }

    for chunk in &[64usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), chunk, |b, &chunk| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new(Framing::Nul);
                let mut frames = 0;
                for piece in wire.chunks(chunk) {
                    decoder.extend(piece);
                    frames += decoder.drain_frames().len();
                }
                black_box(frames)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_roundtrip, bench_chunked_decode);
criterion_main!(benches);
