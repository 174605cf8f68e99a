#![allow(clippy::all)]
//! Benchmarks for the frame codec and session.
//!
//! Tests: Frame encoding, incremental decoding, masking, message reassembly.

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use r0n_websocket::websocket::{apply_mask, Decoded, Frame, FrameCodec, MessageKind, Session};
use std::hint::black_box;

const MASK: Option<[u8; 4]> = Some([0x37, 0xFA, 0x21, 0x3D]);
const SIZES: [usize; 4] = [16, 1024, 65_536, 1024 * 1024];

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("websocket/encode");
    let codec = FrameCodec::new();

    for size in SIZES {
        let payload = Bytes::from(vec![0x42u8; size]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("unmasked", size), &payload, |b, payload| {
            let frame = Frame::binary(payload.clone());
            let mut dst = BytesMut::with_capacity(size + 14);
            b.iter(|| {
                dst.clear();
                codec.encode(black_box(&frame), &mut dst);
            });
        });

        group.bench_with_input(BenchmarkId::new("masked", size), &payload, |b, payload| {
            let frame = Frame::binary(payload.clone()).with_mask(MASK);
            let mut dst = BytesMut::with_capacity(size + 14);
            b.iter(|| {
                dst.clear();
                codec.encode(black_box(&frame), &mut dst);
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("websocket/decode");

    for size in SIZES {
        let wire = FrameCodec::new().encode_to_bytes(&Frame::binary(vec![0x42u8; size]).with_mask(MASK));
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("whole", size), &wire, |b, wire| {
            let mut codec = FrameCodec::new();
            b.iter(|| match codec.decode(black_box(wire)) {
                Ok(Decoded::Frame { frame, .. }) => black_box(frame),
                other => panic!("unexpected decode result: {other:?}"),
            });
        });

        group.bench_with_input(BenchmarkId::new("chunked_4k", size), &wire, |b, wire| {
            let mut codec = FrameCodec::new();
            let mut buf = BytesMut::with_capacity(wire.len());
            b.iter(|| {
                buf.clear();
                for chunk in wire.chunks(4096) {
                    buf.extend_from_slice(chunk);
                    if let Ok(Decoded::Frame { frame, .. }) = codec.decode(&buf) {
                        black_box(frame);
                    }
                }
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Masking
// ---------------------------------------------------------------------------

fn bench_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("websocket/mask");

    for size in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut data = vec![0x42u8; size];
            b.iter(|| apply_mask(black_box(&mut data), [0x37, 0xFA, 0x21, 0x3D]));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn bench_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("websocket/session");
    let codec = FrameCodec::new();

    group.bench_function("receive_text_message", |b| {
        let wire = codec.encode_to_bytes(&Frame::text("Hello, WebSocket!").with_mask(MASK));
        let mut session = Session::server();
        b.iter(|| {
            session.receive(black_box(&wire));
            black_box(session.poll_event());
        });
    });

    group.bench_function("reassemble_16_fragments", |b| {
        let mut wire = BytesMut::new();
        for i in 0..16 {
            let fragment = if i == 0 {
                Frame::binary(vec![0u8; 1024]).with_fin(false)
            } else {
                Frame::continuation(i == 15, vec![0u8; 1024])
            };
            codec.encode(&fragment.with_mask(MASK), &mut wire);
        }
        let wire = wire.freeze();
        let mut session = Session::server();
        b.iter(|| {
            session.receive(black_box(&wire));
            black_box(session.poll_event());
        });
    });

    group.bench_function("send_binary_message", |b| {
        let payload = Bytes::from(vec![0u8; 1024]);
        let mut session = Session::server();
        b.iter(|| {
            let _ = session.send_message(
                MessageKind::Binary,
                black_box(payload.clone()),
            );
            black_box(session.take_outbound());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_mask, bench_session);
criterion_main!(benches);
