//! Criterion benchmarks for the ring and send buffers.
//!
//! The receive path copies every inbound byte through the ring; the send path
//! copies a full frame into the send buffer every tick.
//!
//! Run with:
//! ```bash
//! cargo bench --package doomlink-core --bench ring_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use doomlink_core::buffer::{RingBuffer, SendBuffer};
use doomlink_core::protocol::messages::{
    frame_size, DetachedUi, DEFAULT_SCREEN_HEIGHT, DEFAULT_SCREEN_WIDTH,
};
use doomlink_core::protocol::{encode_server_message, ServerMessage};

/// Writes then reads `chunk` bytes, starting from a cursor position that
/// forces the read to wrap.
fn bench_ring_wrapped_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_wrapped_read");
    for chunk in [2usize, 16, 128, 500] {
        let payload = vec![0x5Au8; chunk];
        let mut out = vec![0u8; chunk];
        group.throughput(Throughput::Bytes(chunk as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, _| {
            let mut ring: RingBuffer = RingBuffer::new();
            // Park the cursors near the end of the backing array.
            ring.write_bytes(&[0u8; 480]).unwrap();
            let mut skip = [0u8; 480];
            ring.read_bytes(&mut skip);
            b.iter(|| {
                ring.write_bytes(black_box(&payload)).unwrap();
                assert!(ring.read_bytes(black_box(&mut out)));
            })
        });
    }
    group.finish();
}

/// Single-byte access, the decoder's most common read.
fn bench_ring_u8(c: &mut Criterion) {
    c.bench_function("ring_write_read_u8", |b| {
        let mut ring: RingBuffer = RingBuffer::new();
        b.iter(|| {
            ring.write_u8(black_box(7)).unwrap();
            black_box(ring.read_u8())
        })
    });
}

/// Encodes one full-size inline frame into a two-frame send buffer.
fn bench_send_frame(c: &mut Criterion) {
    let size = frame_size(DEFAULT_SCREEN_WIDTH, DEFAULT_SCREEN_HEIGHT);
    let pixels = vec![0x80u8; size];
    let mut buf = SendBuffer::with_capacity(2 * size);
    let mut sink: Vec<u8> = Vec::with_capacity(4 * size);

    let mut group = c.benchmark_group("send_frame");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("inline_320x200", |b| {
        b.iter(|| {
            let msg = ServerMessage::Frame {
                pixels: black_box(&pixels),
                detached_ui: DetachedUi::empty(),
            };
            encode_server_message(&mut buf, &mut sink, &msg).unwrap();
            buf.flush(&mut sink).unwrap();
            sink.clear();
        })
    });
    group.finish();
}

criterion_group!(benches, bench_ring_wrapped_read, bench_ring_u8, bench_send_frame);
criterion_main!(benches);
