//! Wire codec benchmark suite.
//!
//! Benchmarks the sans-IO codec paths at different payload sizes:
//! - Response head parsing
//! - Chunked body decoding
//! - WebSocket frame encode and decode
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use reqwire::protocol::{ChunkedDecoder, Limits, encode_chunk, parse_response};
use reqwire::websocket::frame::{Frame, decode_frame, encode_frame};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[64, 4 * 1024, 256 * 1024];
const CHUNK_SIZE: usize = 8192;

// ============================================================================
// Fixtures
// ============================================================================

fn response_head(fields: usize) -> Vec<u8> {
    let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
    for i in 0..fields {
        raw.extend_from_slice(format!("X-Header-{i}: value-{i}\r\n").as_bytes());
    }
    raw.extend_from_slice(b"Content-Length: 0\r\n\r\n");
    raw
}

fn chunked_body(size: usize) -> Vec<u8> {
    let payload = vec![b'a'; size];
    let mut raw = Vec::with_capacity(size + 64);
    for chunk in payload.chunks(CHUNK_SIZE) {
        encode_chunk(chunk, &mut raw);
    }
    raw.extend_from_slice(b"0\r\n\r\n");
    raw
}

// ============================================================================
// Benchmark: Response Head Parsing
// ============================================================================

fn bench_parse_response(c: &mut Criterion) {
    let limits = Limits::default();
    let mut group = c.benchmark_group("parse_response");

    for fields in [4usize, 32, 96] {
        let raw = response_head(fields);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("fields", fields), &raw, |b, raw| {
            b.iter(|| parse_response(black_box(raw), &limits).map(|(head, _)| head.status_code));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Chunked Decoding
// ============================================================================

fn bench_chunked_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_decode");

    for &size in PAYLOAD_SIZES {
        let raw = chunked_body(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("bytes", size), &raw, |b, raw| {
            b.iter(|| {
                let mut buf = BytesMut::from(&raw[..]);
                let mut out = BytesMut::with_capacity(size);
                let mut decoder = ChunkedDecoder::default();
                decoder.decode(&mut buf, &mut out).map(|_| out.len())
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: WebSocket Frames
// ============================================================================

fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("websocket_frame");

    for &size in PAYLOAD_SIZES {
        let frame = Frame::binary(vec![7u8; size]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode_masked", size), &frame, |b, frame| {
            b.iter(|| {
                let mut out = BytesMut::new();
                encode_frame(black_box(frame), Some([1, 2, 3, 4]), &mut out);
                out.len()
            });
        });

        let mut encoded = BytesMut::new();
        encode_frame(&frame, Some([1, 2, 3, 4]), &mut encoded);
        group.bench_with_input(BenchmarkId::new("decode_masked", size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut buf = encoded.clone();
                decode_frame(&mut buf, usize::MAX).map(|f| f.map(|f| f.payload.len()))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_parse_response, bench_chunked_decode, bench_frames);
criterion_main!(benches);
