//! Cache codec benchmarks
//!
//! Measures the per-request work the cache does on top of the network:
//! - request fingerprinting (`CacheKey::compute`)
//! - response blob encoding and decoding
//!
//! Run with: cargo bench --bench cache_codec

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hublot::cache::blob;
use hublot::{CacheKey, CompiledRequest, Config, Headers, Response};
use std::sync::Arc;

fn compiled(body_len: usize) -> CompiledRequest {
    let mut creq = CompiledRequest::new("POST", "http://example.com/search?q=rust&page=2");
    creq.headers.add("Accept", "*/*");
    creq.headers.add("User-Agent", "hublot-bench");
    creq.headers.add("Content-Type", "application/x-www-form-urlencoded");
    creq.headers.add("Cookie", "session=abcdef0123456789; theme=dark");
    creq.headers.add("Content-Length", body_len.to_string());
    if body_len > 0 {
        creq.data = Some(Bytes::from(vec![b'x'; body_len]));
    }
    creq
}

fn response(body_len: usize) -> Response {
    let mut headers = Headers::new();
    headers.add("Content-Type", "text/html; charset=utf-8");
    headers.add("Set-Cookie", "session=abcdef0123456789; Path=/");
    headers.add("Content-Length", body_len.to_string());
    Response::new(
        Arc::new(compiled(0)),
        200,
        Some("OK".to_string()),
        headers,
        vec![b'<'; body_len],
    )
}

fn bench_key_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_key_compute");
    let ignored = Config::default().headers_ignored_by_cache;

    for size in [0usize, 1024, 64 * 1024] {
        let creq = compiled(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &creq, |b, creq| {
            b.iter(|| black_box(CacheKey::compute(black_box(creq), &ignored)));
        });
    }

    group.finish();
}

fn bench_blob(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_blob");

    for size in [1024usize, 256 * 1024] {
        let res = response(size);
        let encoded = blob::compose(&res).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("compose", size), &res, |b, res| {
            b.iter(|| black_box(blob::compose(black_box(res)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("parse", size), &encoded, |b, data| {
            b.iter(|| black_box(blob::parse(black_box(data)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_key_compute, bench_blob);
criterion_main!(benches);
