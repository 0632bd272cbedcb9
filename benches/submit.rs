//! Client throughput benchmarks.
//!
//! Measures the overhead of the bridge itself (queueing, throttling,
//! handle resolution) against an in-memory transport, so no sockets are
//! involved:
//! - Batch sizes: 1, 64, 512 requests submitted then awaited
//! - Per-host caps: 1, 8, 64 for a single-host batch
//!
//! Run with: cargo bench --bench submit
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use reqwest::header::HeaderMap;

use reqbridge::{Client, PreparedRequest, RawResponse, Request, Result, Transport};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[1, 64, 512];
const HOST_CAPS: &[usize] = &[1, 8, 64];
const HOST_BATCH: usize = 256;

// ============================================================================
// In-memory Transport
// ============================================================================

/// Answers immediately with a tiny body.
struct Immediate;

#[async_trait]
impl Transport for Immediate {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse> {
        Ok(RawResponse {
            url: request.url.clone(),
            status: 200,
            reason: "OK".into(),
            headers: HeaderMap::new(),
            body: b"ok".to_vec(),
        })
    }
}

fn client(concurrency: usize, per_host: usize) -> Client {
    Client::builder()
        .concurrency(concurrency)
        .concurrency_per_host(per_host)
        .transport(Arc::new(Immediate))
        .build()
        .expect("client should start")
}

fn run_batch(client: &Client, urls: &[String]) {
    let handles: Vec<_> = urls
        .iter()
        .map(|url| client.submit(Request::get(url).build().expect("valid request")))
        .collect();
    for handle in handles {
        black_box(handle.wait().expect("handle resolves"));
    }
}

// ============================================================================
// Benchmark: Submit and Wait
// ============================================================================

fn bench_submit_wait(c: &mut Criterion) {
    let client = client(64, 64);

    let mut group = c.benchmark_group("submit_wait");
    for &size in BATCH_SIZES {
        // Spread over a few hosts so the per-host cap never binds.
        let urls: Vec<String> = (0..size)
            .map(|i| format!("http://host{}.test/item/{i}", i % 16))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("batch", size), &urls, |b, urls| {
            b.iter(|| run_batch(&client, urls));
        });
    }
    group.finish();

    client.close();
}

// ============================================================================
// Benchmark: Per-host Throttle
// ============================================================================

fn bench_host_cap(c: &mut Criterion) {
    let urls: Vec<String> = (0..HOST_BATCH)
        .map(|i| format!("http://single.test/item/{i}"))
        .collect();

    let mut group = c.benchmark_group("host_cap");
    group.throughput(Throughput::Elements(HOST_BATCH as u64));

    for &cap in HOST_CAPS {
        let client = client(64, cap);
        group.bench_with_input(BenchmarkId::new("per_host", cap), &urls, |b, urls| {
            b.iter(|| run_batch(&client, urls));
        });
        client.close();
    }
    group.finish();
}

criterion_group!(benches, bench_submit_wait, bench_host_cap);
criterion_main!(benches);
