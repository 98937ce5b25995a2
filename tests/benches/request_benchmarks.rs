//! # Request/Response Benchmarks
//!
//! | Benchmark | Measures |
//! |-----------|----------|
//! | registry/register_take | Registry insert + atomic removal |
//! | roundtrip/echo | One request through broker, echo service and router |
//! | roundtrip/concurrent | N concurrent requests in flight |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use rpc_core::{deadline_after, CorrelationId, CorrelationRegistry, ReplySlot};
use rpc_tests::fixtures::{handler, spawn_echo, SERVICE_TOPIC};
use shared_bus::InMemoryBroker;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");
    let registry = CorrelationRegistry::new();

    group.bench_function("register_take", |b| {
        b.iter(|| {
            let id = CorrelationId::new();
            let (slot, _rx) = ReplySlot::channel(id);
            registry
                .register(id, slot, deadline_after(Duration::from_secs(10)))
                .expect("fresh id");
            black_box(registry.take_and_remove(&id))
        })
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let broker = Arc::new(InMemoryBroker::new());
    let (caller, _echo) = runtime.block_on(async {
        let echo = spawn_echo(&broker, "echo").await;
        let caller = handler(&broker, "bench", Duration::from_secs(5)).await;
        (caller, echo)
    });

    let mut group = c.benchmark_group("roundtrip");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("echo", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(
                caller
                    .request_payload(SERVICE_TOPIC, "ping")
                    .await
                    .expect("reply"),
            )
        })
    });

    for size in [10usize, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("concurrent", size), &size, |b, &size| {
            b.to_async(&runtime).iter(|| async {
                let calls = (0..size).map(|i| caller.request_payload(SERVICE_TOPIC, format!("{i}")));
                black_box(join_all(calls).await)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_registry, bench_roundtrip);
criterion_main!(benches);
