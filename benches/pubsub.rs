//! Publish-subscribe latency benchmark
//!
//! Measures one loan -> write -> send -> receive round trip inside a single
//! process for different payload sizes, plus the cost of a bare loan.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box as bb;
use venom_pubsub::{Relocatable, Service, ServiceConfig, StaticVector};

fn service_name(bench: &str, size: usize) -> String {
    format!("bench/{}/{}/{}", bench, std::process::id(), size)
}

fn bench_round_trip<const N: usize>(c: &mut Criterion, group_name: &str)
where
    [u8; N]: Relocatable,
{
    let mut group = c.benchmark_group(group_name);

    let service = Service::<[u8; N]>::open_or_create(
        &service_name("round_trip", N),
        &ServiceConfig::new(1, 1),
    )
    .expect("service creation");
    let publisher = service.create_publisher().expect("publisher creation");
    let subscriber = service.create_subscriber().expect("subscriber creation");

    group.bench_function(BenchmarkId::from_parameter(N), |b| {
        b.iter(|| {
            let sample = publisher
                .loan_uninit()
                .expect("loan should succeed")
                .write_payload(bb([0xAB; N]));
            sample.send().expect("send should succeed");
            let received = subscriber
                .receive()
                .expect("receive should succeed")
                .expect("sample was sent");
            bb(received[0]);
        });
    });

    group.finish();
}

fn bench_payload_sizes(c: &mut Criterion) {
    let _ = env_logger::try_init();
    bench_round_trip::<64>(c, "round_trip_by_size");
    bench_round_trip::<1024>(c, "round_trip_by_size");
    bench_round_trip::<4096>(c, "round_trip_by_size");
    bench_round_trip::<65536>(c, "round_trip_by_size");
}

/// Loan and drop without sending: pool scan plus zeroing
fn bench_loan(c: &mut Criterion) {
    let service = Service::<StaticVector<u64, 128>>::open_or_create(
        &service_name("loan", 128),
        &ServiceConfig::new(1, 1),
    )
    .expect("service creation");
    let publisher = service.create_publisher().expect("publisher creation");

    c.bench_function("loan_drop", |b| {
        b.iter(|| {
            let sample = publisher.loan().expect("loan should succeed");
            bb(sample.len());
        });
    });
}

criterion_group!(benches, bench_payload_sizes, bench_loan);
criterion_main!(benches);
