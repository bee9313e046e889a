//! Benchmarks for deduplication and occupancy estimation

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use space_usage::{OccupancyEstimator, Recording, RecordingsDeduplicator};

fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2018, 9, 8, 13, 0, 0).unwrap();
    (start, start + chrono::Duration::minutes(15))
}

fn generate_recordings(count: usize, devices: usize) -> Vec<Recording> {
    let (start, _) = window();
    (0..count)
        .map(|i| {
            let offset = (i as i64 * 7_919) % (15 * 60 * 1000);
            Recording::new(
                format!("device-{:05}", i % devices),
                start + chrono::Duration::milliseconds(offset),
            )
        })
        .collect()
}

fn bench_dedupe(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedupe");

    for &count in &[1_000usize, 10_000, 100_000] {
        let recordings = generate_recordings(count, count / 10);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &recordings, |b, data| {
            let deduplicator = RecordingsDeduplicator::new();
            b.iter(|| black_box(deduplicator.dedupe(data.clone())))
        });
    }

    group.finish();
}

fn bench_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate");
    let (start, end) = window();
    let recordings = generate_recordings(10_000, 1_000);
    let deduped = RecordingsDeduplicator::new().dedupe(recordings.clone());

    group.throughput(Throughput::Elements(10_000));

    for snapshot in [60u64, 300, 900] {
        let estimator = OccupancyEstimator::new(start, end, Duration::from_secs(snapshot)).unwrap();

        group.bench_function(format!("estimate_deduped_{}s", snapshot), |b| {
            b.iter(|| black_box(estimator.estimate(&deduped)))
        });

        group.bench_function(format!("breakdown_{}s", snapshot), |b| {
            b.iter(|| black_box(estimator.breakdown(&recordings)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dedupe, bench_estimate);
criterion_main!(benches);
