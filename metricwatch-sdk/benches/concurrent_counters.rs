use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use metricwatch_sdk::Stats;
use std::sync::Arc;
use std::thread;

/// Benchmark workers of one metricset recording into a shared bucket
fn bench_shared_bucket_varying_threads(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_bucket");

    for thread_count in [1, 2, 4, 8, 16].iter() {
        group.throughput(Throughput::Elements(*thread_count as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::new("threads", thread_count),
            thread_count,
            |b, &thread_count| {
                b.iter(|| {
                    let stats = Arc::new(Stats::new());
                    let counters = stats.metricset("bench", "status");

                    let mut handles_vec = vec![];
                    for _ in 0..thread_count {
                        let counters = Arc::clone(&counters);
                        handles_vec.push(thread::spawn(move || {
                            for _ in 0..1000 {
                                counters.record_success();
                                counters.record_events(black_box(1));
                            }
                        }));
                    }

                    for join_handle in handles_vec {
                        join_handle.join().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark bucket lookup on the read-mostly fast path
fn bench_bucket_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_lookup");

    for bucket_count in [1, 10, 100].iter() {
        let stats = Stats::new();
        for i in 0..*bucket_count {
            stats.metricset("bench", &format!("set-{}", i));
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(bucket_count),
            bucket_count,
            |b, &bucket_count| {
                let name = format!("set-{}", bucket_count / 2);
                b.iter(|| stats.metricset(black_box("bench"), black_box(&name)));
            },
        );
    }
    group.finish();
}

/// Benchmark snapshot collection while buckets exist
fn bench_snapshot(c: &mut Criterion) {
    let stats = Stats::new();
    for module in 0..10 {
        for set in 0..10 {
            let counters = stats.metricset(&format!("module-{}", module), &format!("set-{}", set));
            counters.record_success();
            counters.record_events(3);
        }
    }

    c.bench_function("snapshot_100_buckets", |b| b.iter(|| black_box(stats.snapshot())));
}

criterion_group!(
    benches,
    bench_shared_bucket_varying_threads,
    bench_bucket_lookup,
    bench_snapshot
);
criterion_main!(benches);
