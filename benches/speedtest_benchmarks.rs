use criterion::{Criterion, black_box, criterion_group, criterion_main};
use speedprobe::speedtest::counter::RateCounter;
use speedprobe::speedtest::formatting::format_rate;
use speedprobe::speedtest::probe::jitter_from_samples;

/// Benchmark the jitter computation over realistic sample windows
fn benchmark_jitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("jitter");

    let small: Vec<f64> = (0..12).map(|i| 20.0 + (i % 3) as f64).collect();
    group.bench_function("twelve_samples", |b| {
        b.iter(|| black_box(jitter_from_samples(black_box(&small))));
    });

    let large: Vec<f64> = (0..1000).map(|i| 20.0 + ((i * 7) % 13) as f64).collect();
    group.bench_function("thousand_samples", |b| {
        b.iter(|| black_box(jitter_from_samples(black_box(&large))));
    });

    group.finish();
}

/// Benchmark counter mutation, the hot path of every transfer stream
fn benchmark_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_counter");

    group.bench_function("record", |b| {
        let counter = RateCounter::new();
        counter.start();
        b.iter(|| counter.record(black_box(16 * 1024)));
    });

    group.bench_function("next_chunk_cyclic", |b| {
        let counter = RateCounter::new();
        counter.generate_payload(1024);
        b.iter(|| black_box(counter.next_chunk(black_box(64 * 1024))));
    });

    group.bench_function("avg_mbps", |b| {
        let counter = RateCounter::new();
        counter.start();
        counter.record(10_000_000);
        b.iter(|| black_box(counter.avg_mbps()));
    });

    group.finish();
}

/// Benchmark rate formatting across the unit ladder
fn benchmark_formatting(c: &mut Criterion) {
    let mut group = c.benchmark_group("formatting");

    group.bench_function("format_rate_ladder", |b| {
        b.iter(|| {
            for rate in [512.0, 1_500_000.0, 2_000_000_000.0] {
                black_box(format_rate(black_box(rate), false, false));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_jitter,
    benchmark_counter,
    benchmark_formatting
);
criterion_main!(benches);
