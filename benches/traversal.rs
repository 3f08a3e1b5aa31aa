//! Criterion benchmarks for coordinate generation.
//!
//! Coordinates are produced lazily inside the measurement loop, so generation
//! cost per point must stay negligible next to instrument I/O.
//!
//! Run with: cargo bench --bench traversal

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parspace::prelude::*;

fn grid(points_per_axis: usize, dims: usize) -> Vec<Axis> {
    (0..dims)
        .map(|i| Axis::new(format!("a{i}"), 0.0, (points_per_axis - 1) as f64, 1.0))
        .collect()
}

/// Nested sweep over grids of growing size, with and without sweepback.
fn nested_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_sweep");

    for (points, dims) in [(100, 2), (20, 3), (10, 4)] {
        let axes = grid(points, dims);
        let total = points.pow(dims as u32);
        group.throughput(Throughput::Elements(total as u64));

        for sweepback in [false, true] {
            let strategy = Strategy::Sweep { sweepback };
            group.bench_with_input(
                BenchmarkId::new(format!("sweepback={sweepback}"), format!("{points}^{dims}")),
                &axes,
                |b, axes| {
                    b.iter(|| {
                        let coordinates = strategy.coordinates(axes).unwrap();
                        black_box(coordinates.count())
                    })
                },
            );
        }
    }
    group.finish();
}

/// Hilbert curve at increasing depth over a single plane.
fn hilbert_curve(c: &mut Criterion) {
    let mut group = c.benchmark_group("hilbert");
    let axes = grid(2, 2);

    for n in [3u32, 5, 7] {
        group.throughput(Throughput::Elements(4u64.pow(n)));
        let strategy = Strategy::Hilbert { n, sweepback: false };
        group.bench_with_input(BenchmarkId::from_parameter(n), &axes, |b, axes| {
            b.iter(|| {
                let coordinates = strategy.coordinates(axes).unwrap();
                black_box(coordinates.count())
            })
        });
    }
    group.finish();
}

/// Time estimate for a deep nested sweep.
fn time_estimate(c: &mut Criterion) {
    let axes: Vec<Axis> = grid(50, 4)
        .into_iter()
        .map(|axis| axis.with_ramp(RampRate::new(0.1, 10.0)))
        .collect();
    let config = EstimatorConfig::default();
    c.bench_function("estimate_sweep_4d", |b| {
        b.iter(|| black_box(estimate(&axes, &Strategy::Sweep { sweepback: true }, &config)))
    });
}

criterion_group!(benches, nested_sweep, hilbert_curve, time_estimate);
criterion_main!(benches);
