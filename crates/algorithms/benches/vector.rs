//! Benchmarks for the overlay operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geo::{point, polygon};
use geoverlay_algorithms::vector::{buffer, spatial_join, union};
use geoverlay_core::{Feature, OperationOptions};

/// A row of overlapping squares, each shifted by half its width
fn overlapping_squares(n: usize) -> Vec<Feature> {
    (0..n)
        .map(|i| {
            let x0 = i as f64 * 0.005;
            Feature::new(polygon![
                (x: x0, y: 0.0),
                (x: x0 + 0.01, y: 0.0),
                (x: x0 + 0.01, y: 0.01),
                (x: x0, y: 0.01),
                (x: x0, y: 0.0),
            ])
        })
        .collect()
}

/// Regular grid of points covering roughly the same extent
fn point_grid(side: usize, extent: f64) -> Vec<Feature> {
    let step = extent / side as f64;
    (0..side * side)
        .map(|i| {
            let x = (i % side) as f64 * step;
            let y = (i / side) as f64 * step;
            Feature::new(point!(x: x, y: y))
        })
        .collect()
}

fn bench_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("union");
    let options = OperationOptions::default();

    for n in [4, 16, 64].iter() {
        let features = overlapping_squares(*n);
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, _| {
            b.iter(|| union(black_box(&features), &options).unwrap())
        });
    }

    group.finish();
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");
    let options = OperationOptions::default();

    for n in [10, 100, 1000].iter() {
        let points = point_grid((*n as f64).sqrt().ceil() as usize, 1.0);
        group.bench_with_input(BenchmarkId::new("points", n), n, |b, _| {
            b.iter(|| buffer(black_box(&points), 500.0, &options).unwrap())
        });
    }

    let squares = overlapping_squares(32);
    group.bench_function("polygons_32", |b| {
        b.iter(|| buffer(black_box(&squares), 250.0, &options).unwrap())
    });

    group.finish();
}

fn bench_spatial_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_join");
    let options = OperationOptions::default();
    let polygons = overlapping_squares(16);

    for side in [10, 50, 100].iter() {
        let points = point_grid(*side, 0.09);
        group.bench_with_input(BenchmarkId::from_parameter(side * side), side, |b, _| {
            b.iter(|| spatial_join(black_box(&points), &polygons, &options).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_union, bench_buffer, bench_spatial_join);
criterion_main!(benches);
