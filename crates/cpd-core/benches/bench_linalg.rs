use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use cpd_core::{linalg, transforms};

fn bench_transform_points(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_points");

    let rotation = transforms::axis_angle_to_rotation_matrix(&[0.2, 1.0, 0.4], 0.7).unwrap();
    let translation = faer::col![0.1, -0.3, 2.0];

    for num_points in [1_000, 10_000, 100_000].iter() {
        let points = faer::Mat::<f64>::from_fn(*num_points, 3, |i, j| ((i * 3 + j) as f64).sin());

        group.bench_with_input(
            BenchmarkId::new("faer_matmul", num_points),
            &points,
            |b, points| {
                b.iter(|| {
                    black_box(linalg::transform_points(
                        points.as_ref(),
                        rotation.as_ref(),
                        1.5,
                        translation.as_ref(),
                    ))
                });
            },
        );
    }
}

fn bench_sum_squared_distances(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum_squared_distances");

    let x = faer::Mat::<f64>::from_fn(5_000, 3, |i, j| ((i + j) as f64).cos());
    let y = faer::Mat::<f64>::from_fn(4_000, 3, |i, j| ((i * j) as f64).sin());

    group.bench_function(BenchmarkId::new("closed_form", ""), |b| {
        b.iter(|| black_box(linalg::sum_squared_distances(x.as_ref(), y.as_ref())));
    });
}

criterion_group!(benches, bench_transform_points, bench_sum_squared_distances);
criterion_main!(benches);
