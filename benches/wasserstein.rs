use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use wasserstein_flow::{wasserstein_distance, Field2, Method, WassersteinOptions};

fn dirac(shape: (usize, usize), at: (usize, usize)) -> Field2 {
    let mut data = vec![0.0; shape.0 * shape.1];
    data[at.0 * shape.1 + at.1] = 1.0;
    Field2::from_vec(shape, data)
}

fn bench_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("wasserstein_distance");
    for &n in &[8usize, 16, 24] {
        let m1 = dirac((n, n), (0, 0));
        let m2 = dirac((n, n), (n - 1, n - 1));

        group.bench_with_input(BenchmarkId::new("newton", n), &n, |b, _| {
            b.iter(|| {
                wasserstein_distance(
                    &m1,
                    &m2,
                    (1.0, 1.0),
                    Method::Newton,
                    WassersteinOptions::default(),
                )
                .unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("bregman", n), &n, |b, _| {
            b.iter(|| {
                wasserstein_distance(
                    &m1,
                    &m2,
                    (1.0, 1.0),
                    Method::Bregman,
                    WassersteinOptions::default(),
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_methods);
criterion_main!(benches);
