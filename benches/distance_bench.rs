//! Benchmarks for the distance kernels (C1).
//!
//! Run with: `cargo bench --bench distance_bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use degraph::metric::{DistanceSpace, Metric};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

fn generate_vectors(count: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn bench_l2(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_f32");
    for dims in [32, 128, 768] {
        let vectors = generate_vectors(2, dims, 42);
        let space = DistanceSpace::new(Metric::L2F32, dims);
        let a: &[u8] = bytemuck::cast_slice(&vectors[0]);
        let b: &[u8] = bytemuck::cast_slice(&vectors[1]);

        group.throughput(Throughput::Elements(dims as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dims), &dims, |bencher, _| {
            bencher.iter(|| space.distance(black_box(a), black_box(b)));
        });
    }
    group.finish();
}

fn bench_dot(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot_f32");
    for dims in [32, 128, 768] {
        let vectors = generate_vectors(2, dims, 42);
        let space = DistanceSpace::new(Metric::DotF32, dims);
        let a: &[u8] = bytemuck::cast_slice(&vectors[0]);
        let b: &[u8] = bytemuck::cast_slice(&vectors[1]);

        group.throughput(Throughput::Elements(dims as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dims), &dims, |bencher, _| {
            bencher.iter(|| space.distance(black_box(a), black_box(b)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_l2, bench_dot);
criterion_main!(benches);
