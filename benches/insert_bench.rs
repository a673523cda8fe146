//! Benchmarks for incremental insertion via the builder (C8).
//!
//! Run with: `cargo bench --bench insert_bench`

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use degraph::builder::{Builder, BuilderConfig};
use degraph::graph::Graph;
use degraph::metric::Metric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const DIM: usize = 32;
const CAPACITY: usize = 20_000;

fn random_feature(rng: &mut ChaCha8Rng) -> Vec<u8> {
    let values: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
    bytemuck::cast_slice(&values).to_vec()
}

fn default_config() -> BuilderConfig {
    BuilderConfig {
        k_ext: 32,
        eps_ext: 0.1,
        k_opt: 16,
        eps_opt: 0.1,
        i_opt: 5,
        swap_tries: 3,
        additional_swap_tries: 3,
        use_rng: true,
    }
}

fn bench_extension(c: &mut Criterion) {
    let mut group = c.benchmark_group("extend");
    for insert_count in [100usize, 500] {
        group.bench_with_input(
            BenchmarkId::from_parameter(insert_count),
            &insert_count,
            |bencher, &insert_count| {
                bencher.iter_batched(
                    || {
                        let graph = Graph::new(CAPACITY, 16, Metric::L2F32, DIM).unwrap();
                        let mut builder = Builder::new(graph, 3, default_config());
                        let mut rng = ChaCha8Rng::seed_from_u64(11);
                        for label in 0..insert_count as u32 {
                            builder.add_entry(label, random_feature(&mut rng));
                        }
                        builder
                    },
                    |mut builder| {
                        builder.build(|_, _| {}, false).unwrap();
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_extension);
criterion_main!(benches);
