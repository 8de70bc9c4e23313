//! Chunk generation benchmarks.
//!
//! Run with: cargo bench --package strata-world --bench generation

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use strata_common::ChunkCoord;
use strata_world::{BiomeMap, ChunkGenerator};

fn benchmark_single_chunk(c: &mut Criterion) {
    let generator = ChunkGenerator::with_seed(42);

    c.bench_function("noise_chunk_generation", |b| {
        let mut x = 0i32;
        b.iter(|| {
            x = x.wrapping_add(1);
            black_box(generator.generate(ChunkCoord::new(x, 2)))
        });
    });
}

fn benchmark_chunk_batch(c: &mut Criterion) {
    let generator = ChunkGenerator::with_seed(42);
    let coords: Vec<_> = (0..8)
        .flat_map(|y| (0..8).map(move |x| ChunkCoord::new(x, y)))
        .collect();

    let mut group = c.benchmark_group("chunk_batch");
    group.throughput(Throughput::Elements(coords.len() as u64));
    group.sample_size(20);

    group.bench_function("8x8_serial", |b| {
        b.iter(|| {
            for &coord in &coords {
                black_box(generator.generate(coord));
            }
        });
    });

    group.bench_function("8x8_parallel", |b| {
        b.iter(|| black_box(generator.generate_many(&coords)));
    });

    group.finish();
}

fn benchmark_surface_heights(c: &mut Criterion) {
    let biomes = BiomeMap::new(42);

    c.bench_function("surface_heights_32", |b| {
        let mut start = 0i64;
        b.iter(|| {
            start += 32;
            black_box(biomes.surface_heights(start, 32))
        });
    });
}

criterion_group!(
    benches,
    benchmark_single_chunk,
    benchmark_chunk_batch,
    benchmark_surface_heights
);
criterion_main!(benches);
