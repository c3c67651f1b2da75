//! Benchmark for chunk generation performance.
//!
//! Run with: cargo bench --package geode_procedural --bench chunk_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use geode_procedural::{ChunkCoord, GenerationParams, StaticRegistry, TerrainGenerator, WorldSeed};

fn generator(params: GenerationParams) -> TerrainGenerator {
    TerrainGenerator::new(WorldSeed::new(42), params, Arc::new(StaticRegistry::new()))
}

fn benchmark_single_chunk(c: &mut Criterion) {
    let full = generator(GenerationParams::default());
    let bare = generator(GenerationParams::bare());

    let mut group = c.benchmark_group("single_chunk");
    group.bench_function("full_pipeline", |b| {
        let mut coord = 0i32;
        b.iter(|| {
            coord = coord.wrapping_add(1);
            black_box(full.generate(ChunkCoord::new(coord, coord / 2)))
        });
    });
    group.bench_function("heightmap_and_fill_only", |b| {
        let mut coord = 0i32;
        b.iter(|| {
            coord = coord.wrapping_add(1);
            black_box(bare.generate(ChunkCoord::new(coord, coord / 2)))
        });
    });
    group.finish();
}

fn benchmark_view_radius(c: &mut Criterion) {
    let gen = generator(GenerationParams::default());

    // Radius-4 square around the origin
    let mut group = c.benchmark_group("view_radius");
    group.sample_size(10);
    group.throughput(Throughput::Elements(9 * 9));
    group.bench_function("9x9_chunks", |b| {
        b.iter(|| {
            for z in -4..=4 {
                for x in -4..=4 {
                    black_box(gen.generate(ChunkCoord::new(x, z)));
                }
            }
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_single_chunk, benchmark_view_radius);
criterion_main!(benches);
