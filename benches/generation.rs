//! Benchmarks for road growth and block extraction.

use bevy::math::DVec2;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use isocity_procgen::procgen::block_extractor::{extract_city_blocks, BlockConfig};
use isocity_procgen::procgen::heatmap::{Heatmap, HeatmapConfig, UniformDensity};
use isocity_procgen::procgen::quadtree::{Bounds, Quadtree};
use isocity_procgen::procgen::road_generator::{create_roads, generate_network, RoadGenConfig};

fn small_config() -> RoadGenConfig {
    RoadGenConfig::default()
        .with_region(DVec2::splat(-8000.0), DVec2::splat(8000.0))
        .with_segment_limit(2000)
}

fn bench_quadtree_insert(c: &mut Criterion) {
    c.bench_function("quadtree_insert_10000", |b| {
        b.iter(|| {
            let mut tree = Quadtree::new(Bounds::new(0.0, 0.0, 1000.0, 1000.0), 10, 10);
            for i in 0..10_000u32 {
                let x = f64::from(i % 100) * 10.0;
                let y = f64::from(i / 100) * 10.0;
                tree.insert(Bounds::new(x, y, 5.0, 5.0), i);
            }
            black_box(tree)
        })
    });
}

fn bench_grow_uniform(c: &mut Criterion) {
    let config = small_config();
    c.bench_function("grow_uniform_2000", |b| {
        b.iter(|| black_box(generate_network(&UniformDensity(0.5), &config)))
    });
}

fn bench_grow_heatmap(c: &mut Criterion) {
    let config = small_config();
    let heatmap = Heatmap::procedural(&HeatmapConfig::default(), config.region())
        .expect("default heatmap dimensions are valid");
    c.bench_function("grow_heatmap_2000", |b| {
        b.iter(|| black_box(create_roads(Some(&heatmap), &config)))
    });
}

fn bench_extract_blocks(c: &mut Criterion) {
    let network = generate_network(&UniformDensity(0.5), &small_config());
    let config = BlockConfig::default();
    c.bench_function("extract_blocks_2000", |b| {
        b.iter(|| black_box(extract_city_blocks(&network, &config)))
    });
}

criterion_group!(quadtree_benches, bench_quadtree_insert);
criterion_group!(
    generation_benches,
    bench_grow_uniform,
    bench_grow_heatmap,
    bench_extract_blocks
);
criterion_main!(quadtree_benches, generation_benches);
