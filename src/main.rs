//! IsoCity procgen - headless generation run.
//!
//! Grows a road network over a procedural heatmap, extracts city blocks and
//! parcels, then logs a summary.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --seed 7 --segments 5000 --curved

use bevy::log::LogPlugin;
use bevy::prelude::*;

use isocity_procgen::procgen::heatmap::{Heatmap, HeatmapConfig};
use isocity_procgen::procgen::road_generator::{ActiveHeatmap, RoadGenConfig, Straightness};
use isocity_procgen::{CityBlocks, GenerationError, ProcgenPlugin, RoadNetwork};

/// Frames to run; generation and extraction each finish within one.
const FRAMES: usize = 3;

fn arg_value(name: &str) -> Option<u64> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn main() -> Result<(), GenerationError> {
    let mut config = RoadGenConfig::default();
    if let Some(seed) = arg_value("--seed") {
        config = config.with_seed(seed);
    }
    if let Some(limit) = arg_value("--segments") {
        config = config.with_segment_limit(limit as usize);
    }
    if std::env::args().any(|a| a == "--curved") {
        config = config.with_straightness(Straightness::Curved);
    }

    let heatmap = Heatmap::procedural(
        &HeatmapConfig {
            seed: config.seed,
            ..Default::default()
        },
        config.region(),
    )?;

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default()))
        .insert_resource(config)
        .insert_resource(ActiveHeatmap(Some(heatmap)))
        .add_plugins(ProcgenPlugin);
    app.finish();
    app.cleanup();

    for _ in 0..FRAMES {
        app.update();
    }

    let world = app.world();
    let network = world.resource::<RoadNetwork>();
    let blocks = world.resource::<CityBlocks>();

    if let Err(err) = network.verify_links() {
        warn!("Road network failed link verification: {err}");
    }
    info!(
        "Generated {} segments, {} intersections, {} blocks, {} parcels",
        network.segment_count(),
        network.intersection_count(),
        blocks.blocks.len(),
        blocks.parcel_count()
    );

    Ok(())
}
