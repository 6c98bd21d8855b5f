//! Procedural generation systems.
//!
//! - Heatmap-driven road growth with local constraints
//! - Planar face and chordless cycle extraction for city blocks
//! - OBB subdivision for parcels

use bevy::prelude::*;

pub mod block_extractor;
pub mod cycles;
pub mod error;
pub mod global_goals;
pub mod graph;
pub mod heatmap;
pub mod intersections;
pub mod local_constraints;
pub mod lot_geometry;
pub mod math;
pub mod parcels;
pub mod priority_queue;
pub mod quadtree;
pub mod road_generator;
pub mod roads;

pub struct ProcgenPlugin;

impl Plugin for ProcgenPlugin {
    fn build(&self, app: &mut App) {
        // Blocks are traced from the network the road generator leaves behind
        app.add_plugins(road_generator::RoadGeneratorPlugin)
            .add_plugins(block_extractor::BlockExtractorPlugin);
    }
}
