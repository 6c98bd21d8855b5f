//! IsoCity procgen - road networks, city blocks and parcels.
//!
//! Roads grow from a population heatmap, the resulting planar graph is cut
//! into city blocks, and every block is subdivided into building parcels.

pub mod procgen;

pub use procgen::block_extractor::{extract_city_blocks, BlockConfig, CityBlocks};
pub use procgen::error::{GenerationError, TopologyError};
pub use procgen::heatmap::{Heatmap, HeatmapConfig};
pub use procgen::road_generator::{create_roads, RoadGenConfig, Straightness};
pub use procgen::roads::RoadNetwork;
pub use procgen::ProcgenPlugin;
