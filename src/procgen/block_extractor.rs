//! City block extraction from the road network.
//!
//! The segment arena is turned into a planar graph whose vertices are
//! intersections, closed polygons are traced in it, and each polygon becomes
//! a [`Block`] of subdivided parcels.

use std::collections::BTreeMap;

use bevy::math::DVec2;
use bevy::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

use super::cycles::DEFAULT_MAX_CYCLE_DEPTH;
use super::graph::{Graph, GraphVertex};
use super::lot_geometry::{ensure_ccw, is_convex};
use super::parcels::{Block, Parcel, SubdivisionConfig, VertexIds};
use super::road_generator::RoadsGenerated;
use super::roads::{End, RoadNetwork};

pub struct BlockExtractorPlugin;

impl Plugin for BlockExtractorPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CityBlocks>()
            .init_resource::<BlockConfig>()
            .add_systems(Update, extract_blocks.run_if(should_extract_blocks));
    }
}

fn should_extract_blocks(
    generated: Res<RoadsGenerated>,
    network: Res<RoadNetwork>,
    blocks: Res<CityBlocks>,
) -> bool {
    generated.0 && (!blocks.extracted || network.is_changed())
}

/// Which closed walks become blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockSource {
    /// Minimal counter-clockwise faces.
    #[default]
    Faces,
    /// Chordless cycles, reoriented counter-clockwise.
    ChordlessCycles,
}

/// Configuration for block extraction.
#[derive(Resource, Clone, Debug)]
pub struct BlockConfig {
    pub source: BlockSource,
    /// Skip blocks that are not convex.
    pub convex_only: bool,
    /// Remove dead-end streets before tracing blocks.
    pub prune_dead_ends: bool,
    /// Distance every block edge is pulled back from the road centreline.
    pub road_inset: f64,
    /// Corners never come closer than this to the block's OBB centre.
    pub inset_limit: f64,
    /// Corners sharper than this many degrees are chamfered.
    pub acute_angle: f64,
    /// Chamfers shorter than this drop the corner instead.
    pub min_chamfer_length: f64,
    pub subdivide: bool,
    pub subdivision: SubdivisionConfig,
    pub max_cycle_depth: usize,
    pub seed: u64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            source: BlockSource::Faces,
            convex_only: false,
            prune_dead_ends: true,
            road_inset: 20.0,
            inset_limit: 5.0,
            acute_angle: 20.0,
            min_chamfer_length: 2.0,
            subdivide: true,
            subdivision: SubdivisionConfig {
                min_area: 2500.0,
                ..Default::default()
            },
            max_cycle_depth: DEFAULT_MAX_CYCLE_DEPTH,
            seed: 12345,
        }
    }
}

/// Extracted blocks and the graph they were traced in.
#[derive(Resource, Clone, Debug, Default)]
pub struct CityBlocks {
    pub graph: Graph<GraphVertex>,
    /// Vertex id loops, one per block before insetting.
    pub faces: Vec<Vec<u32>>,
    pub blocks: Vec<Block>,
    pub extracted: bool,
}

impl CityBlocks {
    pub fn parcel_count(&self) -> usize {
        self.blocks.iter().map(|b| b.parcels.len()).sum()
    }

    pub fn flagged_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| b.parcels.iter())
            .filter(|p| p.flag)
            .count()
    }
}

fn extract_blocks(
    network: Res<RoadNetwork>,
    config: Res<BlockConfig>,
    mut blocks: ResMut<CityBlocks>,
) {
    info!("Extracting city blocks...");
    *blocks = extract_city_blocks(&network, &config);
    info!(
        "Found {} city blocks, {} parcels ({} flagged)",
        blocks.blocks.len(),
        blocks.parcel_count(),
        blocks.flagged_count()
    );
}

/// Build the planar road graph.
///
/// Intersections keep their ids. Segment ends without an intersection get a
/// synthetic vertex shared by every segment ending at the same point, so a
/// straight continuation or a dead end still has a vertex.
pub fn make_graph(network: &RoadNetwork) -> Graph<GraphVertex> {
    let mut graph = Graph::new();
    for intersection in network.intersections.values() {
        graph.add_node(
            intersection.id,
            GraphVertex::new(intersection.id, intersection.position),
        );
    }

    let mut next_id = network.intersections.keys().max().map_or(0, |&m| m + 1);
    let key = |p: DVec2| (p.x.to_bits(), p.y.to_bits());
    let mut junctions: BTreeMap<(u64, u64), u32> = network
        .intersections
        .values()
        .map(|i| (key(i.position), i.id))
        .collect();

    for segment in network.segments.values() {
        let mut ends = [0; 2];
        for (slot, end) in ends.iter_mut().zip([End::Start, End::End]) {
            if let Some(id) = segment.intersection(end).filter(|&id| graph.contains_node(id)) {
                *slot = id;
                continue;
            }
            let p = segment.point(end);
            *slot = *junctions.entry(key(p)).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                graph.add_node(id, GraphVertex::new(id, p));
                id
            });
        }
        if ends[0] != ends[1] {
            graph.add_edge(ends[0], ends[1]);
        }
    }

    graph
}

/// Trace blocks in the road network and subdivide them into parcels.
pub fn extract_city_blocks(network: &RoadNetwork, config: &BlockConfig) -> CityBlocks {
    let mut graph = make_graph(network);
    if config.prune_dead_ends {
        let pruned = graph.prune_dangling();
        debug!("Pruned {pruned} dead-end vertices from the block graph");
    }

    let loops = match config.source {
        BlockSource::Faces => graph.find_faces().to_vec(),
        BlockSource::ChordlessCycles => {
            let mut cycles = graph.chordless_cycles(config.max_cycle_depth);
            for cycle in &mut cycles {
                let positions = graph.face_positions(cycle);
                ensure_ccw(cycle, &positions);
            }
            cycles
        }
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut faces = Vec::new();
    let mut blocks = Vec::new();

    for face in loops {
        let vertices: Vec<GraphVertex> = face
            .iter()
            .filter_map(|&id| graph.meta(id).copied())
            .collect();
        let positions: Vec<DVec2> = vertices.iter().map(|v| v.position).collect();
        if config.convex_only && !is_convex(&positions) {
            continue;
        }

        let Some(block) = block_from_face(vertices, config, &mut rng) else {
            debug!("Dropped block {face:?}: it vanished while insetting");
            continue;
        };
        faces.push(face);
        blocks.push(block);
    }

    CityBlocks {
        graph,
        faces,
        blocks,
        extracted: true,
    }
}

/// Square sharp corners, pull the edges back from the roads and subdivide.
fn block_from_face(vertices: Vec<GraphVertex>, config: &BlockConfig, rng: &mut StdRng) -> Option<Block> {
    let mut ids = VertexIds::starting_after(vertices.iter().map(|v| v.id));
    let mut parcel = Parcel::new(vertices);

    parcel.square_acute_angles(config.acute_angle, config.min_chamfer_length, &mut ids);
    parcel.inset(config.road_inset, config.inset_limit, &mut ids);
    if parcel.flag || parcel.face.len() < 3 {
        return None;
    }

    let mut block = Block::new(parcel);
    if config.subdivide {
        block.subdivide_parcels(&config.subdivision, rng);
    }
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procgen::heatmap::UniformDensity;
    use crate::procgen::intersections::build_intersections;
    use crate::procgen::math::segment_intersection;
    use crate::procgen::road_generator::{generate_network, RoadGenConfig};
    use crate::procgen::roads::{Intersection, MetaInfo, Segment};

    /// Streets on a 3x3 lattice with `spacing` between them, linked at every
    /// shared endpoint and with intersections built.
    fn lattice_network(spacing: f64) -> RoadNetwork {
        let mut network = RoadNetwork::default();
        let p = |i: u32, j: u32| DVec2::new(i as f64 * spacing, j as f64 * spacing);
        let mut pieces = Vec::new();
        for j in 0..3 {
            for i in 0..2 {
                pieces.push((p(i, j), p(i + 1, j)));
                pieces.push((p(j, i), p(j, i + 1)));
            }
        }
        for (start, end) in pieces {
            let id = network.allocate_segment_id();
            network.insert_segment(Segment::new(id, start, end, 0.0, 6.0, MetaInfo::street()));
        }

        let ends: Vec<(u32, DVec2, DVec2)> = network
            .segments
            .values()
            .map(|s| (s.id, s.start, s.end))
            .collect();
        for &(a, a_start, a_end) in &ends {
            for &(b, b_start, b_end) in &ends {
                if a == b {
                    continue;
                }
                for (end, point) in [(End::Start, a_start), (End::End, a_end)] {
                    if point == b_start || point == b_end {
                        network.segment_mut(a).unwrap().links_mut(end).push(b);
                    }
                }
            }
        }
        network.verify_links().unwrap();
        build_intersections(&mut network, 20.0);
        network
    }

    fn plain_config() -> BlockConfig {
        BlockConfig {
            road_inset: 0.0,
            subdivide: false,
            ..Default::default()
        }
    }

    #[test]
    fn lattice_graph_has_nine_vertices() {
        let network = lattice_network(100.0);
        let graph = make_graph(&network);
        assert_eq!(graph.node_count(), 9);
        assert_eq!(graph.edge_count(), 12);
        graph.verify_symmetry().unwrap();
    }

    #[test]
    fn lattice_yields_four_blocks() {
        let network = lattice_network(100.0);
        let blocks = extract_city_blocks(&network, &plain_config());

        assert!(blocks.extracted);
        assert_eq!(blocks.blocks.len(), 4);
        assert_eq!(blocks.faces.len(), 4);
        for block in &blocks.blocks {
            assert!((block.area() - 10_000.0).abs() < 1e-6);
            assert_eq!(block.parcels.len(), 1);
        }
    }

    #[test]
    fn chordless_source_matches_faces_on_a_lattice() {
        let network = lattice_network(100.0);
        let config = BlockConfig {
            source: BlockSource::ChordlessCycles,
            max_cycle_depth: 4,
            ..plain_config()
        };
        let blocks = extract_city_blocks(&network, &config);
        assert_eq!(blocks.blocks.len(), 4);
        for block in &blocks.blocks {
            assert!(block.area() > 0.0);
        }
    }

    #[test]
    fn blocks_are_inset_and_subdivided() {
        let network = lattice_network(100.0);
        let config = BlockConfig {
            subdivision: SubdivisionConfig {
                min_area: 1000.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let blocks = extract_city_blocks(&network, &config);

        assert_eq!(blocks.blocks.len(), 4);
        for block in &blocks.blocks {
            // 100 wide, pulled back 20 on each side.
            assert!((block.area() - 3600.0).abs() < 1e-6);
            assert!(block.valid_parcels().count() >= 4);
            assert!(block.valid_parcels().all(|p| p.obb.area() <= 1000.0 + 1e-6));
        }
    }

    #[test]
    fn dead_ends_do_not_break_blocks() {
        let mut network = lattice_network(100.0);
        let id = network.allocate_segment_id();
        let spur = Segment::new(
            id,
            DVec2::new(100.0, 100.0),
            DVec2::new(150.0, 150.0),
            0.0,
            6.0,
            MetaInfo::street(),
        );
        network.insert_segment(spur);

        let blocks = extract_city_blocks(&network, &plain_config());
        assert_eq!(blocks.blocks.len(), 4);
        assert_eq!(blocks.graph.node_count(), 9);
    }

    #[test]
    fn unlinked_ends_share_a_junction_vertex() {
        let mut network = RoadNetwork::default();
        let junction = network.allocate_intersection_id();
        network.insert_intersection(Intersection {
            id: junction,
            position: DVec2::new(20.0, 0.0),
            branches: vec![],
        });
        for (start, end) in [
            (DVec2::ZERO, DVec2::new(10.0, 0.0)),
            (DVec2::new(10.0, 0.0), DVec2::new(20.0, 0.0)),
        ] {
            let id = network.allocate_segment_id();
            network.insert_segment(Segment::new(id, start, end, 0.0, 6.0, MetaInfo::street()));
        }

        let graph = make_graph(&network);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        // The end at (20, 0) lands on the existing intersection.
        assert_eq!(graph.degree(junction), 1);
        assert!(graph.node_ids().filter(|&id| id != junction).all(|id| id > junction));
    }

    #[test]
    fn grown_road_graph_is_planar() {
        let config = RoadGenConfig {
            segment_count_limit: 300,
            ..Default::default()
        }
        .with_region(DVec2::splat(-6000.0), DVec2::splat(6000.0));
        assert!(config.merge_intersections);
        let network = generate_network(&UniformDensity(0.6), &config);

        let graph = make_graph(&network);
        let edges: Vec<(DVec2, DVec2)> = graph
            .edges()
            .into_iter()
            .filter_map(|(a, b)| Some((graph.position(a)?, graph.position(b)?)))
            .collect();
        assert!(edges.len() > 10);
        for (i, &(a1, a2)) in edges.iter().enumerate() {
            for &(b1, b2) in &edges[i + 1..] {
                assert!(
                    segment_intersection(a1, a2, b1, b2, true).is_none(),
                    "edges {a1}-{a2} and {b1}-{b2} cross"
                );
            }
        }

        let blocks = extract_city_blocks(&network, &BlockConfig::default());
        for block in &blocks.blocks {
            let parcels: f64 = block.parcels.iter().map(|p| p.area()).sum();
            assert!(
                (parcels - block.area()).abs() <= 1e-6 * block.area().max(1.0),
                "parcels cover {parcels}, block {}",
                block.area()
            );
        }
    }
}
