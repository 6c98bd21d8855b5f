//! Road network growth driven by a population heatmap.
//!
//! Creates city road layouts by:
//! 1. Seeding one or two highway segments at the origin
//! 2. Resolving each queued candidate against nearby roads
//! 3. Proposing continuations and branches from every accepted segment
//! 4. Detecting, pruning and merging intersections once growth stops

use bevy::math::DVec2;
use bevy::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

use super::error::GenerationError;
use super::global_goals::{self, setup_branch_links, Candidate};
use super::heatmap::{DensityField, Heatmap};
use super::intersections;
use super::local_constraints::{self, LocalAction};
use super::priority_queue::PriorityQueue;
use super::quadtree::{Bounds, Quadtree};
use super::roads::{MetaInfo, RoadNetwork, Segment, SegmentId};

/// How much roads wander when they continue or branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Straightness {
    Curved,
    #[default]
    Straight,
    VeryStraight,
}

impl Straightness {
    /// Limit in degrees for the random deviation added to ±90° branches.
    pub fn branch_spread(self) -> f64 {
        match self {
            Straightness::Curved => 5.0,
            Straightness::Straight => 3.0,
            Straightness::VeryStraight => 1.0,
        }
    }

    /// Limit in degrees for highway heading samples.
    pub fn straight_spread(self) -> f64 {
        match self {
            Straightness::Curved => 20.0,
            Straightness::Straight => 15.0,
            Straightness::VeryStraight => 3.0,
        }
    }
}

/// Configuration for road generation.
#[derive(Resource, Clone, Debug)]
pub struct RoadGenConfig {
    pub default_segment_length: f64,
    pub highway_segment_length: f64,
    pub default_segment_width: f64,
    pub highway_segment_width: f64,
    /// Chance of each perpendicular street branch.
    pub default_branch_probability: f64,
    /// Chance of each perpendicular highway branch.
    pub highway_branch_probability: f64,
    pub highway_branch_population_threshold: f64,
    pub normal_branch_population_threshold: f64,
    /// Extra time steps before streets branching off a highway are evaluated.
    pub normal_branch_time_delay_from_highway: f64,
    /// Random headings sampled per highway step.
    pub highway_population_sample_size: usize,
    /// Crossings flatter than this many degrees are rejected.
    pub minimum_intersection_deviation: f64,
    pub segment_count_limit: usize,
    pub road_snap_distance: f64,
    pub quadtree_max_objects: usize,
    pub quadtree_max_levels: usize,
    pub only_highways: bool,
    /// Accept every candidate without looking at its neighbours.
    pub ignore_conflicts: bool,
    /// Seed a second highway heading the opposite way.
    pub two_segments_initially: bool,
    pub start_with_normal_streets: bool,
    /// Minimum corner of the generation region.
    pub region_min: DVec2,
    /// Maximum corner of the generation region.
    pub region_max: DVec2,
    pub straightness: Straightness,
    pub seed: u64,
    /// A single continuation bending more than this many degrees becomes an intersection.
    pub intersection_link_angle: f64,
    /// Intersections closer than this are merged.
    pub roadpart_length: f64,
    pub merge_intersections: bool,
}

impl Default for RoadGenConfig {
    fn default() -> Self {
        Self {
            default_segment_length: 300.0,
            highway_segment_length: 400.0,
            default_segment_width: 6.0,
            highway_segment_width: 16.0,
            default_branch_probability: 0.4,
            highway_branch_probability: 0.02,
            highway_branch_population_threshold: 0.1,
            normal_branch_population_threshold: 0.1,
            normal_branch_time_delay_from_highway: 10.0,
            highway_population_sample_size: 1,
            minimum_intersection_deviation: 30.0,
            segment_count_limit: 20_000,
            road_snap_distance: 50.0,
            quadtree_max_objects: 10,
            quadtree_max_levels: 10,
            only_highways: false,
            ignore_conflicts: false,
            two_segments_initially: true,
            start_with_normal_streets: false,
            region_min: DVec2::splat(-20_000.0),
            region_max: DVec2::splat(20_000.0),
            straightness: Straightness::Straight,
            seed: 12345,
            intersection_link_angle: 20.0,
            roadpart_length: 20.0,
            merge_intersections: true,
        }
    }
}

impl RoadGenConfig {
    /// Size the region after two opposite corners. Generation is centred on
    /// the origin, so only the extents are kept.
    pub fn with_region(mut self, start: DVec2, end: DVec2) -> Self {
        let half = (end - start).abs() / 2.0;
        self.region_min = -half;
        self.region_max = half;
        self
    }

    pub fn with_straightness(mut self, straightness: Straightness) -> Self {
        self.straightness = straightness;
        self
    }

    pub fn with_segment_limit(mut self, limit: usize) -> Self {
        self.segment_count_limit = limit;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn region(&self) -> Bounds {
        Bounds::from_points(self.region_min, self.region_max)
    }

    pub fn segment_width(&self, meta: &MetaInfo) -> f64 {
        if meta.highway {
            self.highway_segment_width
        } else {
            self.default_segment_width
        }
    }
}

/// Heatmap consulted by the next generation run.
#[derive(Resource, Default)]
pub struct ActiveHeatmap(pub Option<Heatmap>);

/// Event to trigger road generation.
#[derive(Event)]
pub struct GenerateRoadsEvent;

/// Marker that roads have been generated.
#[derive(Resource, Default)]
pub struct RoadsGenerated(pub bool);

pub struct RoadGeneratorPlugin;

impl Plugin for RoadGeneratorPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RoadGenConfig>()
            .init_resource::<ActiveHeatmap>()
            .init_resource::<RoadNetwork>()
            .init_resource::<RoadsGenerated>()
            .add_event::<GenerateRoadsEvent>()
            .add_systems(Update, generate_roads_on_event)
            .add_systems(Startup, trigger_initial_generation);
    }
}

fn trigger_initial_generation(mut events: EventWriter<GenerateRoadsEvent>) {
    events.send(GenerateRoadsEvent);
}

fn generate_roads_on_event(
    mut events: EventReader<GenerateRoadsEvent>,
    heatmap: Res<ActiveHeatmap>,
    config: Res<RoadGenConfig>,
    mut network: ResMut<RoadNetwork>,
    mut generated: ResMut<RoadsGenerated>,
) {
    for _ in events.read() {
        info!("Generating road network...");

        match create_roads(heatmap.0.as_ref(), &config) {
            Ok(roads) => {
                *network = roads;
                generated.0 = true;
                info!(
                    "Road generation complete: {} segments, {} intersections",
                    network.segment_count(),
                    network.intersection_count()
                );
            }
            Err(err) => {
                error!("Road generation failed: {err}");
                generated.0 = false;
            }
        }
    }
}

/// Counters reported after growth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GrowthStats {
    pub accepted: usize,
    pub rejected: usize,
    pub intersections: usize,
    pub snaps: usize,
    pub radius_joins: usize,
}

impl GrowthStats {
    fn record(&mut self, action: &LocalAction) {
        match action {
            LocalAction::None => {}
            LocalAction::Intersect { .. } => self.intersections += 1,
            LocalAction::Snap { .. } => self.snaps += 1,
            LocalAction::Radius { .. } => self.radius_joins += 1,
        }
    }
}

/// Generate a road network over the heatmap, stretched over the configured region.
///
/// Fails without a heatmap or with an empty region; nothing is generated then.
pub fn create_roads(
    heatmap: Option<&Heatmap>,
    config: &RoadGenConfig,
) -> Result<RoadNetwork, GenerationError> {
    let heatmap = heatmap.ok_or(GenerationError::MissingHeatmap)?;
    let region = config.region();
    if region.width <= 0.0 || region.height <= 0.0 {
        return Err(GenerationError::EmptyRegion {
            width: region.width,
            height: region.height,
        });
    }

    let mut field = heatmap.clone();
    field.set_region(region);
    Ok(generate_network(&field, config))
}

/// Grow a network over any density field and tidy up its intersections.
pub fn generate_network<D: DensityField + ?Sized>(density: &D, config: &RoadGenConfig) -> RoadNetwork {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (mut network, stats) = grow_network(density, config, &mut rng);

    info!(
        "Grew {} segments ({} rejected): {} crossings, {} snaps, {} radius joins",
        network.segment_count(),
        stats.rejected,
        stats.intersections,
        stats.snaps,
        stats.radius_joins
    );

    finish_network(&mut network, config);
    network
}

/// Seed segments at the origin.
pub fn initial_segments(network: &mut RoadNetwork, config: &RoadGenConfig) -> Vec<Candidate> {
    let meta = MetaInfo {
        highway: !config.start_with_normal_streets,
        ..Default::default()
    };
    let width = config.segment_width(&meta);
    let length = config.highway_segment_length;

    let root_id = network.allocate_segment_id();
    let mut root = Segment::new(root_id, DVec2::ZERO, DVec2::new(length, 0.0), 0.0, width, meta);

    if !config.two_segments_initially {
        return vec![Candidate::seed(root)];
    }

    let opposite_id = network.allocate_segment_id();
    let mut opposite = Segment::new(
        opposite_id,
        root.start,
        DVec2::new(root.start.x - length, root.end.y),
        0.0,
        width,
        meta,
    );
    opposite.links_b.push(root_id);
    root.links_b.push(opposite_id);

    vec![Candidate::seed(root), Candidate::seed(opposite)]
}

/// Run the growth simulation until the queue drains or the segment limit is hit.
pub fn grow_network<D, R>(density: &D, config: &RoadGenConfig, rng: &mut R) -> (RoadNetwork, GrowthStats)
where
    D: DensityField + ?Sized,
    R: rand::Rng,
{
    let mut network = RoadNetwork::default();
    let mut stats = GrowthStats::default();
    let mut qtree: Quadtree<SegmentId> = Quadtree::new(
        config.region(),
        config.quadtree_max_objects,
        config.quadtree_max_levels,
    );
    let mut queue = PriorityQueue::new(|c: &Candidate| c.segment.t);
    queue.enqueue_all(initial_segments(&mut network, config));

    while network.segment_count() < config.segment_count_limit {
        let Some(Candidate { mut segment, parent }) = queue.dequeue() else {
            break;
        };

        let action = if config.ignore_conflicts {
            LocalAction::None
        } else {
            local_constraints::evaluate(&segment, &network, &qtree, config)
        };
        if !local_constraints::apply(action, &mut segment, &mut network, &mut qtree, config) {
            stats.rejected += 1;
            continue;
        }
        stats.record(&action);
        stats.accepted += 1;

        let id = segment.id;
        qtree.insert(segment.bounds(), id);
        network.insert_segment(segment);
        if let Some(parent) = parent {
            setup_branch_links(&mut network, id, parent);
        }

        let Some(accepted) = network.segment(id).cloned() else {
            continue;
        };
        for candidate in global_goals::generate(&accepted, &mut network, density, config, rng) {
            queue.enqueue(candidate);
        }
    }

    debug!("Spatial index holds {} segment boxes", qtree.len());
    (network, stats)
}

/// Post-growth intersection pass: detect, prune to region, dedupe, merge, order.
pub fn finish_network(network: &mut RoadNetwork, config: &RoadGenConfig) {
    let built = intersections::build_intersections(network, config.intersection_link_angle);
    let pruned = intersections::prune_outside_region(network, config.region());
    let duplicates = intersections::remove_duplicate_intersections(network);
    let merged = if config.merge_intersections {
        intersections::merge_close_intersections(network, config.roadpart_length)
    } else {
        0
    };
    intersections::assign_road_orders(network, config.intersection_link_angle);

    debug!(
        "Intersections: {} built, {} duplicates removed, {} merged; {} segments pruned outside region",
        built, duplicates, merged, pruned
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procgen::heatmap::UniformDensity;

    fn small_config() -> RoadGenConfig {
        RoadGenConfig {
            segment_count_limit: 300,
            ..Default::default()
        }
        .with_region(DVec2::new(-6000.0, -6000.0), DVec2::new(6000.0, 6000.0))
    }

    #[test]
    fn missing_heatmap_generates_nothing() {
        assert_eq!(
            create_roads(None, &RoadGenConfig::default()).unwrap_err(),
            GenerationError::MissingHeatmap
        );
    }

    #[test]
    fn empty_region_is_rejected() {
        let heatmap =
            Heatmap::from_raster(vec![128; 4], 2, 2, Bounds::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        let config = RoadGenConfig::default().with_region(DVec2::ZERO, DVec2::new(100.0, 0.0));
        assert!(matches!(
            create_roads(Some(&heatmap), &config),
            Err(GenerationError::EmptyRegion { .. })
        ));
    }

    #[test]
    fn region_is_centred_on_origin() {
        let config = RoadGenConfig::default().with_region(DVec2::new(100.0, 50.0), DVec2::new(-300.0, 250.0));
        assert_eq!(config.region_min, DVec2::new(-200.0, -100.0));
        assert_eq!(config.region_max, DVec2::new(200.0, 100.0));
    }

    #[test]
    fn seeds_point_in_opposite_directions() {
        let mut network = RoadNetwork::default();
        let seeds = initial_segments(&mut network, &RoadGenConfig::default());
        assert_eq!(seeds.len(), 2);
        let (a, b) = (&seeds[0].segment, &seeds[1].segment);
        assert!(a.meta.highway && b.meta.highway);
        assert_eq!(a.links_b.as_slice(), &[b.id]);
        assert_eq!(b.links_b.as_slice(), &[a.id]);
        assert!((a.dir() - 90.0).abs() < 1e-9);
        assert!((b.dir() + 90.0).abs() < 1e-9);
    }

    #[test]
    fn growth_keeps_links_symmetric() {
        let config = small_config();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let (network, stats) = grow_network(&UniformDensity(0.6), &config, &mut rng);

        assert!(network.segment_count() > 10);
        assert!(network.segment_count() <= config.segment_count_limit + 2);
        assert!(stats.accepted > 0);
        network.verify_links().unwrap();
    }

    #[test]
    fn generated_intersections_are_consistent() {
        let config = small_config();
        let network = generate_network(&UniformDensity(0.6), &config);

        assert!(network.intersection_count() > 0);
        network.verify_links().unwrap();
        network.verify_intersections().unwrap();
        let region = config.region();
        for s in network.segments.values() {
            assert!(region.contains_point(s.start) && region.contains_point(s.end));
        }
    }

    #[test]
    fn merged_intersections_stay_consistent_across_seeds() {
        for seed in 0..6 {
            let config = small_config().with_seed(seed);
            assert!(config.merge_intersections);
            let network = generate_network(&UniformDensity(0.6), &config);

            network.verify_links().unwrap();
            network.verify_intersections().unwrap();
            for i in network.intersections.values() {
                for b in &i.branches {
                    let s = &network.segments[b];
                    assert!(s.end_at(i.position).is_some(), "seed {seed}: branch {b} left behind");
                }
            }
        }
    }

    #[test]
    fn same_seed_same_network() {
        let config = small_config();
        let a = generate_network(&UniformDensity(0.6), &config);
        let b = generate_network(&UniformDensity(0.6), &config);
        assert_eq!(a.segments, b.segments);
    }

    #[test]
    fn only_highways_grow_without_streets() {
        let config = RoadGenConfig {
            only_highways: true,
            ..small_config()
        };
        let network = generate_network(&UniformDensity(0.6), &config);
        assert!(network.segments.values().all(|s| s.meta.highway));
    }
}
