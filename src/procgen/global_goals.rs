//! Proposals for new segments growing out of an accepted one.

use rand::Rng;

use super::heatmap::DensityField;
use super::math::{point_along_bearing, random_near_cubic};
use super::road_generator::RoadGenConfig;
use super::roads::{MetaInfo, RoadNetwork, Segment, SegmentId};

/// A pending segment waiting in the growth queue.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub segment: Segment,
    /// Accepted segment this one grows from; links are joined on acceptance.
    pub parent: Option<SegmentId>,
}

impl Candidate {
    pub fn seed(segment: Segment) -> Self {
        Self {
            segment,
            parent: None,
        }
    }
}

/// Propose continuations and branches for `previous`.
///
/// Severed segments end at another road and propose nothing.
pub fn generate<D, R>(
    previous: &Segment,
    network: &mut RoadNetwork,
    density: &D,
    config: &RoadGenConfig,
    rng: &mut R,
) -> Vec<Candidate>
where
    D: DensityField + ?Sized,
    R: Rng,
{
    if previous.meta.severed {
        return Vec::new();
    }

    let mut proposals = Vec::new();
    let carry = MetaInfo {
        severed: false,
        ..previous.meta
    };
    let branch_spread = config.straightness.branch_spread();
    let straight_spread = config.straightness.straight_spread();

    let propose = |network: &mut RoadNetwork, turn: f64, length: f64, delay: f64, meta: MetaInfo| {
        let id = network.allocate_segment_id();
        Segment::using_direction(
            id,
            previous.end,
            previous.dir() + turn,
            length,
            previous.t + 1.0 + delay,
            config.segment_width(&meta),
            meta,
        )
    };
    let pop_towards = |turn: f64| {
        let end = point_along_bearing(previous.end, previous.dir() + turn, previous.length());
        density.pop_on_road(previous.end, end)
    };

    let straight_pop = pop_towards(0.0);

    if previous.meta.highway {
        let mut best_turn = 0.0;
        let mut max_pop = straight_pop;

        for _ in 0..config.highway_population_sample_size {
            let turn = random_near_cubic(rng, straight_spread);
            let pop = pop_towards(turn);
            if pop > max_pop {
                max_pop = pop;
                best_turn = turn;
            }
        }
        proposals.push(propose(network, best_turn, previous.length(), 0.0, carry));

        if max_pop > config.highway_branch_population_threshold {
            for side in [-90.0, 90.0] {
                if rng.gen::<f64>() < config.highway_branch_probability {
                    let turn = side + random_near_cubic(rng, branch_spread);
                    proposals.push(propose(network, turn, previous.length(), 0.0, carry));
                }
            }
        }
    } else if straight_pop > config.normal_branch_population_threshold {
        proposals.push(propose(network, 0.0, previous.length(), 0.0, carry));
    }

    if !config.only_highways && straight_pop > config.normal_branch_population_threshold {
        let delay = if previous.meta.highway {
            config.normal_branch_time_delay_from_highway
        } else {
            0.0
        };
        for side in [-90.0, 90.0] {
            if rng.gen::<f64>() < config.default_branch_probability {
                let turn = side + random_near_cubic(rng, branch_spread);
                proposals.push(propose(
                    network,
                    turn,
                    config.default_segment_length,
                    delay,
                    MetaInfo::street(),
                ));
            }
        }
    }

    proposals
        .into_iter()
        .map(|segment| Candidate {
            segment,
            parent: Some(previous.id),
        })
        .collect()
}

/// Join an accepted branch to its parent and to every sibling already
/// leaving the parent's end.
pub fn setup_branch_links(network: &mut RoadNetwork, branch: SegmentId, parent: SegmentId) {
    let siblings = match network.segment(parent) {
        Some(p) => p.links_f.clone(),
        None => panic!("parent segment {parent} of branch {branch} is not in the network"),
    };

    for &sibling in &siblings {
        network.push_link_beside(sibling, parent, branch);
    }

    let Some(b) = network.segment_mut(branch) else {
        panic!("branch segment {branch} is not in the network");
    };
    b.links_b.extend(siblings);
    b.links_b.push(parent);

    if let Some(p) = network.segment_mut(parent) {
        p.links_f.push(branch);
    }
}
