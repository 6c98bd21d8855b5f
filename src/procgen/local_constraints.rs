//! Conflict resolution between a candidate segment and the roads around it.
//!
//! [`evaluate`] inspects nearby segments and picks a single action without
//! touching the network. [`apply`] then performs it. The strongest action
//! wins: crossing another road, then snapping to a nearby road end, then
//! joining a nearby road's interior.

use bevy::math::DVec2;

use super::math::{bearing, distance_to_line, equal_points, min_degree_difference, segment_intersection};
use super::quadtree::Quadtree;
use super::road_generator::RoadGenConfig;
use super::roads::{End, RoadNetwork, Segment, SegmentId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocalAction {
    /// Nothing nearby; accept the candidate unchanged.
    None,
    /// The candidate crosses `other` at `t` along itself.
    Intersect {
        other: SegmentId,
        point: DVec2,
        t: f64,
    },
    /// The candidate's end lies near an endpoint of `other`.
    Snap {
        other: SegmentId,
        end: End,
        point: DVec2,
    },
    /// The candidate's end lies near the interior of `other`.
    Radius { other: SegmentId, point: DVec2 },
}

impl LocalAction {
    pub fn priority(&self) -> u8 {
        match self {
            LocalAction::None => 0,
            LocalAction::Radius { .. } => 2,
            LocalAction::Snap { .. } => 3,
            LocalAction::Intersect { .. } => 4,
        }
    }
}

/// Pick the action for `candidate`. Crossings keep the earliest hit along
/// the candidate, snaps and radius joins keep the nearest target.
pub fn evaluate(
    candidate: &Segment,
    network: &RoadNetwork,
    qtree: &Quadtree<SegmentId>,
    config: &RoadGenConfig,
) -> LocalAction {
    let snap = config.road_snap_distance;

    let mut nearby = qtree.retrieve(&candidate.bounds().expanded(snap));
    nearby.sort_unstable();
    nearby.dedup();

    let mut action = LocalAction::None;
    // Crossing parameter for priority 4, distance otherwise.
    let mut key = f64::INFINITY;

    for other in nearby.into_iter().filter_map(|id| network.segment(id)) {
        if other.id == candidate.id {
            continue;
        }

        if let Some(hit) =
            segment_intersection(candidate.start, candidate.end, other.start, other.end, true)
        {
            if action.priority() < 4 || hit.t < key {
                action = LocalAction::Intersect {
                    other: other.id,
                    point: hit.point,
                    t: hit.t,
                };
                key = hit.t;
            }
        }

        if action.priority() <= 3 {
            for end in [End::Start, End::End] {
                let point = other.point(end);
                let d = candidate.end.distance(point);
                if d <= snap && (action.priority() < 3 || d < key) {
                    action = LocalAction::Snap {
                        other: other.id,
                        end,
                        point,
                    };
                    key = d;
                }
            }
        }

        if action.priority() <= 2 {
            let r = distance_to_line(candidate.end, other.start, other.end);
            if r.distance2 < snap * snap && r.within_segment() {
                let d = r.distance2.sqrt();
                if action.priority() < 2 || d < key {
                    action = LocalAction::Radius {
                        other: other.id,
                        point: r.point_on_line,
                    };
                    key = d;
                }
            }
        }
    }

    action
}

/// Perform `action` on `candidate`. Returns false when the candidate must be dropped.
pub fn apply(
    action: LocalAction,
    candidate: &mut Segment,
    network: &mut RoadNetwork,
    qtree: &mut Quadtree<SegmentId>,
    config: &RoadGenConfig,
) -> bool {
    match action {
        LocalAction::None => true,
        LocalAction::Intersect { other, point, .. } => {
            if !crosses_steeply(candidate.dir(), other, network, config) {
                return false;
            }
            network.split(other, point, candidate, qtree);
            candidate.end = point;
            candidate.meta.severed = true;
            true
        }
        LocalAction::Snap { other, end, point } => snap_to(candidate, other, end, point, network),
        LocalAction::Radius { other, point } => {
            // The end moves onto `other`, so judge the joined direction.
            if !crosses_steeply(bearing(point - candidate.start), other, network, config) {
                return false;
            }
            let Some(target) = network.segment(other) else {
                return false;
            };
            // Joining exactly at an endpoint would leave a zero-length piece.
            if equal_points(target.start, point) || equal_points(target.end, point) {
                return false;
            }
            network.split(other, point, candidate, qtree);
            candidate.end = point;
            candidate.meta.severed = true;
            true
        }
    }
}

fn crosses_steeply(dir: f64, other: SegmentId, network: &RoadNetwork, config: &RoadGenConfig) -> bool {
    network
        .segment(other)
        .is_some_and(|o| min_degree_difference(o.dir(), dir) >= config.minimum_intersection_deviation)
}

fn snap_to(
    candidate: &mut Segment,
    other: SegmentId,
    end: End,
    point: DVec2,
    network: &mut RoadNetwork,
) -> bool {
    if equal_points(point, candidate.start) {
        return false;
    }
    let Some(target) = network.segment(other) else {
        return false;
    };

    let links = target.links(end).clone();
    let duplicate = target.connects(candidate.start, point)
        || links
            .iter()
            .filter_map(|l| network.segment(*l))
            .any(|l| l.connects(candidate.start, point));
    if duplicate {
        return false;
    }

    candidate.end = point;
    candidate.meta.severed = true;

    for link in links {
        network.push_link_beside(link, other, candidate.id);
        candidate.links_f.push(link);
    }
    if let Some(target) = network.segment_mut(other) {
        target.links_mut(end).push(candidate.id);
    }
    candidate.links_f.push(other);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procgen::quadtree::Bounds;
    use crate::procgen::roads::MetaInfo;

    struct Fixture {
        network: RoadNetwork,
        qtree: Quadtree<SegmentId>,
        config: RoadGenConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                network: RoadNetwork::default(),
                qtree: Quadtree::new(Bounds::new(-1000.0, -1000.0, 2000.0, 2000.0), 10, 10),
                config: RoadGenConfig::default(),
            }
        }

        fn add(&mut self, start: DVec2, end: DVec2) -> SegmentId {
            let id = self.network.allocate_segment_id();
            let s = Segment::new(id, start, end, 0.0, 6.0, MetaInfo::street());
            self.qtree.insert(s.bounds(), id);
            self.network.insert_segment(s);
            id
        }

        fn link(&mut self, a: SegmentId, a_end: End, b: SegmentId, b_end: End) {
            self.network.segment_mut(a).unwrap().links_mut(a_end).push(b);
            self.network.segment_mut(b).unwrap().links_mut(b_end).push(a);
        }

        fn candidate(&mut self, start: DVec2, end: DVec2) -> Segment {
            let id = self.network.allocate_segment_id();
            Segment::new(id, start, end, 0.0, 6.0, MetaInfo::street())
        }

        fn resolve(&mut self, candidate: &mut Segment) -> (LocalAction, bool) {
            let action = evaluate(candidate, &self.network, &self.qtree, &self.config);
            let ok = apply(action, candidate, &mut self.network, &mut self.qtree, &self.config);
            if ok {
                self.qtree.insert(candidate.bounds(), candidate.id);
                self.network.insert_segment(candidate.clone());
            }
            (action, ok)
        }
    }

    #[test]
    fn snaps_onto_t_junction_end() {
        let mut f = Fixture::new();
        // (0,0)-(10,0) meets (10,0)-(10,10) at a T with a second road through (0,0).
        let base = f.add(DVec2::ZERO, DVec2::new(10.0, 0.0));
        let up = f.add(DVec2::new(10.0, 0.0), DVec2::new(10.0, 10.0));
        let left = f.add(DVec2::new(-10.0, 0.0), DVec2::ZERO);
        f.link(base, End::End, up, End::Start);
        f.link(left, End::End, base, End::Start);

        let mut c = f.candidate(DVec2::new(10.0, -300.0), DVec2::new(13.0, -20.0));
        let (action, ok) = f.resolve(&mut c);

        assert!(ok);
        assert!(matches!(action, LocalAction::Snap { .. }));
        assert_eq!(c.end, DVec2::new(10.0, 0.0));
        assert!(c.meta.severed);
        assert!(c.links_f.contains(&base) && c.links_f.contains(&up));
        f.network.verify_links().unwrap();
    }

    #[test]
    fn crossing_splits_the_other_road() {
        let mut f = Fixture::new();
        let road = f.add(DVec2::new(-100.0, 0.0), DVec2::new(100.0, 0.0));
        let mut c = f.candidate(DVec2::new(0.0, -200.0), DVec2::new(0.0, 100.0));

        let (action, ok) = f.resolve(&mut c);
        assert!(ok);
        assert!(matches!(action, LocalAction::Intersect { other, .. } if other == road));
        assert!(equal_points(c.end, DVec2::ZERO));
        assert_eq!(c.links_f.len(), 2);
        assert_eq!(f.network.segment_count(), 3);
        f.network.verify_links().unwrap();
    }

    #[test]
    fn earliest_crossing_wins() {
        let mut f = Fixture::new();
        let near = f.add(DVec2::new(-100.0, 50.0), DVec2::new(100.0, 50.0));
        let _far = f.add(DVec2::new(-100.0, 150.0), DVec2::new(100.0, 150.0));
        let c = f.candidate(DVec2::ZERO, DVec2::new(0.0, 300.0));

        let action = evaluate(&c, &f.network, &f.qtree, &f.config);
        assert!(matches!(action, LocalAction::Intersect { other, .. } if other == near));
    }

    #[test]
    fn shallow_crossing_is_rejected() {
        let mut f = Fixture::new();
        f.add(DVec2::new(-300.0, 0.0), DVec2::new(300.0, 0.0));
        let mut c = f.candidate(DVec2::new(-200.0, -20.0), DVec2::new(200.0, 20.0));

        let (action, ok) = f.resolve(&mut c);
        assert!(matches!(action, LocalAction::Intersect { .. }));
        assert!(!ok);
        assert_eq!(f.network.segment_count(), 1);
    }

    #[test]
    fn ends_near_a_road_join_it() {
        let mut f = Fixture::new();
        let road = f.add(DVec2::new(-300.0, 0.0), DVec2::new(300.0, 0.0));
        let mut c = f.candidate(DVec2::new(0.0, 300.0), DVec2::new(0.0, 30.0));

        let (action, ok) = f.resolve(&mut c);
        assert!(ok);
        assert!(matches!(action, LocalAction::Radius { other, .. } if other == road));
        assert!(equal_points(c.end, DVec2::ZERO));
        f.network.verify_links().unwrap();
    }

    #[test]
    fn radius_join_uses_the_joined_direction() {
        let mut f = Fixture::new();
        f.add(DVec2::new(-300.0, 0.0), DVec2::new(300.0, 0.0));
        // Leaves the road at 60 degrees, but the end pulled back onto it
        // makes the joined segment only 27 degrees off the road.
        let mut c = f.candidate(DVec2::new(0.0, 10.0), DVec2::new(20.0, 45.0));

        let (action, ok) = f.resolve(&mut c);
        assert!(matches!(action, LocalAction::Radius { .. }));
        assert!(!ok);
        assert_eq!(f.network.segment_count(), 1);
    }

    #[test]
    fn duplicate_edge_snap_is_rejected() {
        let mut f = Fixture::new();
        f.add(DVec2::ZERO, DVec2::new(300.0, 0.0));
        // Runs back along the existing road and would snap onto its start.
        let mut c = f.candidate(DVec2::new(300.0, 0.0), DVec2::new(10.0, 0.0));

        let (action, ok) = f.resolve(&mut c);
        assert!(matches!(action, LocalAction::Snap { .. }));
        assert!(!ok);
    }
}
