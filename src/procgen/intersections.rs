//! Intersection bookkeeping after growth: detection, region pruning,
//! deduplication, merging and vertical ordering of overlapping road ends.

use std::collections::{BTreeMap, BTreeSet};

use bevy::log::debug;
use bevy::math::DVec2;

use super::math::{angle_between, equal_points, segment_intersection};
use super::quadtree::Bounds;
use super::roads::{End, Intersection, IntersectionId, RoadNetwork, SegmentId};

/// Segment ends meeting at one point, found through the link lists.
fn junction(network: &RoadNetwork, seed: SegmentId, end: End) -> Vec<(SegmentId, End)> {
    let Some(first) = network.segment(seed) else {
        return Vec::new();
    };
    let point = first.point(end);

    let mut found = vec![(seed, end)];
    let mut seen = BTreeSet::from([seed]);
    let mut i = 0;
    while i < found.len() {
        let (id, e) = found[i];
        i += 1;
        let Some(segment) = network.segment(id) else {
            continue;
        };
        for &link in segment.links(e) {
            if !seen.insert(link) {
                continue;
            }
            if let Some(other_end) = network.segment(link).and_then(|l| l.end_at(point)) {
                found.push((link, other_end));
            }
        }
    }
    found
}

/// Deviation from a straight continuation, in degrees, of two segments meeting at `point`.
fn bend(point: DVec2, a_far: DVec2, b_far: DVec2) -> f64 {
    180.0 - angle_between(a_far - point, b_far - point)
}

/// Create an intersection wherever two or more segments meet, or where a
/// single continuation bends by more than `link_angle` degrees.
pub fn build_intersections(network: &mut RoadNetwork, link_angle: f64) -> usize {
    let ids: Vec<SegmentId> = network.segments.keys().copied().collect();
    let mut created = 0;

    for id in ids {
        for end in [End::Start, End::End] {
            let Some(segment) = network.segment(id) else {
                continue;
            };
            if segment.intersection(end).is_some() || segment.links(end).is_empty() {
                continue;
            }

            let members = junction(network, id, end);
            let point = segment.point(end);
            let qualifies = match members.as_slice() {
                [] | [_] => false,
                [(a, a_end), (b, b_end)] => {
                    let (Some(a), Some(b)) = (network.segment(*a), network.segment(*b)) else {
                        continue;
                    };
                    bend(point, a.point(a_end.opposite()), b.point(b_end.opposite())) > link_angle
                }
                _ => true,
            };
            if !qualifies {
                continue;
            }

            let existing = members
                .iter()
                .find_map(|(m, e)| network.segment(*m).and_then(|s| s.intersection(*e)));
            let iid = match existing {
                Some(iid) => iid,
                None => {
                    let iid = network.allocate_intersection_id();
                    network.insert_intersection(Intersection {
                        id: iid,
                        position: point,
                        branches: Vec::new(),
                    });
                    created += 1;
                    iid
                }
            };

            for (member, member_end) in members {
                if let Some(s) = network.segment_mut(member) {
                    s.set_intersection(member_end, Some(iid));
                }
                if let Some(i) = network.intersections.get_mut(&iid) {
                    if !i.branches.contains(&member) {
                        i.branches.push(member);
                    }
                }
            }
        }
    }

    debug!("Built {} intersections", created);
    created
}

/// Drop segments with an endpoint outside `region`, then intersections outside it.
/// Returns the number of segments removed.
pub fn prune_outside_region(network: &mut RoadNetwork, region: Bounds) -> usize {
    let outside: Vec<SegmentId> = network
        .segments
        .values()
        .filter(|s| !region.contains_point(s.start) || !region.contains_point(s.end))
        .map(|s| s.id)
        .collect();
    for &id in &outside {
        network.remove_segment(id);
    }

    let gone: Vec<IntersectionId> = network
        .intersections
        .values()
        .filter(|i| !region.contains_point(i.position))
        .map(|i| i.id)
        .collect();
    for id in &gone {
        network.intersections.remove(id);
        clear_intersection_refs(network, *id);
    }

    outside.len()
}

fn clear_intersection_refs(network: &mut RoadNetwork, id: IntersectionId) {
    for segment in network.segments.values_mut() {
        if segment.start_intersection == Some(id) {
            segment.start_intersection = None;
        }
        if segment.end_intersection == Some(id) {
            segment.end_intersection = None;
        }
    }
}

/// Fold intersection `from` into `into`, rewriting segment references.
fn absorb(network: &mut RoadNetwork, into: IntersectionId, from: IntersectionId) {
    let Some(removed) = network.intersections.remove(&from) else {
        return;
    };
    if let Some(target) = network.intersections.get_mut(&into) {
        for b in removed.branches {
            if !target.branches.contains(&b) {
                target.branches.push(b);
            }
        }
    }
    for segment in network.segments.values_mut() {
        if segment.start_intersection == Some(from) {
            segment.start_intersection = Some(into);
        }
        if segment.end_intersection == Some(from) {
            segment.end_intersection = Some(into);
        }
    }
}

/// Merge intersections sitting on exactly the same point. Returns the number removed.
pub fn remove_duplicate_intersections(network: &mut RoadNetwork) -> usize {
    let ids: Vec<IntersectionId> = network.intersections.keys().copied().collect();
    let mut removed = 0;
    for (i, &keep) in ids.iter().enumerate() {
        let Some(position) = network.intersections.get(&keep).map(|x| x.position) else {
            continue;
        };
        for &other in &ids[i + 1..] {
            let same = network
                .intersections
                .get(&other)
                .is_some_and(|x| equal_points(x.position, position));
            if same {
                absorb(network, keep, other);
                removed += 1;
            }
        }
    }
    removed
}

/// Merge intersections closer than `distance` into their midpoint.
///
/// The road ends at both intersections move onto the midpoint and are linked
/// to each other. A road joining the two collapses and is removed, as is a
/// road that now duplicates another. Merges that would make a moved road
/// cross a road it does not share an end with are skipped. Returns the
/// number of intersections removed.
pub fn merge_close_intersections(network: &mut RoadNetwork, distance: f64) -> usize {
    let position = |network: &RoadNetwork, id: IntersectionId| network.intersections.get(&id).map(|i| i.position);
    let mut removed = 0;
    let mut skipped = 0;
    loop {
        let before = removed;
        let ids: Vec<IntersectionId> = network.intersections.keys().copied().collect();
        for (i, &keep) in ids.iter().enumerate() {
            for &other in &ids[i + 1..] {
                let (Some(a), Some(b)) = (position(network, keep), position(network, other)) else {
                    continue;
                };
                if a.distance(b) >= distance {
                    continue;
                }
                if merge_pair(network, keep, other, (a + b) / 2.0) {
                    removed += 1;
                } else {
                    skipped += 1;
                }
            }
        }
        if removed == before {
            break;
        }
    }
    if skipped > 0 {
        debug!("Skipped {} intersection merges that would cross other roads", skipped);
    }
    removed
}

/// Segment ends referencing intersection `id`.
fn attached_ends(network: &RoadNetwork, id: IntersectionId) -> Vec<(SegmentId, End)> {
    network
        .segments
        .values()
        .flat_map(|s| {
            [End::Start, End::End]
                .into_iter()
                .filter(move |e| s.intersection(*e) == Some(id))
                .map(move |e| (s.id, e))
        })
        .collect()
}

fn move_end(network: &mut RoadNetwork, id: SegmentId, end: End, to: DVec2) {
    if let Some(s) = network.segment_mut(id) {
        match end {
            End::Start => s.start = to,
            End::End => s.end = to,
        }
    }
}

fn push_link_once(network: &mut RoadNetwork, holder: SegmentId, end: End, link: SegmentId) {
    if let Some(s) = network.segment_mut(holder) {
        if !s.links(end).contains(&link) {
            s.links_mut(end).push(link);
        }
    }
}

/// Whether any of `moved`, with its end at `target`, would cross a road outside `involved`.
fn merge_would_cross(
    network: &RoadNetwork,
    moved: &[(SegmentId, End)],
    involved: &BTreeSet<SegmentId>,
    target: DVec2,
) -> bool {
    moved.iter().any(|&(id, end)| {
        let Some(far) = network.segment(id).map(|s| s.point(end.opposite())) else {
            return false;
        };
        network
            .segments
            .values()
            .filter(|s| !involved.contains(&s.id))
            .any(|s| segment_intersection(target, far, s.start, s.end, true).is_some())
    })
}

/// Fold `other` into `keep` at `target`. Returns false, leaving the network
/// untouched, when the moved roads would cross another road.
fn merge_pair(network: &mut RoadNetwork, keep: IntersectionId, other: IntersectionId, target: DVec2) -> bool {
    let keep_ends = attached_ends(network, keep);
    let other_ends = attached_ends(network, other);

    let involved: BTreeSet<SegmentId> = keep_ends.iter().chain(&other_ends).map(|(id, _)| *id).collect();
    let collapsed: BTreeSet<SegmentId> = keep_ends
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| other_ends.iter().any(|(o, _)| o == id))
        .collect();
    let moved: Vec<(SegmentId, End)> = keep_ends
        .iter()
        .chain(&other_ends)
        .copied()
        .filter(|(id, _)| !collapsed.contains(id))
        .collect();

    if merge_would_cross(network, &moved, &involved, target) {
        return false;
    }

    for &id in &collapsed {
        network.remove_segment(id);
    }
    absorb(network, keep, other);
    for &(id, end) in &moved {
        move_end(network, id, end, target);
    }

    let mut survivors: Vec<(SegmentId, End)> = Vec::with_capacity(moved.len());
    for &(id, end) in &moved {
        let Some(far) = network.segment(id).map(|s| s.point(end.opposite())) else {
            continue;
        };
        let duplicate = survivors
            .iter()
            .any(|&(kept, _)| network.segment(kept).is_some_and(|k| k.connects(target, far)));
        if duplicate {
            network.remove_segment(id);
        } else {
            survivors.push((id, end));
        }
    }

    for (i, &(a, a_end)) in survivors.iter().enumerate() {
        for &(b, b_end) in &survivors[i + 1..] {
            push_link_once(network, a, a_end, b);
            push_link_once(network, b, b_end, a);
        }
    }

    if survivors.is_empty() {
        network.intersections.remove(&keep);
    } else if let Some(merged) = network.intersections.get_mut(&keep) {
        merged.position = target;
        merged.branches = survivors.iter().map(|(id, _)| *id).collect();
    }
    true
}

/// Assign stacking ranks to road ends that share a point.
///
/// Ends that continue each other within `link_angle` degrees share a rank;
/// crossing roads get distinct ranks, highways lowest.
pub fn assign_road_orders(network: &mut RoadNetwork, link_angle: f64) {
    let ids: Vec<SegmentId> = network.segments.keys().copied().collect();
    let mut done: BTreeSet<(SegmentId, End)> = BTreeSet::new();

    for id in ids {
        for end in [End::Start, End::End] {
            if done.contains(&(id, end)) {
                continue;
            }
            let members = junction(network, id, end);
            for (m, e) in &members {
                done.insert((*m, *e));
            }
            let Some(point) = network.segment(id).map(|s| s.point(end)) else {
                continue;
            };

            let groups = pair_continuations(network, point, &members, link_angle);
            for (rank, group) in groups.into_iter().enumerate() {
                for (m, e) in group {
                    if let Some(s) = network.segment_mut(m) {
                        s.set_order(e, rank as i32);
                    }
                }
            }
        }
    }
}

fn pair_continuations(
    network: &RoadNetwork,
    point: DVec2,
    members: &[(SegmentId, End)],
    link_angle: f64,
) -> Vec<Vec<(SegmentId, End)>> {
    let far = |(id, end): (SegmentId, End)| {
        network
            .segment(id)
            .map(|s| s.point(end.opposite()))
            .unwrap_or(point)
    };

    let mut pairs = Vec::new();
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            let deviation = bend(point, far(a), far(b));
            if deviation < link_angle {
                pairs.push((deviation, a, b));
            }
        }
    }
    pairs.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut grouped: BTreeMap<SegmentId, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<(SegmentId, End)>> = Vec::new();
    for (_, a, b) in pairs {
        if grouped.contains_key(&a.0) || grouped.contains_key(&b.0) {
            continue;
        }
        grouped.insert(a.0, groups.len());
        grouped.insert(b.0, groups.len());
        groups.push(vec![a, b]);
    }
    for &m in members {
        if !grouped.contains_key(&m.0) {
            grouped.insert(m.0, groups.len());
            groups.push(vec![m]);
        }
    }

    let is_highway = |g: &Vec<(SegmentId, End)>| {
        g.iter()
            .any(|(id, _)| network.segment(*id).is_some_and(|s| s.meta.highway))
    };
    let min_id = |g: &Vec<(SegmentId, End)>| g.iter().map(|(id, _)| *id).min().unwrap_or(u32::MAX);
    groups.sort_by_key(|g| (!is_highway(g), min_id(g)));
    groups
}
