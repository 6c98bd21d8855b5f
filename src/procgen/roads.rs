//! Road segments, intersections and the arena that owns them.
//!
//! Segments reference each other by id. `links_b` holds the segments touching
//! a segment's start, `links_f` those touching its end, and every link is
//! mirrored on the other side.

use std::collections::BTreeMap;

use bevy::math::DVec2;
use bevy::prelude::Resource;
use smallvec::{smallvec, SmallVec};

use super::error::TopologyError;
use super::math::{bearing, equal_points, point_along_bearing};
use super::quadtree::{Bounds, Quadtree};

pub type SegmentId = u32;
pub type IntersectionId = u32;

pub type Links = SmallVec<[SegmentId; 4]>;

/// One of the two endpoints of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum End {
    Start,
    End,
}

impl End {
    pub fn opposite(self) -> Self {
        match self {
            End::Start => End::End,
            End::End => End::Start,
        }
    }
}

/// Attributes consulted by the growth rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetaInfo {
    pub highway: bool,
    /// Set when a local constraint cut the segment short; severed roads stop growing.
    pub severed: bool,
    /// Debug color, 0xRRGGBB.
    pub color: u32,
}

impl MetaInfo {
    pub fn highway() -> Self {
        Self {
            highway: true,
            ..Default::default()
        }
    }

    pub fn street() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    pub start: DVec2,
    pub end: DVec2,
    /// Time step at which the segment is evaluated.
    pub t: f64,
    pub width: f64,
    pub meta: MetaInfo,
    pub links_b: Links,
    pub links_f: Links,
    pub start_intersection: Option<IntersectionId>,
    pub end_intersection: Option<IntersectionId>,
    /// Stacking rank of the road surface at each end.
    pub start_order: i32,
    pub end_order: i32,
}

impl Segment {
    pub fn new(id: SegmentId, start: DVec2, end: DVec2, t: f64, width: f64, meta: MetaInfo) -> Self {
        Self {
            id,
            start,
            end,
            t,
            width,
            meta,
            links_b: SmallVec::new(),
            links_f: SmallVec::new(),
            start_intersection: None,
            end_intersection: None,
            start_order: 0,
            end_order: 0,
        }
    }

    /// Segment of `length` leaving `start` along `dir` degrees.
    pub fn using_direction(
        id: SegmentId,
        start: DVec2,
        dir: f64,
        length: f64,
        t: f64,
        width: f64,
        meta: MetaInfo,
    ) -> Self {
        let end = point_along_bearing(start, dir, length);
        Self::new(id, start, end, t, width, meta)
    }

    /// Heading in degrees, clockwise from +Y.
    pub fn dir(&self) -> f64 {
        bearing(self.end - self.start)
    }

    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(self.start, self.end)
    }

    pub fn point(&self, end: End) -> DVec2 {
        match end {
            End::Start => self.start,
            End::End => self.end,
        }
    }

    pub fn links(&self, end: End) -> &Links {
        match end {
            End::Start => &self.links_b,
            End::End => &self.links_f,
        }
    }

    pub fn links_mut(&mut self, end: End) -> &mut Links {
        match end {
            End::Start => &mut self.links_b,
            End::End => &mut self.links_f,
        }
    }

    pub fn intersection(&self, end: End) -> Option<IntersectionId> {
        match end {
            End::Start => self.start_intersection,
            End::End => self.end_intersection,
        }
    }

    pub fn set_intersection(&mut self, end: End, id: Option<IntersectionId>) {
        match end {
            End::Start => self.start_intersection = id,
            End::End => self.end_intersection = id,
        }
    }

    pub fn set_order(&mut self, end: End, order: i32) {
        match end {
            End::Start => self.start_order = order,
            End::End => self.end_order = order,
        }
    }

    /// Which link list mentions `other`, if any.
    pub fn end_containing(&self, other: SegmentId) -> Option<End> {
        if self.links_b.contains(&other) {
            Some(End::Start)
        } else if self.links_f.contains(&other) {
            Some(End::End)
        } else {
            None
        }
    }

    /// Endpoint located at `p`.
    pub fn end_at(&self, p: DVec2) -> Option<End> {
        if equal_points(self.start, p) {
            Some(End::Start)
        } else if equal_points(self.end, p) {
            Some(End::End)
        } else {
            None
        }
    }

    /// Endpoint geometrically closer to `p`.
    pub fn nearer_end(&self, p: DVec2) -> End {
        if self.start.distance_squared(p) <= self.end.distance_squared(p) {
            End::Start
        } else {
            End::End
        }
    }

    /// Whether this segment joins the same two points as `a`-`b`, in either direction.
    pub fn connects(&self, a: DVec2, b: DVec2) -> bool {
        (equal_points(self.start, a) && equal_points(self.end, b))
            || (equal_points(self.start, b) && equal_points(self.end, a))
    }
}

/// A point where two or more segments meet.
#[derive(Clone, Debug, PartialEq)]
pub struct Intersection {
    pub id: IntersectionId,
    pub position: DVec2,
    pub branches: Vec<SegmentId>,
}

/// Arena of segments and intersections produced by one generation run.
#[derive(Resource, Clone, Debug, Default)]
pub struct RoadNetwork {
    pub segments: BTreeMap<SegmentId, Segment>,
    pub intersections: BTreeMap<IntersectionId, Intersection>,
    next_segment: SegmentId,
    next_intersection: IntersectionId,
}

impl RoadNetwork {
    pub fn allocate_segment_id(&mut self) -> SegmentId {
        let id = self.next_segment;
        self.next_segment += 1;
        id
    }

    pub fn allocate_intersection_id(&mut self) -> IntersectionId {
        let id = self.next_intersection;
        self.next_intersection += 1;
        id
    }

    pub fn insert_segment(&mut self, segment: Segment) {
        self.next_segment = self.next_segment.max(segment.id + 1);
        self.segments.insert(segment.id, segment);
    }

    pub fn insert_intersection(&mut self, intersection: Intersection) {
        self.next_intersection = self.next_intersection.max(intersection.id + 1);
        self.intersections.insert(intersection.id, intersection);
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.get_mut(&id)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    /// Add `link` to whichever list of `holder` already mentions `anchor`.
    ///
    /// Panics when `anchor` is not linked to `holder`: the link graph is corrupt.
    pub fn push_link_beside(&mut self, holder: SegmentId, anchor: SegmentId, link: SegmentId) {
        let Some(segment) = self.segments.get_mut(&holder) else {
            panic!("segment {holder} is linked but not in the network");
        };
        let Some(end) = segment.end_containing(anchor) else {
            panic!("segment {anchor} not found in the links of its neighbour {holder}");
        };
        segment.links_mut(end).push(link);
    }

    /// Replace `old` with `new` in the link lists of `holder`.
    fn replace_link(&mut self, holder: SegmentId, old: SegmentId, new: SegmentId) {
        let Some(segment) = self.segments.get_mut(&holder) else {
            panic!("segment {holder} is linked but not in the network");
        };
        let Some(end) = segment.end_containing(old) else {
            panic!("segment {old} not found in the links of its neighbour {holder}");
        };
        for l in segment.links_mut(end).iter_mut() {
            if *l == old {
                *l = new;
            }
        }
    }

    /// Split `target` at `point`, joining `third` to the new crossing.
    ///
    /// The piece from the old start to `point` becomes a new segment; `target`
    /// keeps its id and end. Returns the id of the new piece.
    pub fn split(
        &mut self,
        target: SegmentId,
        point: DVec2,
        third: &mut Segment,
        qtree: &mut Quadtree<SegmentId>,
    ) -> SegmentId {
        let new_id = self.allocate_segment_id();
        let Some(segment) = self.segments.get_mut(&target) else {
            panic!("cannot split segment {target}: not in the network");
        };

        let mut part = segment.clone();
        part.id = new_id;
        part.end = point;
        part.links_f = smallvec![third.id, target];
        part.end_intersection = None;
        part.end_order = 0;

        segment.start = point;
        segment.links_b = smallvec![third.id, new_id];
        segment.start_intersection = None;
        segment.start_order = 0;

        for &link in &part.links_b {
            self.replace_link(link, target, new_id);
        }

        third.links_f.push(new_id);
        third.links_f.push(target);

        qtree.insert(part.bounds(), new_id);
        self.segments.insert(new_id, part);
        new_id
    }

    /// Remove a segment together with every link and branch pointing at it.
    pub fn remove_segment(&mut self, id: SegmentId) -> Option<Segment> {
        let removed = self.segments.remove(&id)?;
        for &link in removed.links_b.iter().chain(removed.links_f.iter()) {
            if let Some(other) = self.segments.get_mut(&link) {
                other.links_b.retain(|l| *l != id);
                other.links_f.retain(|l| *l != id);
            }
        }
        for intersection in self.intersections.values_mut() {
            intersection.branches.retain(|b| *b != id);
        }
        Some(removed)
    }

    /// Check that every link is mirrored exactly once and touches the shared endpoint.
    pub fn verify_links(&self) -> Result<(), TopologyError> {
        for segment in self.segments.values() {
            for end in [End::Start, End::End] {
                let point = segment.point(end);
                for &link in segment.links(end) {
                    let Some(other) = self.segments.get(&link) else {
                        return Err(TopologyError::UnknownSegment {
                            segment: segment.id,
                            link,
                        });
                    };
                    let count = other
                        .links_b
                        .iter()
                        .chain(other.links_f.iter())
                        .filter(|l| **l == segment.id)
                        .count();
                    match count {
                        0 => {
                            return Err(TopologyError::LinkMissing {
                                segment: segment.id,
                                link,
                            })
                        }
                        1 => {}
                        count => {
                            return Err(TopologyError::DuplicateLink {
                                segment: segment.id,
                                link,
                                count,
                            })
                        }
                    }
                    if other.end_at(point).is_none() {
                        return Err(TopologyError::LinkNotTouching {
                            segment: segment.id,
                            link,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Check that every branch references its intersection on the nearer endpoint.
    pub fn verify_intersections(&self) -> Result<(), TopologyError> {
        for intersection in self.intersections.values() {
            for &branch in &intersection.branches {
                let consistent = self.segments.get(&branch).is_some_and(|s| {
                    s.intersection(s.nearer_end(intersection.position)) == Some(intersection.id)
                });
                if !consistent {
                    return Err(TopologyError::BranchMismatch {
                        intersection: intersection.id,
                        segment: branch,
                    });
                }
            }
        }
        Ok(())
    }
}
