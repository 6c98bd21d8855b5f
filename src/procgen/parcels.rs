//! Parcel subdivision using oriented bounding boxes.
//!
//! A [`Block`] starts as a single parcel cut from a city block face. Every
//! pass splits each parcel whose OBB is still too large with a line across
//! its long axis, then re-extracts the faces of the parcel graph to get the
//! pieces.

use bevy::log::debug;
use bevy::math::DVec2;
use rand::Rng;

use super::graph::{Graph, GraphVertex};
use super::lot_geometry::{edges_overlap, is_simple, polygon_bounds, signed_area};
use super::math::{angle_between, equal_points, rotate_around, segment_intersection, POINT_EPSILON_SQ};

/// An oriented bounding box. `extents` are full side lengths along the
/// box's local x and y axes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: DVec2,
    /// Radians, counter-clockwise from +X to the local x axis.
    pub rotation: f64,
    pub extents: DVec2,
    pub long_axis: DVec2,
    pub short_axis: DVec2,
    /// Counter-clockwise from the local bottom-left corner.
    pub corners: [DVec2; 4],
}

impl OrientedBoundingBox {
    pub fn new(center: DVec2, rotation: f64, extents: DVec2) -> Self {
        let (sin, cos) = rotation.sin_cos();
        let x_axis = DVec2::new(cos, sin);
        let y_axis = DVec2::new(-sin, cos);
        let (long_axis, short_axis) = if extents.x >= extents.y {
            (x_axis, y_axis)
        } else {
            (y_axis, x_axis)
        };

        let mut obb = Self {
            center,
            rotation,
            extents,
            long_axis,
            short_axis,
            corners: [DVec2::ZERO; 4],
        };
        obb.corners = [
            DVec2::new(-0.5, -0.5),
            DVec2::new(0.5, -0.5),
            DVec2::new(0.5, 0.5),
            DVec2::new(-0.5, 0.5),
        ]
        .map(|unit| obb.transform_point(unit));
        obb
    }

    /// Smallest box aligned with one of the polygon's edges.
    ///
    /// Only edge directions are tried, so the result is minimal for convex
    /// polygons and an upper bound otherwise.
    pub fn from_polygon(points: &[DVec2]) -> Self {
        if points.is_empty() {
            return Self::default();
        }

        let (min, max) = polygon_bounds(points);
        let pivot = (min + max) / 2.0;
        let mut best = Self::new(pivot, 0.0, max - min);
        let mut best_area = f64::INFINITY;

        let n = points.len();
        for i in 0..n {
            let edge = points[(i + 1) % n] - points[i];
            if edge.length_squared() < POINT_EPSILON_SQ {
                continue;
            }
            let angle = edge.y.atan2(edge.x);
            let rotated: Vec<DVec2> = points
                .iter()
                .map(|&p| rotate_around(p, pivot, -angle))
                .collect();
            let (lo, hi) = polygon_bounds(&rotated);
            let size = hi - lo;
            let area = size.x * size.y;
            if area < best_area {
                best_area = area;
                let center = rotate_around((lo + hi) / 2.0, pivot, angle);
                best = Self::new(center, angle, size);
            }
        }

        best
    }

    pub fn area(&self) -> f64 {
        self.extents.x * self.extents.y
    }

    /// Map a point of the unit box centred on the origin into the OBB.
    pub fn transform_point(&self, unit: DVec2) -> DVec2 {
        let (sin, cos) = self.rotation.sin_cos();
        let local = unit * self.extents;
        self.center + DVec2::new(local.x * cos - local.y * sin, local.x * sin + local.y * cos)
    }

    pub fn longest_side(&self) -> f64 {
        self.extents.x.max(self.extents.y)
    }
}

/// Hands out fresh vertex ids for corners created while reshaping parcels.
#[derive(Clone, Debug, Default)]
pub struct VertexIds {
    next: u32,
}

impl VertexIds {
    pub fn starting_after(used: impl IntoIterator<Item = u32>) -> Self {
        let next = used.into_iter().max().map_or(0, |m| m + 1);
        Self { next }
    }

    pub fn next(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Where a cut line meets the parcel graph.
#[derive(Clone, Copy, Debug)]
struct CutHit {
    /// Parameter along the cut.
    t: f64,
    point: DVec2,
    edge: (u32, u32),
    /// Set when the cut passes through an existing vertex.
    vertex: Option<u32>,
}

/// One building lot polygon together with its graph view.
#[derive(Clone, Debug)]
pub struct Parcel {
    pub face: Vec<GraphVertex>,
    pub graph: Graph<GraphVertex>,
    pub obb: OrientedBoundingBox,
    /// Shares an edge with the block outline.
    pub street_access: bool,
    /// Shares a corner with the block outline.
    pub has_street_vert: bool,
    /// A split failed; the parcel is excluded from further splitting.
    pub flag: bool,
}

impl Parcel {
    pub fn new(face: Vec<GraphVertex>) -> Self {
        let mut parcel = Self {
            face,
            graph: Graph::new(),
            obb: OrientedBoundingBox::default(),
            street_access: false,
            has_street_vert: false,
            flag: false,
        };
        parcel.refresh();
        parcel
    }

    pub fn positions(&self) -> Vec<DVec2> {
        self.face.iter().map(|v| v.position).collect()
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.positions()).abs()
    }

    /// Rebuild the ring graph and OBB after `face` changed.
    fn refresh(&mut self) {
        self.graph = Graph::from_ring(self.face.iter().map(|v| (v.id, *v)));
        self.obb = OrientedBoundingBox::from_polygon(&self.positions());
    }

    /// Cut across the long axis, `w` long-side lengths away from the OBB centre.
    pub fn split_obb(&mut self, w: f64, ids: &mut VertexIds) -> bool {
        let offset = w * self.obb.longest_side();
        let through = self.obb.center + self.obb.long_axis * offset;
        self.split_at_point_along(through, self.obb.short_axis, ids)
    }

    /// Two parallel cuts at `+w` and `-w`.
    pub fn split_obb_sym(&mut self, w: f64, ids: &mut VertexIds) -> bool {
        let offset = w * self.obb.longest_side();
        let center = self.obb.center;
        let (long, short) = (self.obb.long_axis, self.obb.short_axis);
        self.split_at_point_along(center + long * offset, short, ids)
            && self.split_at_point_along(center - long * offset, short, ids)
    }

    /// Cut along `dir` through `through`, reaching past the whole OBB.
    pub fn split_at_point_along(&mut self, through: DVec2, dir: DVec2, ids: &mut VertexIds) -> bool {
        let reach = self.obb.extents.length() + 1.0;
        let dir = dir.normalize_or_zero();
        self.split_along(through + dir * reach, through - dir * reach, ids)
    }

    /// Insert the cut `s1`-`s2` into the parcel graph.
    ///
    /// Crossings are paired in order along the cut, each pair becoming a new
    /// edge. An odd number of crossings flags the parcel and leaves the graph
    /// untouched.
    pub fn split_along(&mut self, s1: DVec2, s2: DVec2, ids: &mut VertexIds) -> bool {
        let mut hits = Vec::new();
        for (a, b) in self.graph.edges() {
            let (Some(pa), Some(pb)) = (self.graph.position(a), self.graph.position(b)) else {
                continue;
            };
            let Some(hit) = segment_intersection(s1, s2, pa, pb, false) else {
                continue;
            };
            let vertex = if equal_points(hit.point, pa) {
                Some(a)
            } else if equal_points(hit.point, pb) {
                Some(b)
            } else {
                None
            };
            hits.push(CutHit {
                t: hit.t,
                point: hit.point,
                edge: (a, b),
                vertex,
            });
        }

        hits.sort_by(|x, y| x.t.total_cmp(&y.t));
        hits.dedup_by(|later, earlier| equal_points(later.point, earlier.point));

        if hits.len() % 2 != 0 {
            debug!("cut crosses parcel {} times, flagging it", hits.len());
            self.flag = true;
            return false;
        }

        for pair in hits.chunks_exact(2) {
            let a = self.cut_vertex(&pair[0], ids);
            let b = self.cut_vertex(&pair[1], ids);
            if a != b {
                self.graph.add_edge(a, b);
            }
        }
        true
    }

    fn cut_vertex(&mut self, hit: &CutHit, ids: &mut VertexIds) -> u32 {
        if let Some(v) = hit.vertex {
            return v;
        }
        let id = ids.next();
        let (a, b) = hit.edge;
        self.graph.add_node(id, GraphVertex::new(id, hit.point));
        self.graph.remove_edge(a, b);
        self.graph.add_edge(a, id);
        self.graph.add_edge(id, b);
        id
    }

    /// Faces of the parcel graph as new parcels carrying this parcel's flag.
    pub fn pieces(&mut self) -> Vec<Parcel> {
        let faces = self.graph.find_faces().to_vec();
        faces
            .iter()
            .map(|face| {
                let vertices = face
                    .iter()
                    .filter_map(|&id| self.graph.meta(id).copied())
                    .collect();
                let mut piece = Parcel::new(vertices);
                piece.flag = self.flag;
                piece
            })
            .collect()
    }

    /// Chamfer corners sharper than `angle_delta` degrees.
    ///
    /// A sharp corner is replaced by two points half the shorter adjacent edge
    /// away from it, or dropped when that distance is below `length_delta`.
    pub fn square_acute_angles(&mut self, angle_delta: f64, length_delta: f64, ids: &mut VertexIds) {
        let n = self.face.len();
        if n < 3 {
            return;
        }

        let mut squared = Vec::with_capacity(n + 2);
        for i in 0..n {
            let here = self.face[i];
            let to_prev = self.face[(i + n - 1) % n].position - here.position;
            let to_next = self.face[(i + 1) % n].position - here.position;

            if angle_between(to_prev, to_next) >= angle_delta {
                squared.push(here);
                continue;
            }

            let d = (to_prev.length() * 0.5).min(to_next.length() * 0.5);
            if d < length_delta {
                continue;
            }
            for edge in [to_prev, to_next] {
                let id = ids.next();
                let p = here.position + edge.normalize_or_zero() * d;
                squared.push(GraphVertex::new(id, p));
            }
        }

        self.face = squared;
        self.refresh();
    }

    /// Move every edge inward by `inset`, limited so no corner comes closer
    /// than `limit` to the OBB centre.
    pub fn inset(&mut self, inset: f64, limit: f64, ids: &mut VertexIds) {
        let n = self.face.len();
        if n < 3 {
            return;
        }

        let points = self.positions();
        let winding = signed_area(&points).signum();
        let center = self.obb.center;

        self.face = (0..n)
            .map(|i| {
                let prev = points[(i + n - 1) % n];
                let here = points[i];
                let next = points[(i + 1) % n];
                let amount = inset.min(here.distance(center) - limit).max(0.0);

                let n1 = (here - prev).normalize_or_zero().perp() * winding * amount;
                let n2 = (next - here).normalize_or_zero().perp() * winding * amount;
                let corner = line_intersection(prev + n1, here + n1, here + n2, next + n2)
                    .unwrap_or(here + n1);
                GraphVertex::new(ids.next(), corner)
            })
            .collect();
        self.refresh();

        let points = self.positions();
        if signed_area(&points) * winding <= 0.0 || !is_simple(&points) {
            debug!("inset by {inset} collapsed a parcel");
            self.flag = true;
        }
    }

    /// Inset, keeping the old outline so the border strips become faces too.
    pub fn split_inset(&mut self, inset: f64, limit: f64, ids: &mut VertexIds) {
        let original = self.face.clone();
        self.inset(inset, limit, ids);
        self.add_original_face(&original);
    }

    /// Scale about the OBB centre.
    pub fn scale(&mut self, scale: DVec2, ids: &mut VertexIds) {
        let center = self.obb.center;
        self.face = self
            .face
            .iter()
            .map(|v| GraphVertex::new(ids.next(), (v.position - center) * scale + center))
            .collect();
        self.refresh();
    }

    /// Scale, keeping the old outline so the border strips become faces too.
    pub fn split_scale(&mut self, scale: DVec2, ids: &mut VertexIds) {
        let original = self.face.clone();
        self.scale(scale, ids);
        self.add_original_face(&original);
    }

    /// Rotate about the OBB centre by `angle` radians.
    pub fn rotate(&mut self, angle: f64) {
        let center = self.obb.center;
        for v in &mut self.face {
            v.position = rotate_around(v.position, center, angle);
        }
        self.refresh();
    }

    /// Join each corner of `original` to its counterpart in the current face.
    fn add_original_face(&mut self, original: &[GraphVertex]) {
        if original.len() != self.face.len() {
            return;
        }
        let n = original.len();
        for i in 0..n {
            let (outer, inner, next) = (original[i], self.face[i], original[(i + 1) % n]);
            self.graph.add_node(outer.id, outer);
            self.graph.add_node(next.id, next);
            self.graph.add_edge(outer.id, inner.id);
            self.graph.add_edge(outer.id, next.id);
        }
    }

    /// Tag street access against the block `outline`.
    pub fn check_street_access(&mut self, outline: &[DVec2]) {
        self.street_access = false;
        self.has_street_vert = false;

        let points = self.positions();
        let (n, m) = (points.len(), outline.len());
        for j in 0..n {
            let (a1, a2) = (points[j], points[(j + 1) % n]);
            for k in 0..m {
                let (b1, b2) = (outline[k], outline[(k + 1) % m]);
                if edges_overlap(a1, a2, b1, b2) {
                    self.street_access = true;
                }
                if equal_points(a1, b1) {
                    self.has_street_vert = true;
                }
            }
        }
    }
}

/// Intersection of the infinite lines `a`-`b` and `p`-`q`.
fn line_intersection(a: DVec2, b: DVec2, p: DVec2, q: DVec2) -> Option<DVec2> {
    let r = b - a;
    let s = q - p;
    let denom = r.perp_dot(s);
    if denom.abs() <= 1e-9 * r.length() * s.length() {
        return None;
    }
    let t = (p - a).perp_dot(s) / denom;
    Some(a + r * t)
}

/// Configuration for subdivision.
#[derive(Clone, Debug)]
pub struct SubdivisionConfig {
    /// Parcels whose OBB area is at or below this are left alone.
    pub min_area: f64,
    /// Range of the cut offset, as a fraction of the OBB's long side.
    pub min_offset: f64,
    pub max_offset: f64,
    /// Cut twice, at `+w` and `-w`.
    pub symmetric: bool,
    pub iterations: usize,
}

impl Default for SubdivisionConfig {
    fn default() -> Self {
        Self {
            min_area: 0.14,
            min_offset: -0.2,
            max_offset: 0.2,
            symmetric: false,
            iterations: 6,
        }
    }
}

/// A city block and the parcels it is divided into.
#[derive(Clone, Debug)]
pub struct Block {
    pub parcels: Vec<Parcel>,
    outline: Vec<DVec2>,
    ids: VertexIds,
}

impl Block {
    pub fn new(parcel: Parcel) -> Self {
        let outline = parcel.positions();
        let ids = VertexIds::starting_after(parcel.face.iter().map(|v| v.id));
        Self {
            parcels: vec![parcel],
            outline,
            ids,
        }
    }

    /// The block polygon parcels take their street access from.
    pub fn outline(&self) -> &[DVec2] {
        &self.outline
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.outline).abs()
    }

    /// Parcels that were not flagged by a failed split.
    pub fn valid_parcels(&self) -> impl Iterator<Item = &Parcel> {
        self.parcels.iter().filter(|p| !p.flag)
    }

    /// Split parcels until their OBBs are no larger than `config.min_area` or
    /// the pass budget runs out. Returns the number of passes that split
    /// something.
    pub fn subdivide_parcels<R: Rng>(&mut self, config: &SubdivisionConfig, rng: &mut R) -> usize {
        let mut passes = 0;

        for _ in 0..config.iterations {
            let mut split_any = false;
            let mut next = Vec::with_capacity(self.parcels.len() * 2);

            for mut parcel in std::mem::take(&mut self.parcels) {
                if parcel.flag || parcel.obb.area() <= config.min_area {
                    next.push(parcel);
                    continue;
                }

                let w = if config.min_offset < config.max_offset {
                    rng.gen_range(config.min_offset..config.max_offset)
                } else {
                    config.min_offset
                };
                let cut = if config.symmetric {
                    parcel.split_obb_sym(w, &mut self.ids)
                } else {
                    parcel.split_obb(w, &mut self.ids)
                };

                let pieces = if cut { parcel.pieces() } else { Vec::new() };
                // Pieces the face walk could not close leave a gap.
                let covered: f64 = pieces.iter().map(Parcel::area).sum();
                let area = parcel.area();
                if pieces.is_empty() || (covered - area).abs() > 1e-6 * area.max(1.0) {
                    parcel.flag = true;
                    next.push(parcel);
                } else {
                    split_any = true;
                    next.extend(pieces);
                }
            }

            self.parcels = next;
            self.tag_street_access();
            if !split_any {
                break;
            }
            passes += 1;
        }

        passes
    }

    /// Inset every parcel, keeping the border strips as parcels of their own.
    pub fn inset_parcels(&mut self, inset: f64, limit: f64) {
        let mut next = Vec::new();
        for mut parcel in std::mem::take(&mut self.parcels) {
            parcel.split_inset(inset, limit, &mut self.ids);
            next.extend(parcel.pieces());
        }
        self.parcels = next;
        self.tag_street_access();
    }

    /// Scale every parcel, keeping the border strips as parcels of their own.
    pub fn scale_parcels(&mut self, scale: DVec2) {
        let mut next = Vec::new();
        for mut parcel in std::mem::take(&mut self.parcels) {
            parcel.split_scale(scale, &mut self.ids);
            next.extend(parcel.pieces());
        }
        self.parcels = next;
        self.tag_street_access();
    }

    fn tag_street_access(&mut self) {
        for parcel in &mut self.parcels {
            parcel.check_street_access(&self.outline);
        }
    }
}
