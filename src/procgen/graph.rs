//! Undirected planar graph over positioned vertices.
//!
//! Adjacency lives in a petgraph `UnGraphMap` keyed by vertex id; vertex
//! payloads sit beside it in an ordered map so iteration is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use bevy::log::warn;
use bevy::math::DVec2;
use petgraph::graphmap::UnGraphMap;

use super::error::TopologyError;
use super::lot_geometry::signed_area;

/// Face walks longer than this are treated as malformed and dropped.
pub const MAX_FACE_WALK: usize = 50;

/// Anything that can be placed in the plane.
pub trait HasPosition {
    fn position(&self) -> DVec2;
}

impl HasPosition for DVec2 {
    fn position(&self) -> DVec2 {
        *self
    }
}

/// A vertex with a stable id, used for blocks and parcels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphVertex {
    pub id: u32,
    pub position: DVec2,
}

impl GraphVertex {
    pub fn new(id: u32, position: DVec2) -> Self {
        Self { id, position }
    }
}

impl HasPosition for GraphVertex {
    fn position(&self) -> DVec2 {
        self.position
    }
}

#[derive(Clone, Debug)]
pub struct Graph<M> {
    adjacency: UnGraphMap<u32, ()>,
    meta: BTreeMap<u32, M>,
    /// Cached result of [`Graph::find_faces`], cleared by every mutation.
    faces: Option<Vec<Vec<u32>>>,
}

impl<M> Default for Graph<M> {
    fn default() -> Self {
        Self {
            adjacency: UnGraphMap::new(),
            meta: BTreeMap::new(),
            faces: None,
        }
    }
}

impl<M> Graph<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a closed ring `0 -> 1 -> ... -> n-1 -> 0` from `(id, payload)` pairs.
    pub fn from_ring(ring: impl IntoIterator<Item = (u32, M)>) -> Self {
        let mut graph = Self::new();
        let ids: Vec<u32> = ring
            .into_iter()
            .map(|(id, m)| {
                graph.add_node(id, m);
                id
            })
            .collect();
        for (i, &id) in ids.iter().enumerate() {
            let next = ids[(i + 1) % ids.len()];
            if next != id {
                graph.add_edge(id, next);
            }
        }
        graph
    }

    /// Insert a vertex. An existing vertex keeps its payload and false is returned.
    pub fn add_node(&mut self, id: u32, meta: M) -> bool {
        if self.meta.contains_key(&id) {
            return false;
        }
        self.meta.insert(id, meta);
        self.adjacency.add_node(id);
        self.faces = None;
        true
    }

    /// Connect two existing vertices. Self edges and unknown vertices are refused.
    pub fn add_edge(&mut self, a: u32, b: u32) -> bool {
        if a == b || !self.contains_node(a) || !self.contains_node(b) {
            warn!("refusing edge {a} - {b}");
            return false;
        }
        self.faces = None;
        self.adjacency.add_edge(a, b, ()).is_none()
    }

    pub fn remove_edge(&mut self, a: u32, b: u32) -> bool {
        self.faces = None;
        self.adjacency.remove_edge(a, b).is_some()
    }

    /// Remove a vertex and every edge touching it.
    pub fn remove_node(&mut self, id: u32) -> Option<M> {
        self.faces = None;
        self.adjacency.remove_node(id);
        self.meta.remove(&id)
    }

    pub fn contains_node(&self, id: u32) -> bool {
        self.meta.contains_key(&id)
    }

    pub fn contains_edge(&self, a: u32, b: u32) -> bool {
        self.adjacency.contains_edge(a, b)
    }

    /// Neighbours of `id` in ascending order.
    pub fn neighbors(&self, id: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self.adjacency.neighbors(id).collect();
        out.sort_unstable();
        out
    }

    pub fn degree(&self, id: u32) -> usize {
        self.adjacency.neighbors(id).count()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.meta.keys().copied()
    }

    pub fn meta(&self, id: u32) -> Option<&M> {
        self.meta.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.meta.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.edge_count()
    }

    /// Every edge once, as `(low, high)` pairs in ascending order.
    pub fn edges(&self) -> Vec<(u32, u32)> {
        let mut out: Vec<(u32, u32)> = self
            .adjacency
            .all_edges()
            .map(|(a, b, _)| (a.min(b), a.max(b)))
            .collect();
        out.sort_unstable();
        out
    }

    /// Iteratively remove vertices with fewer than two neighbours.
    ///
    /// Dead-end streets never bound a face, and a face walk that runs into
    /// one cannot close.
    pub fn prune_dangling(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let dangling: Vec<u32> = self
                .meta
                .keys()
                .copied()
                .filter(|&id| self.degree(id) < 2)
                .collect();
            if dangling.is_empty() {
                return removed;
            }
            for id in dangling {
                self.remove_node(id);
                removed += 1;
            }
        }
    }

    /// Every neighbour must be a known vertex that lists the edge back.
    pub fn verify_symmetry(&self) -> Result<(), TopologyError> {
        for &a in self.meta.keys() {
            for b in self.adjacency.neighbors(a) {
                let back = self.adjacency.neighbors(b).any(|n| n == a);
                if !back || !self.contains_node(b) {
                    return Err(TopologyError::AsymmetricAdjacency { from: a, to: b });
                }
            }
        }
        Ok(())
    }
}

impl<M: HasPosition> Graph<M> {
    pub fn position(&self, id: u32) -> Option<DVec2> {
        self.meta.get(&id).map(HasPosition::position)
    }

    /// Positions along a face, skipping unknown ids.
    pub fn face_positions(&self, face: &[u32]) -> Vec<DVec2> {
        face.iter().filter_map(|&id| self.position(id)).collect()
    }

    /// All minimal counter-clockwise faces, computed once and cached until
    /// the graph changes.
    pub fn find_faces(&mut self) -> &[Vec<u32>] {
        let faces = match self.faces.take() {
            Some(faces) => faces,
            None => self.trace_faces(),
        };
        self.faces.insert(faces).as_slice()
    }

    fn trace_faces(&self) -> Vec<Vec<u32>> {
        let mut faces = Vec::new();
        let mut seen = BTreeSet::new();
        let mut finished = BTreeSet::new();

        for &v in self.meta.keys() {
            for first in self.neighbors(v) {
                let Some(walk) = self.walk_face(v, first, &finished) else {
                    continue;
                };
                if walk.len() < 3 || signed_area(&self.face_positions(&walk)) <= 0.0 {
                    continue;
                }
                if seen.insert(canonical_face(&walk)) {
                    faces.push(walk);
                }
            }
            // Every face through `v` has now been traced from it.
            finished.insert(v);
        }

        faces
    }

    fn walk_face(&self, start: u32, first: u32, finished: &BTreeSet<u32>) -> Option<Vec<u32>> {
        let mut walk = vec![start];
        let (mut prev, mut current) = (start, first);

        while walk.len() <= MAX_FACE_WALK {
            if current == start {
                return Some(walk);
            }
            if finished.contains(&current) {
                return None;
            }
            walk.push(current);
            let next = self.next_on_face(prev, current)?;
            prev = current;
            current = next;
        }

        None
    }

    /// Leaving `current` after arriving from `prev`: the sharpest left turn,
    /// else straight on, else the gentlest right turn.
    fn next_on_face(&self, prev: u32, current: u32) -> Option<u32> {
        let here = self.position(current)?;
        let incoming = here - self.position(prev)?;

        self.neighbors(current)
            .into_iter()
            .filter(|&n| n != prev)
            .filter_map(|n| {
                let outgoing = self.position(n)? - here;
                Some((n, turn_angle(incoming, outgoing)))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(n, _)| n)
    }
}

/// Signed turn from `incoming` to `outgoing` in radians; positive is left.
fn turn_angle(incoming: DVec2, outgoing: DVec2) -> f64 {
    incoming.perp_dot(outgoing).atan2(incoming.dot(outgoing))
}

/// Rotate a closed walk so it starts at its smallest id.
pub fn canonical_face(face: &[u32]) -> Vec<u32> {
    let start = face
        .iter()
        .enumerate()
        .min_by_key(|(_, &id)| id)
        .map_or(0, |(i, _)| i);
    face[start..].iter().chain(&face[..start]).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x3 lattice of vertices, ids row-major from the bottom left.
    fn grid(order: &[(u32, u32)]) -> Graph<GraphVertex> {
        let mut g = Graph::new();
        for id in 0..9 {
            let p = DVec2::new((id % 3) as f64, (id / 3) as f64);
            g.add_node(id, GraphVertex::new(id, p));
        }
        for &(a, b) in order {
            assert!(g.add_edge(a, b));
        }
        g
    }

    fn grid_edges() -> Vec<(u32, u32)> {
        let mut edges = Vec::new();
        for id in 0..9 {
            if id % 3 < 2 {
                edges.push((id, id + 1));
            }
            if id < 6 {
                edges.push((id, id + 3));
            }
        }
        edges
    }

    fn face_set(g: &mut Graph<GraphVertex>) -> BTreeSet<Vec<u32>> {
        g.find_faces().iter().map(|f| canonical_face(f)).collect()
    }

    #[test]
    fn grid_has_four_square_faces() {
        let mut g = grid(&grid_edges());
        assert_eq!(g.edge_count(), 12);

        let faces = g.find_faces().to_vec();
        assert_eq!(faces.len(), 4);
        for face in &faces {
            assert_eq!(face.len(), 4);
            let area = signed_area(&g.face_positions(face));
            assert!((area - 1.0).abs() < 1e-9);
        }
        assert!(face_set(&mut g).contains(&vec![0, 1, 4, 3]));
    }

    #[test]
    fn faces_do_not_depend_on_insertion_order() {
        let mut edges = grid_edges();
        let mut a = grid(&edges);
        edges.reverse();
        edges.swap(0, 5);
        let mut b = grid(&edges);

        let first = face_set(&mut a);
        assert_eq!(first, face_set(&mut a));
        assert_eq!(first, face_set(&mut b));
    }

    #[test]
    fn mutation_invalidates_cached_faces() {
        let mut g = grid(&grid_edges());
        assert_eq!(g.find_faces().len(), 4);
        g.remove_edge(1, 4);
        // The two bottom squares merge into one face.
        let faces = g.find_faces().to_vec();
        assert_eq!(faces.len(), 3);
        assert!(faces.iter().any(|f| f.len() == 6));
    }

    #[test]
    fn dangling_vertices_are_pruned() {
        let mut g = grid(&grid_edges());
        g.add_node(9, GraphVertex::new(9, DVec2::new(0.5, 0.5)));
        g.add_node(10, GraphVertex::new(10, DVec2::new(0.5, 0.25)));
        g.add_edge(0, 9);
        g.add_edge(9, 10);

        assert_eq!(g.prune_dangling(), 2);
        assert_eq!(g.node_count(), 9);
        assert_eq!(g.find_faces().len(), 4);
    }

    #[test]
    fn self_edges_and_unknown_vertices_are_refused() {
        let mut g = grid(&[]);
        assert!(!g.add_edge(1, 1));
        assert!(!g.add_edge(1, 42));
        assert!(g.add_edge(1, 2));
        assert!(!g.add_edge(2, 1));
        assert_eq!(g.neighbors(1), vec![2]);
        g.verify_symmetry().unwrap();
    }

    #[test]
    fn ring_is_one_face() {
        let ring = [
            DVec2::new(0.0, 0.0),
            DVec2::new(4.0, 0.0),
            DVec2::new(4.0, 3.0),
            DVec2::new(0.0, 3.0),
        ];
        let mut g = Graph::from_ring(ring.iter().enumerate().map(|(i, &p)| (i as u32 + 10, p)));
        assert_eq!(g.edges(), vec![(10, 11), (10, 13), (11, 12), (12, 13)]);
        assert_eq!(g.find_faces(), &[vec![10, 11, 12, 13]]);
    }

    fn polygon_ring(n: u32) -> Graph<DVec2> {
        Graph::from_ring((0..n).map(|i| {
            let a = std::f64::consts::TAU * f64::from(i) / f64::from(n);
            (i, DVec2::new(a.cos(), a.sin()) * 100.0)
        }))
    }

    #[test]
    fn face_walk_stops_after_the_step_limit() {
        let limit = MAX_FACE_WALK as u32;

        let mut at_limit = polygon_ring(limit);
        let faces = at_limit.find_faces();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].len(), MAX_FACE_WALK);

        let mut over = polygon_ring(limit + 1);
        assert!(over.find_faces().is_empty());
    }

    #[test]
    fn canonical_face_rotates_to_smallest_id() {
        assert_eq!(canonical_face(&[7, 3, 9, 5]), vec![3, 9, 5, 7]);
        assert!(canonical_face(&[]).is_empty());
    }
}
