//! Chordless cycle enumeration.
//!
//! Vertices are labelled by a degeneracy ordering; every chordless cycle is
//! then grown exactly once from a triplet `(x, u, y)` with
//! `label(u) < label(x) < label(y)`, extending paths only through vertices
//! adjacent to the path's last vertex and to no other path vertex.

use std::collections::BTreeMap;

use super::graph::Graph;

/// Longest cycle searched for by default.
pub const DEFAULT_MAX_CYCLE_DEPTH: usize = 15;

impl<M> Graph<M> {
    /// All chordless cycles with at most `max_depth` vertices.
    ///
    /// Longer cycles are silently omitted; the search is exponential on dense
    /// graphs without the cap.
    pub fn chordless_cycles(&self, max_depth: usize) -> Vec<Vec<u32>> {
        let mut search = CycleSearch {
            graph: self,
            labels: degree_labels(self),
            blocked: BTreeMap::new(),
            max_depth,
            cycles: Vec::new(),
        };
        search.run();
        search.cycles
    }
}

/// Label vertices `0..n` by repeatedly taking the vertex of least remaining
/// degree. Ties go to the smaller id.
pub fn degree_labels<M>(graph: &Graph<M>) -> BTreeMap<u32, usize> {
    let mut degree: BTreeMap<u32, usize> = graph.node_ids().map(|id| (id, graph.degree(id))).collect();
    let mut labels = BTreeMap::new();

    for label in 0..degree.len() {
        let Some((&next, _)) = degree
            .iter()
            .filter(|(id, _)| !labels.contains_key(*id))
            .min_by_key(|(&id, &d)| (d, id))
        else {
            break;
        };
        labels.insert(next, label);
        for n in graph.neighbors(next) {
            if !labels.contains_key(&n) {
                if let Some(d) = degree.get_mut(&n) {
                    *d = d.saturating_sub(1);
                }
            }
        }
    }

    labels
}

struct CycleSearch<'a, M> {
    graph: &'a Graph<M>,
    labels: BTreeMap<u32, usize>,
    blocked: BTreeMap<u32, u32>,
    max_depth: usize,
    cycles: Vec<Vec<u32>>,
}

impl<M> CycleSearch<'_, M> {
    fn label(&self, id: u32) -> usize {
        self.labels.get(&id).copied().unwrap_or(usize::MAX)
    }

    fn run(&mut self) {
        let graph = self.graph;
        for u in graph.node_ids() {
            let lu = self.label(u);
            let around: Vec<u32> = graph
                .neighbors(u)
                .into_iter()
                .filter(|&n| self.label(n) > lu)
                .collect();

            for &x in &around {
                for &y in &around {
                    if self.label(x) >= self.label(y) {
                        continue;
                    }
                    if graph.contains_edge(x, y) {
                        self.cycles.push(vec![x, u, y]);
                    } else if self.max_depth > 3 {
                        self.block(u);
                        self.visit(&mut vec![x, u, y], lu);
                        self.unblock(u);
                    }
                }
            }
        }
    }

    fn visit(&mut self, path: &mut Vec<u32>, key: usize) {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            panic!("chordless path expansion reached an empty path");
        };

        self.block(last);
        if path.len() < self.max_depth {
            for v in self.graph.neighbors(last) {
                if self.label(v) <= key || self.blocked.get(&v).copied() != Some(1) {
                    continue;
                }
                path.push(v);
                if self.graph.contains_edge(v, first) {
                    self.cycles.push(path.clone());
                } else {
                    self.visit(path, key);
                }
                path.pop();
            }
        }
        self.unblock(last);
    }

    fn block(&mut self, id: u32) {
        for n in self.graph.neighbors(id) {
            *self.blocked.entry(n).or_insert(0) += 1;
        }
    }

    fn unblock(&mut self, id: u32) {
        for n in self.graph.neighbors(id) {
            if let Some(count) = self.blocked.get_mut(&n) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::DVec2;
    use crate::procgen::graph::canonical_face;
    use std::collections::BTreeSet;

    fn lattice(w: u32, h: u32) -> Graph<DVec2> {
        let mut g = Graph::new();
        for id in 0..w * h {
            g.add_node(id, DVec2::new((id % w) as f64, (id / w) as f64));
        }
        for id in 0..w * h {
            if id % w + 1 < w {
                g.add_edge(id, id + 1);
            }
            if id + w < w * h {
                g.add_edge(id, id + w);
            }
        }
        g
    }

    fn has_chord(g: &Graph<DVec2>, cycle: &[u32]) -> bool {
        let n = cycle.len();
        (0..n).any(|i| {
            (i + 2..n).any(|j| {
                let consecutive = i == 0 && j == n - 1;
                !consecutive && g.contains_edge(cycle[i], cycle[j])
            })
        })
    }

    #[test]
    fn labels_follow_degeneracy_order() {
        let g = lattice(3, 3);
        let labels = degree_labels(&g);
        assert_eq!(labels.len(), 9);
        // A corner goes first and the opposite corner is left over at the end.
        assert_eq!(labels[&0], 0);
        assert_eq!(labels[&1], 1);
        assert_eq!(labels[&8], 8);
        let distinct: BTreeSet<usize> = labels.values().copied().collect();
        assert_eq!(distinct.len(), 9);
    }

    #[test]
    fn grid_cycles_are_chordless() {
        let g = lattice(3, 3);
        let cycles = g.chordless_cycles(DEFAULT_MAX_CYCLE_DEPTH);

        // Four unit squares plus the outer ring.
        assert_eq!(cycles.len(), 5);
        for c in &cycles {
            assert!(!has_chord(&g, c), "cycle {c:?} has a chord");
            for i in 0..c.len() {
                assert!(g.contains_edge(c[i], c[(i + 1) % c.len()]));
            }
        }
        let unique: BTreeSet<Vec<u32>> = cycles
            .iter()
            .map(|c| {
                let mut sorted = c.clone();
                sorted.sort_unstable();
                sorted
            })
            .collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn triangles_are_found_directly() {
        let mut g = Graph::new();
        for (id, p) in [(1, DVec2::ZERO), (2, DVec2::X), (3, DVec2::Y), (4, DVec2::ONE)] {
            g.add_node(id, p);
        }
        for (a, b) in [(1, 2), (2, 3), (3, 1), (2, 4), (4, 3)] {
            g.add_edge(a, b);
        }
        let cycles = g.chordless_cycles(DEFAULT_MAX_CYCLE_DEPTH);
        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().all(|c| c.len() == 3));
    }

    #[test]
    fn depth_cap_omits_long_cycles() {
        let g = lattice(3, 3);
        let short = g.chordless_cycles(4);
        assert_eq!(short.len(), 4);
        assert!(short.iter().all(|c| c.len() == 4));

        let faces: BTreeSet<Vec<u32>> = short.iter().map(|c| canonical_face(c)).collect();
        assert_eq!(faces.len(), 4);
    }
}
