//! Bounds-keyed quadtree used for conflict queries while roads grow.
//!
//! Objects are stored in every child whose quadrant they overlap, so a query
//! may return the same payload more than once. Callers dedupe.

use bevy::math::DVec2;

/// Axis-aligned rectangle with its origin at the minimum corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing both points.
    pub fn from_points(a: DVec2, b: DVec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    pub fn min(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }

    pub fn max(&self) -> DVec2 {
        DVec2::new(self.x + self.width, self.y + self.height)
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// Closed-interval overlap test.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }

    pub fn contains_point(&self, p: DVec2) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

#[derive(Clone, Debug)]
pub struct Quadtree<T: Clone> {
    bounds: Bounds,
    max_objects: usize,
    max_levels: usize,
    level: usize,
    objects: Vec<(Bounds, T)>,
    nodes: Vec<Quadtree<T>>,
}

impl<T: Clone> Quadtree<T> {
    pub fn new(bounds: Bounds, max_objects: usize, max_levels: usize) -> Self {
        Self::with_level(bounds, max_objects, max_levels, 0)
    }

    fn with_level(bounds: Bounds, max_objects: usize, max_levels: usize, level: usize) -> Self {
        Self {
            bounds,
            max_objects,
            max_levels,
            level,
            objects: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn split(&mut self) {
        let next = self.level + 1;
        let w = self.bounds.width / 2.0;
        let h = self.bounds.height / 2.0;
        let x = self.bounds.x;
        let y = self.bounds.y;

        // Top right, top left, bottom left, bottom right.
        self.nodes = vec![
            Self::with_level(Bounds::new(x + w, y, w, h), self.max_objects, self.max_levels, next),
            Self::with_level(Bounds::new(x, y, w, h), self.max_objects, self.max_levels, next),
            Self::with_level(Bounds::new(x, y + h, w, h), self.max_objects, self.max_levels, next),
            Self::with_level(
                Bounds::new(x + w, y + h, w, h),
                self.max_objects,
                self.max_levels,
                next,
            ),
        ];
    }

    /// Indices of the children overlapped by `rect`.
    fn quadrants(&self, rect: &Bounds) -> impl Iterator<Item = usize> {
        let mid_x = self.bounds.x + self.bounds.width / 2.0;
        let mid_y = self.bounds.y + self.bounds.height / 2.0;

        let top = rect.y <= mid_y;
        let bottom = rect.y + rect.height > mid_y;
        let left = rect.x <= mid_x;
        let right = rect.x + rect.width > mid_x;

        [top && right, top && left, bottom && left, bottom && right]
            .into_iter()
            .enumerate()
            .filter_map(|(i, hit)| hit.then_some(i))
    }

    pub fn insert(&mut self, rect: Bounds, object: T) {
        if !self.nodes.is_empty() {
            for i in self.quadrants(&rect).collect::<Vec<_>>() {
                self.nodes[i].insert(rect, object.clone());
            }
            return;
        }

        self.objects.push((rect, object));

        if self.objects.len() > self.max_objects && self.level < self.max_levels {
            self.split();
            for (r, o) in std::mem::take(&mut self.objects) {
                for i in self.quadrants(&r).collect::<Vec<_>>() {
                    self.nodes[i].insert(r, o.clone());
                }
            }
        }
    }

    /// Every object stored in a leaf whose quadrant overlaps `rect`.
    pub fn retrieve(&self, rect: &Bounds) -> Vec<T> {
        let mut out = Vec::new();
        self.collect_into(rect, &mut out);
        out
    }

    fn collect_into(&self, rect: &Bounds, out: &mut Vec<T>) {
        out.extend(self.objects.iter().map(|(_, o)| o.clone()));
        for i in self.quadrants(rect) {
            if let Some(node) = self.nodes.get(i) {
                node.collect_into(rect, out);
            }
        }
    }

    /// Number of stored entries, counting straddling objects once per leaf.
    pub fn len(&self) -> usize {
        self.objects.len() + self.nodes.iter().map(Quadtree::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
