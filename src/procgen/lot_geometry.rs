use bevy::math::DVec2;

use super::math::{are_four_collinear, segment_intersection, sign};

/// Shoelace area, positive for counter-clockwise polygons.
pub fn signed_area(vertices: &[DVec2]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }

    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| vertices[i].perp_dot(vertices[(i + 1) % n]))
        .sum();
    twice / 2.0
}

/// Compute axis-aligned bounding box of a polygon.
pub fn polygon_bounds(vertices: &[DVec2]) -> (DVec2, DVec2) {
    let mut min = DVec2::splat(f64::MAX);
    let mut max = DVec2::splat(f64::MIN);

    for &v in vertices {
        min = min.min(v);
        max = max.max(v);
    }

    (min, max)
}

/// True when every corner turns the same way. Collinear corners are ignored.
pub fn is_convex(vertices: &[DVec2]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }

    let mut turn = 0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let c = vertices[(i + 2) % n];
        let s = sign((b - a).perp_dot(c - b));
        if s == 0 {
            continue;
        }
        if turn == 0 {
            turn = s;
        } else if s != turn {
            return false;
        }
    }
    turn != 0
}

/// Reverse `vertices` in place if they wind clockwise.
pub fn ensure_ccw<T>(vertices: &mut [T], positions: &[DVec2]) {
    if signed_area(positions) < 0.0 {
        vertices.reverse();
    }
}

/// No two non-adjacent edges touch.
pub fn is_simple(vertices: &[DVec2]) -> bool {
    let n = vertices.len();
    for i in 0..n {
        let (a1, a2) = (vertices[i], vertices[(i + 1) % n]);
        for j in i + 2..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (b1, b2) = (vertices[j], vertices[(j + 1) % n]);
            if segment_intersection(a1, a2, b1, b2, false).is_some() {
                return false;
            }
        }
    }
    true
}

/// Two edges lie on the same line and share more than a single point.
pub fn edges_overlap(a1: DVec2, a2: DVec2, b1: DVec2, b2: DVec2) -> bool {
    if !are_four_collinear(a1, a2, b1, b2) {
        return false;
    }

    let axis = (a2 - a1).normalize_or_zero();
    if axis == DVec2::ZERO {
        return false;
    }
    let (a_lo, a_hi) = (0.0_f64, (a2 - a1).dot(axis));
    let (p, q) = ((b1 - a1).dot(axis), (b2 - a1).dot(axis));
    let (b_lo, b_hi) = (p.min(q), p.max(q));

    a_hi.min(b_hi) - a_lo.max(b_lo) > 1e-6
}
