//! 2D geometric primitives shared by road growth and parcel subdivision.
//!
//! Directions on road segments are expressed in degrees, measured clockwise
//! from the +Y axis, so a bearing of 90 points along +X.

use bevy::math::DVec2;
use rand::Rng;

/// Squared distance below which two points are considered equal.
pub const POINT_EPSILON_SQ: f64 = 1e-8;

/// Tolerance on twice the triangle area for collinearity tests.
pub const COLLINEAR_EPSILON: f64 = 1e-6;

/// Result of intersecting two line segments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineIntersection {
    pub point: DVec2,
    /// Parameter along the first segment, 0 at its start and 1 at its end.
    pub t: f64,
}

/// Intersect segment `a`-`b` with segment `p`-`d`.
///
/// When `exclusive` is set, hits within 0.1% of either segment's endpoints are
/// ignored so that segments sharing an endpoint do not report a crossing.
pub fn segment_intersection(
    a: DVec2,
    b: DVec2,
    p: DVec2,
    d: DVec2,
    exclusive: bool,
) -> Option<LineIntersection> {
    let ab = b - a;
    let pd = d - p;
    let ap = p - a;
    let denom = ab.perp_dot(pd);
    if denom == 0.0 {
        return None;
    }

    let f = ap.perp_dot(ab) / denom;
    let e = ap.perp_dot(pd) / denom;

    let hit = if exclusive {
        0.001 < e && e < 0.999 && 0.001 < f && f < 0.999
    } else {
        (0.0..=1.0).contains(&e) && (0.0..=1.0).contains(&f)
    };

    hit.then(|| LineIntersection {
        point: a + ab * e,
        t: e,
    })
}

/// Smallest difference between two bearings, treating opposite directions as equal.
pub fn min_degree_difference(a: f64, b: f64) -> f64 {
    let bottom = (a - b).abs() % 180.0;
    bottom.min((bottom - 180.0).abs())
}

pub fn equal_points(a: DVec2, b: DVec2) -> bool {
    (a - b).length_squared() < POINT_EPSILON_SQ
}

/// Unsigned angle between two vectors, in degrees.
pub fn angle_between(a: DVec2, b: DVec2) -> f64 {
    let denom = a.length() * b.length();
    if denom == 0.0 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

pub fn sign(value: f64) -> i32 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Bearing of `delta` in degrees, clockwise from +Y.
pub fn bearing(delta: DVec2) -> f64 {
    let angle = angle_between(DVec2::Y, delta);
    match sign(DVec2::Y.perp_dot(delta)) {
        0 => angle,
        s => -f64::from(s) * angle,
    }
}

/// Point reached by walking `length` from `start` along `bearing` degrees.
pub fn point_along_bearing(start: DVec2, bearing: f64, length: f64) -> DVec2 {
    let rad = bearing.to_radians();
    DVec2::new(start.x + length * rad.sin(), start.y + length * rad.cos())
}

/// Projection of a point onto the line through `a` and `b`.
#[derive(Clone, Copy, Debug)]
pub struct DistanceToLine {
    /// Squared distance from the point to its projection.
    pub distance2: f64,
    pub point_on_line: DVec2,
    /// Signed squared length of the projection measured from `a`.
    pub line_proj2: f64,
    /// Squared length of `a`-`b`.
    pub length2: f64,
}

impl DistanceToLine {
    /// Whether the projection falls between `a` and `b`.
    pub fn within_segment(&self) -> bool {
        self.line_proj2 >= 0.0 && self.line_proj2 <= self.length2
    }
}

pub fn distance_to_line(point: DVec2, a: DVec2, b: DVec2) -> DistanceToLine {
    let to_point = point - a;
    let line = b - a;
    let length2 = line.length_squared();
    let dot = to_point.dot(line);
    let projected = if length2 > 0.0 {
        line * (dot / length2)
    } else {
        DVec2::ZERO
    };
    let point_on_line = a + projected;

    DistanceToLine {
        distance2: (point_on_line - point).length_squared(),
        point_on_line,
        line_proj2: f64::from(sign(dot)) * projected.length_squared(),
        length2,
    }
}

/// Random non-zero value in `(-limit, limit)` biased towards zero.
///
/// A sample `c` is kept with probability `1 - |c|^3 / limit^3`.
pub fn random_near_cubic<R: Rng>(rng: &mut R, limit: f64) -> f64 {
    let limit = limit.abs();
    if limit == 0.0 {
        return 0.0;
    }
    let d = limit.powi(3);
    loop {
        let c: f64 = rng.gen_range(-limit..limit);
        if c == 0.0 {
            continue;
        }
        if rng.gen::<f64>() >= c.abs().powi(3) / d {
            return c;
        }
    }
}

/// Whether three points lie on one line.
pub fn are_collinear(p1: DVec2, p2: DVec2, p3: DVec2) -> bool {
    (p2 - p1).perp_dot(p3 - p1).abs() <= COLLINEAR_EPSILON
}

pub fn are_four_collinear(p1: DVec2, p2: DVec2, p3: DVec2, p4: DVec2) -> bool {
    are_collinear(p1, p2, p3) && are_collinear(p1, p2, p4) && are_collinear(p1, p3, p4)
}

/// Rotate `point` around `center` by `angle` radians, counter-clockwise.
pub fn rotate_around(point: DVec2, center: DVec2, angle: f64) -> DVec2 {
    let (sin, cos) = angle.sin_cos();
    let d = point - center;
    DVec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos) + center
}
