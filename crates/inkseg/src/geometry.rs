//! Small planar geometry helpers shared by detectors and objective
//! functions.

use std::f64::consts::{PI, TAU};

use crate::types::{Point, Stroke};

/// Perpendicular distance from point `p` to the infinite line through
/// `a` and `b`.
///
/// Uses the formula: |cross(b-a, p-a)| / |b-a|.
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
#[must_use]
pub fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    perpendicular_distance_squared(p, a, b).sqrt()
}

/// Squared form of [`perpendicular_distance`].
#[must_use]
pub fn perpendicular_distance_squared(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        // a and b are the same point.
        return p.distance_squared(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross * cross / length_sq
}

/// Coordinates of `p` in the frame of the line from `a` to `b`:
/// `(along, offset)` where `along` is the signed distance of the
/// projection from `a` and `offset` the signed perpendicular distance
/// (positive to the left of the direction of travel).
///
/// Returns `None` when `a` and `b` coincide.
#[must_use]
pub fn line_frame(p: Point, a: Point, b: Point) -> Option<(f64, f64)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length = dx.hypot(dy);
    if length == 0.0 {
        return None;
    }
    let px = p.x - a.x;
    let py = p.y - a.y;
    let along = px.mul_add(dx, py * dy) / length;
    let offset = dx.mul_add(py, -(dy * px)) / length;
    Some((along, offset))
}

/// Direction of travel from `a` to `b` in radians, `(-PI, PI]`.
#[must_use]
pub fn direction(a: Point, b: Point) -> f64 {
    (b.y - a.y).atan2(b.x - a.x)
}

/// Signed change from heading `from` to heading `to`, wrapped to
/// `(-PI, PI]`.
#[must_use]
pub fn turn_angle(from: f64, to: f64) -> f64 {
    let mut delta = (to - from) % TAU;
    if delta > PI {
        delta -= TAU;
    } else if delta <= -PI {
        delta += TAU;
    }
    delta
}

/// Headings of each consecutive point pair, unwrapped so neighbouring
/// values never jump by more than `PI`.
///
/// Returns `points.len() - 1` values (empty for fewer than 2 points).
#[must_use]
pub fn unwrapped_directions(points: &[Point]) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(points.len().saturating_sub(1));
    for w in points.windows(2) {
        let heading = direction(w[0], w[1]);
        let value = match out.last() {
            Some(&prev) => prev + turn_angle(prev, heading),
            None => heading,
        };
        out.push(value);
    }
    out
}

/// Absolute area of the closed polygon through `points` (shoelace).
#[must_use]
pub fn shoelace_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let origin = points[0];
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p, q)| (p.x - origin.x).mul_add(q.y - origin.y, -((q.x - origin.x) * (p.y - origin.y))))
        .sum();
    twice.abs() / 2.0
}

/// Ratio of chord length to path length between two stroke indices.
///
/// 1.0 means the points between `start` and `end` lie on a straight
/// line. A zero-length path also reports 1.0.
#[must_use]
pub fn straightness(stroke: &Stroke, start: usize, end: usize) -> f64 {
    let path = stroke.path_length_between(start, end);
    if path <= 0.0 {
        return 1.0;
    }
    let (Some(a), Some(b)) = (stroke.point(start), stroke.point(end)) else {
        return 1.0;
    };
    (a.distance(b) / path).clamp(0.0, 1.0)
}

/// Mean straightness of the segments between consecutive corners.
///
/// Used by the polyline detectors as their confidence: a partition
/// whose pieces are all straight is one they are sure about.
#[must_use]
pub fn mean_straightness(stroke: &Stroke, corners: &[usize]) -> f64 {
    if corners.len() < 2 {
        return 1.0;
    }
    let total: f64 = corners
        .windows(2)
        .map(|w| straightness(stroke, w[0], w[1]))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let count = (corners.len() - 1) as f64;
    total / count
}

/// Arithmetic mean and population standard deviation.
///
/// Returns `(0.0, 0.0)` for an empty slice.
#[must_use]
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
