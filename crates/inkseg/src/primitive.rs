//! Primitive-shape fitting for the primitive-fit objective.
//!
//! A [`PrimitiveFitter`] takes the points of one segment and returns
//! every primitive it could fit, each with a residual error. The
//! objective only looks at the best residual, so fitters are free to
//! try as many shapes as they like.
//!
//! [`BasicFitter`] fits three shapes:
//!
//! - **Line**: orthogonal least squares through the centroid. Residuals
//!   are measured with `geo`'s point-to-line distance.
//! - **Arc**: Kåsa algebraic circle fit. Residuals are radial.
//! - **Curve**: quadratic Bézier pinned to the segment's endpoints with
//!   the control point solved by least squares over a chord-length
//!   parameterisation.
//!
//! Every residual is the mean squared distance over the segment's points.

use geo::line_measures::Distance;
use geo::{Euclidean, Line};
use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Shape family of a fitted primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveKind {
    /// Straight line.
    Line,
    /// Circular arc.
    Arc,
    /// Free-form (quadratic) curve.
    Curve,
}

/// One fitted primitive and how well it matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveFit {
    /// Which shape was fitted.
    pub kind: PrimitiveKind,
    /// Mean squared residual distance. Finite and non-negative.
    pub error: f64,
}

/// Fits primitive shapes to a run of points.
pub trait PrimitiveFitter {
    /// Every primitive that could be fitted to `points`.
    ///
    /// Returns an empty list when nothing fits (for example, too few
    /// points). Implementations must not return non-finite errors.
    fn fit(&self, points: &[Point]) -> Vec<PrimitiveFit>;
}

/// Built-in fitter for lines, arcs, and quadratic curves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicFitter;

impl PrimitiveFitter for BasicFitter {
    fn fit(&self, points: &[Point]) -> Vec<PrimitiveFit> {
        [
            (PrimitiveKind::Line, fit_line(points)),
            (PrimitiveKind::Arc, fit_arc(points)),
            (PrimitiveKind::Curve, fit_curve(points)),
        ]
        .into_iter()
        .filter_map(|(kind, error)| {
            error
                .filter(|e| e.is_finite())
                .map(|error| PrimitiveFit { kind, error })
        })
        .collect()
    }
}

/// Mean of `f` over `points`.
fn mean_of(points: &[Point], f: impl Fn(Point) -> f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    points.iter().map(|&p| f(p)).sum::<f64>() / n
}

/// Centroid and second central moments `(cx, cy, sxx, syy, sxy)`.
fn moments(points: &[Point]) -> (f64, f64, f64, f64, f64) {
    let cx = mean_of(points, |p| p.x);
    let cy = mean_of(points, |p| p.y);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let u = p.x - cx;
        let v = p.y - cy;
        sxx = u.mul_add(u, sxx);
        syy = v.mul_add(v, syy);
        sxy = u.mul_add(v, sxy);
    }
    (cx, cy, sxx, syy, sxy)
}

fn fit_line(points: &[Point]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let (cx, cy, sxx, syy, sxy) = moments(points);
    let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let (dy, dx) = angle.sin_cos();

    // Span the projections so the segment covers every foot point and
    // segment distance equals line distance.
    let (lo, hi) = points.iter().fold((0.0_f64, 0.0_f64), |(lo, hi), p| {
        let t = (p.x - cx).mul_add(dx, (p.y - cy) * dy);
        (lo.min(t), hi.max(t))
    });
    let line = Line::new(
        geo::coord! { x: lo.mul_add(dx, cx), y: lo.mul_add(dy, cy) },
        geo::coord! { x: hi.mul_add(dx, cx), y: hi.mul_add(dy, cy) },
    );

    Some(mean_of(points, |p| {
        let d = Euclidean.distance(&geo::Point::new(p.x, p.y), &line);
        d * d
    }))
}

fn fit_arc(points: &[Point]) -> Option<f64> {
    if points.len() < 3 {
        return None;
    }
    let (cx, cy, suu, svv, suv) = moments(points);

    let (mut suz, mut svz, mut sz) = (0.0, 0.0, 0.0);
    for p in points {
        let u = p.x - cx;
        let v = p.y - cy;
        let z = u.mul_add(u, v * v);
        suz = u.mul_add(z, suz);
        svz = v.mul_add(z, svz);
        sz += z;
    }

    let det = suu.mul_add(svv, -(suv * suv));
    let scale = (suu + svv) * (suu + svv);
    if scale <= 0.0 || det.abs() <= 1e-12 * scale {
        // Collinear or coincident points: no circle.
        return None;
    }

    let d = (-suz).mul_add(svv, svz * suv) / det;
    let e = (-svz).mul_add(suu, suz * suv) / det;
    #[allow(clippy::cast_precision_loss)]
    let f = -sz / points.len() as f64;

    let radius_sq = d.mul_add(d, e * e) / 4.0 - f;
    if radius_sq <= 0.0 {
        return None;
    }
    let radius = radius_sq.sqrt();
    let center = Point::new(cx - d / 2.0, cy - e / 2.0, 0);

    Some(mean_of(points, |p| {
        let r = p.distance(center) - radius;
        r * r
    }))
}

fn fit_curve(points: &[Point]) -> Option<f64> {
    if points.len() < 3 {
        return None;
    }
    let p0 = points[0];
    let p2 = points[points.len() - 1];

    let mut params = Vec::with_capacity(points.len());
    let mut walked = 0.0;
    params.push(0.0);
    for w in points.windows(2) {
        walked += w[0].distance(w[1]);
        params.push(walked);
    }
    if walked <= 0.0 {
        return None;
    }
    for t in &mut params {
        *t /= walked;
    }

    let (mut num_x, mut num_y, mut den) = (0.0, 0.0, 0.0);
    for (p, &t) in points.iter().zip(&params) {
        let s = 1.0 - t;
        let w = 2.0 * t * s;
        let rx = p.x - (s * s).mul_add(p0.x, t * t * p2.x);
        let ry = p.y - (s * s).mul_add(p0.y, t * t * p2.y);
        num_x = w.mul_add(rx, num_x);
        num_y = w.mul_add(ry, num_y);
        den = w.mul_add(w, den);
    }
    if den <= 0.0 {
        return None;
    }
    let control = (num_x / den, num_y / den);

    let mut total = 0.0;
    for (p, &t) in points.iter().zip(&params) {
        let s = 1.0 - t;
        let w = 2.0 * t * s;
        let bx = (s * s).mul_add(p0.x, w.mul_add(control.0, t * t * p2.x));
        let by = (s * s).mul_add(p0.y, w.mul_add(control.1, t * t * p2.y));
        let dx = p.x - bx;
        let dy = p.y - by;
        total += dx.mul_add(dx, dy * dy);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    Some(total / n)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y, 0)).collect()
    }

    fn error_of(fits: &[PrimitiveFit], kind: PrimitiveKind) -> Option<f64> {
        fits.iter().find(|f| f.kind == kind).map(|f| f.error)
    }

    #[test]
    fn too_few_points_fit_nothing() {
        assert!(BasicFitter.fit(&[]).is_empty());
        assert!(BasicFitter.fit(&pts(&[(1.0, 1.0)])).is_empty());
    }

    #[test]
    fn two_points_fit_only_a_line() {
        let fits = BasicFitter.fit(&pts(&[(0.0, 0.0), (3.0, 4.0)]));
        assert_eq!(fits.len(), 1);
        assert_eq!(fits[0].kind, PrimitiveKind::Line);
        assert!(fits[0].error < 1e-20);
    }

    #[test]
    fn collinear_points_fit_a_line_not_an_arc() {
        let fits = BasicFitter.fit(&pts(&[(0.0, 0.0), (1.0, 2.0), (2.0, 4.0), (3.0, 6.0)]));
        assert!(error_of(&fits, PrimitiveKind::Line).unwrap() < 1e-20);
        assert!(error_of(&fits, PrimitiveKind::Arc).is_none());
        assert!(error_of(&fits, PrimitiveKind::Curve).unwrap() < 1e-20);
    }

    #[test]
    fn line_residual_is_orthogonal() {
        // Symmetric about y = 0: best line is the x axis, residual 1 everywhere.
        let fits = BasicFitter.fit(&pts(&[(0.0, 1.0), (0.0, -1.0), (10.0, 1.0), (10.0, -1.0)]));
        let line = error_of(&fits, PrimitiveKind::Line).unwrap();
        assert!((line - 1.0).abs() < 1e-9, "got {line}");
    }

    #[test]
    fn points_on_a_circle_fit_an_arc() {
        let coords: Vec<(f64, f64)> = (0..12)
            .map(|i| {
                let a = f64::from(i) * PI / 12.0;
                (5.0f64.mul_add(a.cos(), 2.0), 5.0f64.mul_add(a.sin(), -1.0))
            })
            .collect();
        let fits = BasicFitter.fit(&pts(&coords));
        let arc = error_of(&fits, PrimitiveKind::Arc).unwrap();
        let line = error_of(&fits, PrimitiveKind::Line).unwrap();
        assert!(arc < 1e-12, "arc residual {arc}");
        assert!(line > 1.0);
    }

    #[test]
    fn parabola_fits_a_curve() {
        // y = x^2 on [-1, 1] is a quadratic Bezier; chord-length
        // parameterisation keeps the residual small but not zero.
        let coords: Vec<(f64, f64)> = (-10..=10)
            .map(|i| {
                let x = f64::from(i) / 10.0;
                (x, x * x)
            })
            .collect();
        let fits = BasicFitter.fit(&pts(&coords));
        let curve = error_of(&fits, PrimitiveKind::Curve).unwrap();
        let line = error_of(&fits, PrimitiveKind::Line).unwrap();
        assert!(curve < line / 5.0, "curve {curve} line {line}");
    }

    #[test]
    fn coincident_points_fit_a_zero_line() {
        let fits = BasicFitter.fit(&pts(&[(2.0, 2.0), (2.0, 2.0), (2.0, 2.0)]));
        assert_eq!(fits.len(), 1);
        assert!(fits[0].error.abs() < f64::EPSILON);
    }
}
