//! Corner detection using the Ramer-Douglas-Peucker algorithm.
//!
//! Splits the stroke at the point farthest from the chord between the
//! current endpoints whenever that distance exceeds a tolerance, and
//! repeats on both halves. Every split point is reported as a corner.
//! The tolerance scales with the stroke's bounding-box diagonal so the
//! result does not depend on drawing size.

use serde::{Deserialize, Serialize};

use crate::deadline::{Checkpoint, DEFAULT_CHECKPOINT_INTERVAL, Deadline, TimeoutError};
use crate::detector::{CornerDetector, single_segmentation};
use crate::geometry::perpendicular_distance;
use crate::types::{Point, Segmentation, Stroke};

/// Recursive farthest-point splitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DouglasPeucker {
    /// Split tolerance as a fraction of the bounding-box diagonal.
    pub tolerance_ratio: f64,
    /// Lower bound on the split tolerance, in stroke units.
    pub min_tolerance: f64,
}

impl DouglasPeucker {
    /// Label attached to this detector's segmentations.
    pub const LABEL: &'static str = "Douglas-Peucker";

    /// Default for [`tolerance_ratio`](Self::tolerance_ratio).
    pub const DEFAULT_TOLERANCE_RATIO: f64 = 0.015;

    /// Default for [`min_tolerance`](Self::min_tolerance).
    pub const DEFAULT_MIN_TOLERANCE: f64 = 1.0;

    /// Effective split tolerance for `stroke`.
    #[must_use]
    pub fn tolerance(&self, stroke: &Stroke) -> f64 {
        (self.tolerance_ratio * stroke.bounding_box().diagonal()).max(self.min_tolerance)
    }

    /// Interior corner indices in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline expires mid-scan.
    pub fn corners(&self, stroke: &Stroke, deadline: Deadline) -> Result<Vec<usize>, TimeoutError> {
        let points = stroke.points();
        let mut checkpoint = deadline.checkpoint(DEFAULT_CHECKPOINT_INTERVAL);
        checkpoint.check_now()?;
        if points.len() < 3 {
            return Ok(Vec::new());
        }

        let mut kept = vec![false; points.len()];
        rdp_split(points, self.tolerance(stroke), &mut kept, &mut checkpoint)?;

        Ok(kept
            .iter()
            .enumerate()
            .filter(|&(_, k)| *k)
            .map(|(i, _)| i)
            .collect())
    }
}

impl Default for DouglasPeucker {
    fn default() -> Self {
        Self {
            tolerance_ratio: Self::DEFAULT_TOLERANCE_RATIO,
            min_tolerance: Self::DEFAULT_MIN_TOLERANCE,
        }
    }
}

impl CornerDetector for DouglasPeucker {
    fn label(&self) -> &str {
        Self::LABEL
    }

    fn detect(
        &self,
        stroke: &Stroke,
        deadline: Deadline,
    ) -> Result<Vec<Segmentation>, TimeoutError> {
        if stroke.len() < 2 {
            return Ok(Vec::new());
        }
        let corners = self.corners(stroke, deadline)?;
        Ok(single_segmentation(stroke, corners, Self::LABEL))
    }
}

/// Ramer-Douglas-Peucker over the whole of `points`.
///
/// Pending ranges live on an explicit stack, so one-sided splits on a
/// long stroke cost heap rather than call depth. For each range the
/// point farthest from the line through its ends is found. If that
/// distance exceeds `tolerance`, the point is marked and both
/// sub-ranges are queued. The first of several equally distant points
/// wins.
fn rdp_split(
    points: &[Point],
    tolerance: f64,
    kept: &mut [bool],
    checkpoint: &mut Checkpoint,
) -> Result<(), TimeoutError> {
    let mut ranges = vec![(0, points.len() - 1)];
    while let Some((start, end)) = ranges.pop() {
        if end <= start + 1 {
            continue;
        }

        let mut max_dist = 0.0;
        let mut max_idx = start;
        for i in (start + 1)..end {
            checkpoint.tick()?;
            let d = perpendicular_distance(points[i], points[start], points[end]);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }

        if max_dist > tolerance {
            kept[max_idx] = true;
            ranges.push((max_idx, end));
            ranges.push((start, max_idx));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn stroke(coords: &[(f64, f64)]) -> Stroke {
        #[allow(clippy::cast_possible_wrap)]
        let points = coords
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Point::new(x, y, i as i64))
            .collect();
        Stroke::new(points).unwrap()
    }

    #[test]
    fn two_points_have_no_interior_corners() {
        let s = stroke(&[(0.0, 0.0), (10.0, 0.0)]);
        let segs = DouglasPeucker::default().detect(&s, Deadline::unbounded()).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].corners(), &[0, 1]);
    }

    #[test]
    fn collinear_points_collapse_to_endpoints() {
        let s = stroke(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0)]);
        let segs = DouglasPeucker::default().detect(&s, Deadline::unbounded()).unwrap();
        assert_eq!(segs[0].corners(), &[0, 4]);
        assert!((segs[0].confidence() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zigzag_retains_peaks() {
        let s = stroke(&[(0.0, 0.0), (2.0, 5.0), (4.0, 0.0), (6.0, 5.0), (8.0, 0.0)]);
        let corners = DouglasPeucker::default().corners(&s, Deadline::unbounded()).unwrap();
        assert_eq!(corners, vec![1, 2, 3]);
    }

    #[test]
    fn large_tolerance_collapses_zigzag() {
        let s = stroke(&[(0.0, 0.0), (2.0, 5.0), (4.0, 0.0), (6.0, 5.0), (8.0, 0.0)]);
        let detector = DouglasPeucker {
            min_tolerance: 10.0,
            ..DouglasPeucker::default()
        };
        assert!(detector.corners(&s, Deadline::unbounded()).unwrap().is_empty());
    }

    #[test]
    fn right_angle_splits_at_both_turns() {
        // Points 1 and 2 are equally far from the 0-3 chord; the first
        // wins, then 2 is split off the remaining half.
        let s = stroke(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let corners = DouglasPeucker::default().corners(&s, Deadline::unbounded()).unwrap();
        assert_eq!(corners, vec![1, 2]);
    }

    #[test]
    fn one_sided_splits_on_a_long_stroke() {
        // Around the unit circle in steps just under a quarter turn, the
        // point before the end is always farthest from the chord through
        // the origin, so every split peels off one point.
        let n = 10_000;
        let step = std::f64::consts::FRAC_PI_2 * (1.0 - 1.0 / (2.0 * f64::from(n)));
        let mut coords = vec![(0.0, 0.0)];
        coords.extend((1..=n).map(|j| {
            let angle = f64::from(j) * step;
            (angle.cos(), angle.sin())
        }));
        let s = stroke(&coords);
        let detector = DouglasPeucker {
            tolerance_ratio: 0.0,
            min_tolerance: 0.5,
        };
        let corners = detector.corners(&s, Deadline::unbounded()).unwrap();
        let expected: Vec<usize> = (1..s.last_index()).collect();
        assert_eq!(corners, expected);
    }

    #[test]
    fn tolerance_scales_with_size() {
        let small = stroke(&[(0.0, 0.0), (3.0, 4.0)]);
        let large = stroke(&[(0.0, 0.0), (300.0, 400.0)]);
        let detector = DouglasPeucker::default();
        assert!((detector.tolerance(&small) - 1.0).abs() < f64::EPSILON);
        assert!((detector.tolerance(&large) - 7.5).abs() < 1e-9);
    }

    #[test]
    fn expired_deadline_times_out() {
        let s = stroke(&[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
        let result = DouglasPeucker::default().detect(&s, Deadline::new(Duration::ZERO));
        assert!(result.is_err());
    }
}
