//! Corner detection from curvature and pen speed.
//!
//! People slow down at corners and the path bends sharply there, so
//! both signals nominate candidates:
//!
//! - **Curvature**: turn angle per unit length at each vertex. Local
//!   maxima at or above the stroke's mean (scaled by `curvature_factor`)
//!   are candidates, strongest first.
//! - **Speed**: path length per millisecond around each vertex. Local
//!   minima below `speed_factor` of the mean speed are candidates,
//!   slowest first.
//!
//! A hybrid fit then grows the corner set one candidate at a time,
//! taking whichever list's next candidate lowers the polyline MSE more,
//! until the fit error is small relative to the stroke's size.

use serde::{Deserialize, Serialize};

use crate::deadline::{Checkpoint, DEFAULT_CHECKPOINT_INTERVAL, Deadline, TimeoutError};
use crate::detector::{CornerDetector, local_peaks, single_segmentation};
use crate::geometry::{direction, turn_angle};
use crate::objective::{ObjectiveFunction, PolylineMse};
use crate::types::{Point, Segmentation, Stroke};

/// Curvature and speed corner finder with hybrid-fit selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sezgin {
    /// Curvature candidates must reach this multiple of the mean curvature.
    pub curvature_factor: f64,
    /// Curvature candidates must also turn by more than this (radians).
    pub min_turn: f64,
    /// Speed candidates must be below this multiple of the mean speed.
    pub speed_factor: f64,
    /// Stop once the fit's MSE drops to `(error_ratio * diagonal)^2`.
    pub error_ratio: f64,
}

impl Sezgin {
    /// Label attached to this detector's segmentations.
    pub const LABEL: &'static str = "Sezgin";

    /// Default for [`curvature_factor`](Self::curvature_factor).
    pub const DEFAULT_CURVATURE_FACTOR: f64 = 1.0;

    /// Default for [`min_turn`](Self::min_turn): 22.5 degrees.
    pub const DEFAULT_MIN_TURN: f64 = std::f64::consts::FRAC_PI_8;

    /// Default for [`speed_factor`](Self::speed_factor).
    pub const DEFAULT_SPEED_FACTOR: f64 = 0.9;

    /// Default for [`error_ratio`](Self::error_ratio).
    pub const DEFAULT_ERROR_RATIO: f64 = 0.01;

    /// Interior corner indices in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline expires mid-scan.
    pub fn corners(&self, stroke: &Stroke, deadline: Deadline) -> Result<Vec<usize>, TimeoutError> {
        let mut checkpoint = deadline.checkpoint(DEFAULT_CHECKPOINT_INTERVAL);
        checkpoint.check_now()?;
        let points = stroke.points();
        if points.len() < 3 {
            return Ok(Vec::new());
        }

        let by_curvature = self.curvature_candidates(points, &mut checkpoint)?;
        let by_speed = self.speed_candidates(points, &mut checkpoint)?;
        self.hybrid_fit(stroke, &by_curvature, &by_speed, &mut checkpoint)
    }

    /// Curvature peaks, strongest first (stable on ties).
    fn curvature_candidates(
        &self,
        points: &[Point],
        checkpoint: &mut Checkpoint,
    ) -> Result<Vec<usize>, TimeoutError> {
        let n = points.len();
        let mut turns = vec![0.0; n];
        let mut curvature = vec![0.0; n];
        for i in 1..n - 1 {
            checkpoint.tick()?;
            let before = points[i - 1].distance(points[i]);
            let after = points[i].distance(points[i + 1]);
            if before > 0.0 && after > 0.0 {
                let turn = turn_angle(
                    direction(points[i - 1], points[i]),
                    direction(points[i], points[i + 1]),
                )
                .abs();
                turns[i] = turn;
                curvature[i] = turn / f64::midpoint(before, after);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = curvature[1..n - 1].iter().sum::<f64>() / (n - 2) as f64;
        let threshold = mean * self.curvature_factor;
        let mut candidates = local_peaks(&curvature, |i, c| {
            c >= threshold && turns[i] > self.min_turn
        });
        candidates.sort_by(|&a, &b| curvature[b].total_cmp(&curvature[a]));
        Ok(candidates)
    }

    /// Speed minima, slowest first (stable on ties).
    ///
    /// Vertices whose neighbours share a timestamp, or whose timestamp
    /// span overflows `i64`, have no speed and never qualify.
    fn speed_candidates(
        &self,
        points: &[Point],
        checkpoint: &mut Checkpoint,
    ) -> Result<Vec<usize>, TimeoutError> {
        let n = points.len();
        let mut speed: Vec<Option<f64>> = vec![None; n];
        for i in 1..n - 1 {
            checkpoint.tick()?;
            if let Some(dt) = points[i + 1].t.checked_sub(points[i - 1].t)
                && dt > 0
            {
                let travelled = points[i - 1].distance(points[i]) + points[i].distance(points[i + 1]);
                #[allow(clippy::cast_precision_loss)]
                let value = travelled / dt as f64;
                speed[i] = Some(value);
            }
        }

        let known: Vec<f64> = speed.iter().flatten().copied().collect();
        if known.is_empty() {
            return Ok(Vec::new());
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = known.iter().sum::<f64>() / known.len() as f64;
        let limit = mean * self.speed_factor;

        let at = |j: usize| speed[j].unwrap_or(f64::INFINITY);
        let mut candidates: Vec<usize> = (1..n - 1)
            .filter(|&i| speed[i].is_some_and(|s| s < limit && s <= at(i - 1) && s <= at(i + 1)))
            .collect();
        candidates.sort_by(|&a, &b| at(a).total_cmp(&at(b)));
        Ok(candidates)
    }

    /// Grow the corner set from the two candidate lists.
    fn hybrid_fit(
        &self,
        stroke: &Stroke,
        by_curvature: &[usize],
        by_speed: &[usize],
        checkpoint: &mut Checkpoint,
    ) -> Result<Vec<usize>, TimeoutError> {
        let target = {
            let allowed = self.error_ratio * stroke.bounding_box().diagonal();
            allowed * allowed
        };

        let mut corners = vec![0, stroke.last_index()];
        let mut error = PolylineMse.solve(stroke, &corners, checkpoint)?;
        let mut curvature = by_curvature.iter().copied().peekable();
        let mut speed = by_speed.iter().copied().peekable();

        while error > target {
            // Skip candidates another list already contributed.
            while curvature.next_if(|c| corners.contains(c)).is_some() {}
            while speed.next_if(|c| corners.contains(c)).is_some() {}

            let from_curvature = match curvature.peek() {
                Some(&c) => Some((c, fit_with(stroke, &corners, c, checkpoint)?)),
                None => None,
            };
            let from_speed = match speed.peek() {
                Some(&c) => Some((c, fit_with(stroke, &corners, c, checkpoint)?)),
                None => None,
            };

            let (chosen, chosen_error, from_curvature_list) = match (from_curvature, from_speed) {
                (Some((_, ec)), Some((s, es))) if es < ec => (s, es, false),
                (Some((c, ec)), _) => (c, ec, true),
                (None, Some((s, es))) => (s, es, false),
                (None, None) => break,
            };
            if chosen_error >= error {
                break;
            }

            if from_curvature_list {
                curvature.next();
            } else {
                speed.next();
            }
            insert_sorted(&mut corners, chosen);
            error = chosen_error;
        }

        Ok(corners[1..corners.len() - 1].to_vec())
    }
}

impl Default for Sezgin {
    fn default() -> Self {
        Self {
            curvature_factor: Self::DEFAULT_CURVATURE_FACTOR,
            min_turn: Self::DEFAULT_MIN_TURN,
            speed_factor: Self::DEFAULT_SPEED_FACTOR,
            error_ratio: Self::DEFAULT_ERROR_RATIO,
        }
    }
}

impl CornerDetector for Sezgin {
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

/// Polyline MSE of `corners` with `candidate` added.
fn fit_with(
    stroke: &Stroke,
    corners: &[usize],
    candidate: usize,
    checkpoint: &mut Checkpoint,
) -> Result<f64, TimeoutError> {
    let mut trial = corners.to_vec();
    insert_sorted(&mut trial, candidate);
    PolylineMse.solve(stroke, &trial, checkpoint)
}

fn insert_sorted(corners: &mut Vec<usize>, value: usize) {
    if let Err(pos) = corners.binary_search(&value) {
        corners.insert(pos, value);
    }
}
