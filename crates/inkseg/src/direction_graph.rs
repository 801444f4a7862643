//! Corner detection from peaks in the direction graph.
//!
//! The direction graph plots the (unwrapped) heading of each stroke step
//! against its position. Straight runs are flat, arcs are ramps, and
//! corners are steps. This detector differentiates the graph, keeps the
//! local maxima that stand out from the stroke's own turning statistics,
//! and merges peaks that sit too close together along the path.

use serde::{Deserialize, Serialize};

use crate::deadline::{DEFAULT_CHECKPOINT_INTERVAL, Deadline, TimeoutError};
use crate::detector::{CornerDetector, local_peaks, single_segmentation};
use crate::geometry::{mean_and_std, unwrapped_directions};
use crate::types::{Point, Segmentation, Stroke};

/// Direction-graph peak finder (PaleoSketch style).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionGraph {
    /// Average each heading with its neighbours before differencing.
    pub smoothing: bool,
    /// Smallest turn, in radians, that can count as a corner.
    pub min_turn: f64,
    /// Peaks must reach `mean + k * stddev` of the stroke's turns.
    pub k: f64,
    /// Peaks closer than `merge_ratio * path length` collapse into the
    /// sharper one.
    pub merge_ratio: f64,
}

impl DirectionGraph {
    /// Label attached to this detector's segmentations.
    pub const LABEL: &'static str = "Paleo";

    /// Default for [`min_turn`](Self::min_turn): 22.5 degrees.
    pub const DEFAULT_MIN_TURN: f64 = std::f64::consts::FRAC_PI_8;

    /// Default for [`k`](Self::k).
    pub const DEFAULT_K: f64 = 1.0;

    /// Default for [`merge_ratio`](Self::merge_ratio).
    pub const DEFAULT_MERGE_RATIO: f64 = 0.05;

    /// Interior corner indices (into the source stroke) in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline expires mid-scan.
    pub fn corners(&self, stroke: &Stroke, deadline: Deadline) -> Result<Vec<usize>, TimeoutError> {
        let mut checkpoint = deadline.checkpoint(DEFAULT_CHECKPOINT_INTERVAL);
        checkpoint.check_now()?;

        // Repeated samples have no heading; work on distinct positions.
        let points = stroke.points();
        let mut source = vec![0];
        for i in 1..points.len() {
            checkpoint.tick()?;
            if let Some(&prev) = source.last()
                && points[i].distance_squared(points[prev]) > 0.0
            {
                source.push(i);
            }
        }
        if source.len() < 3 {
            return Ok(Vec::new());
        }

        let distinct: Vec<Point> = source.iter().map(|&i| points[i]).collect();
        let mut headings = unwrapped_directions(&distinct);
        if self.smoothing {
            headings = smooth(&headings);
        }

        // turns[v] is the heading change at distinct vertex v; endpoints stay 0.
        let mut turns = vec![0.0; distinct.len()];
        for v in 1..distinct.len() - 1 {
            checkpoint.tick()?;
            turns[v] = (headings[v] - headings[v - 1]).abs();
        }

        let (mean, std) = mean_and_std(&turns[1..turns.len() - 1]);
        let threshold = self.k.mul_add(std, mean).max(self.min_turn);
        let peaks = local_peaks(&turns, |_, turn| turn >= threshold);

        let merge_distance = self.merge_ratio * stroke.path_length();
        let mut merged: Vec<usize> = Vec::with_capacity(peaks.len());
        for v in peaks {
            checkpoint.tick()?;
            match merged.last_mut() {
                Some(last)
                    if stroke.path_length_between(source[*last], source[v]) < merge_distance =>
                {
                    if turns[v] > turns[*last] {
                        *last = v;
                    }
                }
                _ => merged.push(v),
            }
        }

        Ok(merged.into_iter().map(|v| source[v]).collect())
    }
}

impl Default for DirectionGraph {
    fn default() -> Self {
        Self {
            smoothing: false,
            min_turn: Self::DEFAULT_MIN_TURN,
            k: Self::DEFAULT_K,
            merge_ratio: Self::DEFAULT_MERGE_RATIO,
        }
    }
}

impl CornerDetector for DirectionGraph {
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

/// Three-sample moving average; the first and last values are kept.
fn smooth(values: &[f64]) -> Vec<f64> {
    if values.len() < 3 {
        return values.to_vec();
    }
    let mut out = values.to_vec();
    for i in 1..values.len() - 1 {
        out[i] = (values[i - 1] + values[i] + values[i + 1]) / 3.0;
    }
    out
}
