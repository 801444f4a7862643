//! Corner detection by locally supported direction change.
//!
//! A single vertex rarely carries a whole corner: a pen rounding a
//! corner spreads the turn over several samples. Each vertex's direction
//! change is therefore extended over its neighbours while they stay
//! locally convex (turning the same way) and locally monotonic (each
//! further neighbour turning strictly less). Corners are the local
//! maxima of that support that exceed a threshold.

use serde::{Deserialize, Serialize};

use crate::deadline::{DEFAULT_CHECKPOINT_INTERVAL, Deadline, TimeoutError};
use crate::detector::{CornerDetector, local_peaks, single_segmentation};
use crate::geometry::{direction, turn_angle};
use crate::types::{Segmentation, Stroke};

/// Convexity and monotonicity supported corner finder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KimSquared {
    /// Maximum neighbours added on each side of a vertex.
    pub window: usize,
    /// Supported direction change a corner must exceed (radians).
    pub threshold: f64,
}

impl KimSquared {
    /// Label attached to this detector's segmentations.
    pub const LABEL: &'static str = "KimSquared";

    /// Default for [`window`](Self::window).
    pub const DEFAULT_WINDOW: usize = 3;

    /// Default for [`threshold`](Self::threshold): 30 degrees.
    pub const DEFAULT_THRESHOLD: f64 = std::f64::consts::FRAC_PI_6;

    /// Signed direction change accumulated around every vertex.
    ///
    /// Endpoints, and vertices adjacent to a zero-length step, report 0.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline expires mid-scan.
    pub fn support(&self, stroke: &Stroke, deadline: Deadline) -> Result<Vec<f64>, TimeoutError> {
        let mut checkpoint = deadline.checkpoint(DEFAULT_CHECKPOINT_INTERVAL);
        checkpoint.check_now()?;
        let points = stroke.points();
        let n = points.len();
        if n < 3 {
            return Ok(vec![0.0; n]);
        }

        let mut change = vec![0.0; n];
        for i in 1..n - 1 {
            checkpoint.tick()?;
            let (a, b, c) = (points[i - 1], points[i], points[i + 1]);
            if a.distance_squared(b) > 0.0 && b.distance_squared(c) > 0.0 {
                change[i] = turn_angle(direction(a, b), direction(b, c));
            }
        }

        let mut support = vec![0.0; n];
        for i in 1..n - 1 {
            checkpoint.tick()?;
            let own = change[i];
            if own == 0.0 {
                continue;
            }
            let mut total = own;
            for side in [Side::Left, Side::Right] {
                let mut previous = own.abs();
                for step in 1..=self.window {
                    let Some(j) = side.neighbour(i, step, n) else {
                        break;
                    };
                    let next = change[j];
                    if next * own <= 0.0 || next.abs() >= previous {
                        break;
                    }
                    total += next;
                    previous = next.abs();
                }
            }
            support[i] = total;
        }
        Ok(support)
    }

    /// Interior corner indices in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline expires mid-scan.
    pub fn corners(&self, stroke: &Stroke, deadline: Deadline) -> Result<Vec<usize>, TimeoutError> {
        let magnitude: Vec<f64> = self
            .support(stroke, deadline)?
            .into_iter()
            .map(f64::abs)
            .collect();
        Ok(local_peaks(&magnitude, |_, m| m > self.threshold))
    }
}

impl Default for KimSquared {
    fn default() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

impl CornerDetector for KimSquared {
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

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

impl Side {
    /// Interior vertex `step` places from `i`, if there is one.
    fn neighbour(self, i: usize, step: usize, n: usize) -> Option<usize> {
        let j = match self {
            Self::Left => i.checked_sub(step)?,
            Self::Right => i + step,
        };
        (j >= 1 && j + 1 < n).then_some(j)
    }
}
