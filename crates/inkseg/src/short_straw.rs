//! ShortStraw corner finding.
//!
//! The stroke is resampled at a fixed spacing, then each sample gets a
//! "straw": the distance between the samples `window` steps before and
//! after it. On a straight run the straw is about `2 * window * spacing`;
//! around a corner it shrinks. Corners are the shortest straw within each
//! run of straws below a fraction of the median. A final pass drops
//! corners whose neighbours are joined by a nearly straight path.

use serde::{Deserialize, Serialize};

use crate::deadline::{Checkpoint, DEFAULT_CHECKPOINT_INTERVAL, Deadline, TimeoutError};
use crate::detector::{CornerDetector, single_segmentation};
use crate::types::{Point, Segmentation, Stroke};

/// Straw-length corner finder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortStraw {
    /// Resample spacing is the bounding-box diagonal divided by this.
    pub resample_divisor: f64,
    /// Samples on each side of the straw.
    pub window: usize,
    /// Straws shorter than `median_factor * median` mark corner runs.
    pub median_factor: f64,
    /// Chord/path ratio above which two corners are joined by a line.
    pub line_threshold: f64,
}

/// A resampled point and the source index nearest to it.
#[derive(Debug, Clone, Copy)]
struct Sample {
    point: Point,
    source: usize,
}

impl ShortStraw {
    /// Label attached to this detector's segmentations.
    pub const LABEL: &'static str = "ShortStraw";

    /// Default for [`resample_divisor`](Self::resample_divisor).
    pub const DEFAULT_RESAMPLE_DIVISOR: f64 = 40.0;

    /// Default for [`window`](Self::window).
    pub const DEFAULT_WINDOW: usize = 3;

    /// Default for [`median_factor`](Self::median_factor).
    pub const DEFAULT_MEDIAN_FACTOR: f64 = 0.95;

    /// Default for [`line_threshold`](Self::line_threshold).
    pub const DEFAULT_LINE_THRESHOLD: f64 = 0.95;

    /// Interior corner indices (into the source stroke) in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline expires mid-scan.
    pub fn corners(&self, stroke: &Stroke, deadline: Deadline) -> Result<Vec<usize>, TimeoutError> {
        let mut checkpoint = deadline.checkpoint(DEFAULT_CHECKPOINT_INTERVAL);
        checkpoint.check_now()?;

        let window = self.window.max(1);
        let spacing = stroke.bounding_box().diagonal() / self.resample_divisor;
        if stroke.len() < 3
            || !spacing.is_finite()
            || spacing <= 0.0
            || !stroke.path_length().is_finite()
        {
            return Ok(Vec::new());
        }

        let samples = resample(stroke.points(), spacing, &mut checkpoint)?;
        let m = samples.len();
        if m < 2 * window + 1 {
            return Ok(Vec::new());
        }

        let mut straws = vec![0.0; m];
        for i in window..m - window {
            checkpoint.tick()?;
            straws[i] = samples[i - window].point.distance(samples[i + window].point);
        }

        let mut sorted = straws[window..m - window].to_vec();
        sorted.sort_by(f64::total_cmp);
        let threshold = sorted[sorted.len() / 2] * self.median_factor;

        let mut corners = vec![0];
        let mut i = window;
        while i < m - window {
            checkpoint.tick()?;
            if straws[i] < threshold {
                let mut best = i;
                while i < m - window && straws[i] < threshold {
                    if straws[i] < straws[best] {
                        best = i;
                    }
                    i += 1;
                }
                corners.push(best);
            }
            i += 1;
        }
        corners.push(m - 1);

        self.drop_line_corners(&samples, &mut corners, &mut checkpoint)?;

        Ok(corners[1..corners.len() - 1]
            .iter()
            .map(|&c| samples[c].source)
            .collect())
    }

    /// Remove corners whose neighbours are joined by a near-straight path.
    fn drop_line_corners(
        &self,
        samples: &[Sample],
        corners: &mut Vec<usize>,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), TimeoutError> {
        let mut k = 1;
        while k + 1 < corners.len() {
            checkpoint.tick()?;
            if sample_straightness(samples, corners[k - 1], corners[k + 1]) > self.line_threshold {
                corners.remove(k);
            } else {
                k += 1;
            }
        }
        Ok(())
    }
}

impl Default for ShortStraw {
    fn default() -> Self {
        Self {
            resample_divisor: Self::DEFAULT_RESAMPLE_DIVISOR,
            window: Self::DEFAULT_WINDOW,
            median_factor: Self::DEFAULT_MEDIAN_FACTOR,
            line_threshold: Self::DEFAULT_LINE_THRESHOLD,
        }
    }
}

impl CornerDetector for ShortStraw {
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

/// Resample `points` at equal path-length `spacing`.
///
/// Each sample records whichever endpoint of its source step lies
/// closer. The first and last source points are always present. A step
/// whose interpolated sample would not move (its length overflows, or
/// it is below the coordinates' precision) contributes its end point.
fn resample(
    points: &[Point],
    spacing: f64,
    checkpoint: &mut Checkpoint,
) -> Result<Vec<Sample>, TimeoutError> {
    let mut samples = vec![Sample {
        point: points[0],
        source: 0,
    }];
    let mut prev = points[0];
    let mut accumulated = 0.0;
    let mut i = 1;

    while i < points.len() {
        checkpoint.tick()?;
        let cur = points[i];
        let d = prev.distance(cur);
        if d > 0.0 && accumulated + d >= spacing {
            let f = (spacing - accumulated) / d;
            let q = Point::new(
                f.mul_add(cur.x - prev.x, prev.x),
                f.mul_add(cur.y - prev.y, prev.y),
                cur.t,
            );
            if q.distance_squared(prev) <= 0.0 {
                // The step is too small to land on; snap to its end.
                samples.push(Sample { point: cur, source: i });
                prev = cur;
                accumulated = 0.0;
                i += 1;
                continue;
            }
            let source = if q.distance_squared(points[i - 1]) <= q.distance_squared(cur) {
                i - 1
            } else {
                i
            };
            samples.push(Sample { point: q, source });
            prev = q;
            accumulated = 0.0;
        } else {
            accumulated += d;
            prev = cur;
            i += 1;
        }
    }

    let last = points.len() - 1;
    if samples.last().is_some_and(|s| s.point != points[last]) {
        samples.push(Sample {
            point: points[last],
            source: last,
        });
    }
    Ok(samples)
}

/// Chord/path ratio between two sample indices.
fn sample_straightness(samples: &[Sample], a: usize, b: usize) -> f64 {
    let path: f64 = samples[a..=b]
        .windows(2)
        .map(|w| w[0].point.distance(w[1].point))
        .sum();
    if path <= 0.0 {
        return 1.0;
    }
    samples[a].point.distance(samples[b].point) / path
}
