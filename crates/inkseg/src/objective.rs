//! Objective functions: how well does a partition fit the stroke?
//!
//! An [`ObjectiveFunction`] scores a stroke together with a corner list.
//! Scores are non-negative and 0 means a perfect fit, so partition
//! searches minimise them. Three objectives are provided:
//!
//! - [`PolylineMse`]: squared perpendicular distance of every point to
//!   the chord of its segment, summed and divided by the stroke's point
//!   count.
//! - [`PolylineFeatureArea`]: area enclosed between each segment's path
//!   and its chord, summed over segments.
//! - [`PrimitiveFitError`]: best primitive-fit residual per segment,
//!   with a fixed penalty for segments too short to fit.
//!
//! Partition searches score many degenerate candidates. [`score`] never
//! fails: anything it cannot score maps to [`DEGENERATE_SCORE`].
//! [`try_score`] is the strict form for callers that want to know why.
//!
//! [`score`]: ObjectiveFunction::score
//! [`try_score`]: ObjectiveFunction::try_score

use serde::{Deserialize, Serialize};

use crate::deadline::{Checkpoint, DEFAULT_CHECKPOINT_INTERVAL, Deadline, TimeoutError};
use crate::geometry::{line_frame, perpendicular_distance_squared, shoelace_area};
use crate::primitive::{BasicFitter, PrimitiveFitter};
use crate::types::{SegmentationError, Stroke, validate_corners};

/// Sentinel for partitions that cannot be scored: fewer than two
/// corners, out-of-range indices, numeric failure, or no usable fit.
///
/// Ranks after every real score.
pub const DEGENERATE_SCORE: f64 = f64::MAX;

/// A pure scoring function over a stroke and a corner list.
pub trait ObjectiveFunction {
    /// Short identifier, e.g. `"polyline-mse"`.
    fn name(&self) -> &str;

    /// Raw score for a corner list already known to be valid: sorted,
    /// strictly increasing, in range, at least two entries.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if `checkpoint` reports an expired
    /// deadline.
    fn solve(
        &self,
        stroke: &Stroke,
        corners: &[usize],
        checkpoint: &mut Checkpoint,
    ) -> Result<f64, TimeoutError>;

    /// Infallible score for partition search.
    ///
    /// Corners are sorted and deduplicated first. Fewer than two
    /// distinct corners, an index past the end of the stroke, or a
    /// non-finite result all give [`DEGENERATE_SCORE`].
    fn score(&self, stroke: &Stroke, corners: &[usize]) -> f64 {
        let mut sorted = corners.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() < 2 || sorted.last().is_some_and(|&c| c >= stroke.len()) {
            return DEGENERATE_SCORE;
        }
        let mut checkpoint = Deadline::unbounded().checkpoint(usize::MAX);
        self.solve(stroke, &sorted, &mut checkpoint)
            .map_or(DEGENERATE_SCORE, sanitize)
    }

    /// Strict score under a deadline.
    ///
    /// Numeric failures still map to [`DEGENERATE_SCORE`]; only input
    /// and time errors are reported.
    ///
    /// # Errors
    ///
    /// Returns the [`validate_corners`] errors for a malformed corner
    /// list, or [`SegmentationError::Timeout`] if the deadline expires.
    fn try_score(
        &self,
        stroke: &Stroke,
        corners: &[usize],
        deadline: Deadline,
    ) -> Result<f64, SegmentationError> {
        validate_corners(corners, stroke.len())?;
        let mut checkpoint = deadline.checkpoint(DEFAULT_CHECKPOINT_INTERVAL);
        checkpoint.check_now()?;
        Ok(sanitize(self.solve(stroke, corners, &mut checkpoint)?))
    }
}

/// Map NaN, infinities, and negative values to [`DEGENERATE_SCORE`].
fn sanitize(score: f64) -> f64 {
    if score.is_finite() && score >= 0.0 {
        score
    } else {
        DEGENERATE_SCORE
    }
}

/// Polyline mean squared error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolylineMse;

impl ObjectiveFunction for PolylineMse {
    fn name(&self) -> &str {
        "polyline-mse"
    }

    fn solve(
        &self,
        stroke: &Stroke,
        corners: &[usize],
        checkpoint: &mut Checkpoint,
    ) -> Result<f64, TimeoutError> {
        let points = stroke.points();
        let mut total = 0.0;
        for w in corners.windows(2) {
            let (a, b) = (points[w[0]], points[w[1]]);
            for &p in &points[w[0]..=w[1]] {
                checkpoint.tick()?;
                total += perpendicular_distance_squared(p, a, b);
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        Ok(total / n)
    }
}

/// Polyline feature-area error.
///
/// Each path step is compared with its projection onto the segment's
/// chord: a trapezoid when both ends sit on the same side, two
/// triangles when the step crosses the chord. A segment whose endpoints
/// coincide (a closed loop) has no chord and scores its shoelace area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolylineFeatureArea;

impl ObjectiveFunction for PolylineFeatureArea {
    fn name(&self) -> &str {
        "polyline-feature-area"
    }

    fn solve(
        &self,
        stroke: &Stroke,
        corners: &[usize],
        checkpoint: &mut Checkpoint,
    ) -> Result<f64, TimeoutError> {
        let points = stroke.points();
        let mut total = 0.0;
        for w in corners.windows(2) {
            let run = &points[w[0]..=w[1]];
            let (a, b) = (points[w[0]], points[w[1]]);
            let mut frames = Vec::with_capacity(run.len());
            for &p in run {
                checkpoint.tick()?;
                match line_frame(p, a, b) {
                    Some(frame) => frames.push(frame),
                    None => break,
                }
            }
            if frames.len() < run.len() {
                total += shoelace_area(run);
                continue;
            }
            total += frames
                .windows(2)
                .map(|f| step_area(f[0], f[1]))
                .sum::<f64>();
        }
        Ok(total)
    }
}

/// Area between one path step and its projection on the chord, given
/// both ends as `(along, offset)` chord coordinates.
fn step_area((s0, h0): (f64, f64), (s1, h1): (f64, f64)) -> f64 {
    let ds = (s1 - s0).abs();
    let (a, b) = (h0.abs(), h1.abs());
    if h0 * h1 >= 0.0 {
        ds * (a + b) / 2.0
    } else {
        ds * a.mul_add(a, b * b) / (2.0 * (a + b))
    }
}

/// Primitive-fit error with a pluggable fitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveFitError<F = BasicFitter> {
    /// Fitter consulted for each segment.
    pub fitter: F,
    /// Cost charged for a segment with fewer than two steps between its
    /// corners.
    pub short_segment_penalty: f64,
}

impl<F> PrimitiveFitError<F> {
    /// Default for [`short_segment_penalty`](Self::short_segment_penalty).
    pub const DEFAULT_SHORT_SEGMENT_PENALTY: f64 = 0.1;

    /// Objective using `fitter` and the default penalty.
    pub const fn new(fitter: F) -> Self {
        Self {
            fitter,
            short_segment_penalty: Self::DEFAULT_SHORT_SEGMENT_PENALTY,
        }
    }
}

impl Default for PrimitiveFitError<BasicFitter> {
    fn default() -> Self {
        Self::new(BasicFitter)
    }
}

impl<F: PrimitiveFitter> ObjectiveFunction for PrimitiveFitError<F> {
    fn name(&self) -> &str {
        "primitive-fit"
    }

    fn solve(
        &self,
        stroke: &Stroke,
        corners: &[usize],
        checkpoint: &mut Checkpoint,
    ) -> Result<f64, TimeoutError> {
        let points = stroke.points();
        let mut total = 0.0;
        for w in corners.windows(2) {
            checkpoint.tick()?;
            if w[1] - w[0] < 2 {
                total += self.short_segment_penalty;
                continue;
            }
            let best = self
                .fitter
                .fit(&points[w[0]..=w[1]])
                .into_iter()
                .map(|fit| fit.error)
                .filter(|e| e.is_finite())
                .reduce(f64::min);
            match best {
                Some(error) => total += error,
                None => return Ok(DEGENERATE_SCORE),
            }
        }
        Ok(total)
    }
}

/// Selects one of the polyline objectives by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// [`PolylineMse`].
    #[default]
    PolylineMse,
    /// [`PolylineFeatureArea`].
    PolylineFeatureArea,
}

impl ObjectiveKind {
    /// Both polyline objectives.
    pub const ALL: [Self; 2] = [Self::PolylineMse, Self::PolylineFeatureArea];
}

impl ObjectiveFunction for ObjectiveKind {
    fn name(&self) -> &str {
        match *self {
            Self::PolylineMse => PolylineMse.name(),
            Self::PolylineFeatureArea => PolylineFeatureArea.name(),
        }
    }

    fn solve(
        &self,
        stroke: &Stroke,
        corners: &[usize],
        checkpoint: &mut Checkpoint,
    ) -> Result<f64, TimeoutError> {
        match *self {
            Self::PolylineMse => PolylineMse.solve(stroke, corners, checkpoint),
            Self::PolylineFeatureArea => PolylineFeatureArea.solve(stroke, corners, checkpoint),
        }
    }
}
