//! Corner detection: propose break points for a stroke.
//!
//! This module defines the [`CornerDetector`] trait for pluggable corner
//! heuristics and the [`CornerDetectorKind`] enum for selecting built-in
//! heuristics from configuration.
//!
//! # Strategy pattern
//!
//! Different heuristics disagree about where a stroke bends. The
//! consensus combiner ([`crate::combine`]) runs several of them over the
//! same stroke and reconciles their answers, so every detector must be a
//! pure function of the stroke and the deadline: no interior state, no
//! side effects, and the same output for the same input.

use serde::{Deserialize, Serialize};

use crate::deadline::{Deadline, TimeoutError};
use crate::direction_graph::DirectionGraph;
use crate::douglas_peucker::DouglasPeucker;
use crate::geometry::mean_straightness;
use crate::kim_squared::KimSquared;
use crate::sezgin::Sezgin;
use crate::short_straw::ShortStraw;
use crate::types::{Segmentation, Stroke};

/// Trait for corner detection strategies.
///
/// Input: a stroke and the caller's deadline.
/// Output: zero or more [`Segmentation`]s, each satisfying the usual
/// invariants, with a confidence reflecting the detector's own
/// certainty. Strokes with fewer than 2 points yield an empty list, not
/// an error.
pub trait CornerDetector {
    /// Human-readable strategy name, used as the segmentation label.
    fn label(&self) -> &str;

    /// Propose segmentations for `stroke`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline expires before the
    /// detector finishes. "Found no corners" is not an error: it is a
    /// segmentation holding only the endpoints.
    fn detect(&self, stroke: &Stroke, deadline: Deadline)
    -> Result<Vec<Segmentation>, TimeoutError>;
}

/// A detector that can be shared across threads behind a box.
pub type BoxedDetector = Box<dyn CornerDetector + Send + Sync>;

/// Selects a built-in corner detector with its default parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CornerDetectorKind {
    /// Straw-length minima on a resampled copy of the stroke.
    ShortStraw,
    /// Recursive farthest-point splitting.
    DouglasPeucker,
    /// Peaks in the direction graph (PaleoSketch style).
    DirectionGraph,
    /// Curvature and pen speed candidates merged by a hybrid fit.
    Sezgin,
    /// Direction change supported by local convexity and monotonicity.
    KimSquared,
}

impl CornerDetectorKind {
    /// Every built-in detector, in the order the combiner runs them by
    /// default.
    pub const ALL: [Self; 5] = [
        Self::ShortStraw,
        Self::DouglasPeucker,
        Self::DirectionGraph,
        Self::Sezgin,
        Self::KimSquared,
    ];

    /// Build a boxed detector with default parameters.
    #[must_use]
    pub fn build(self) -> BoxedDetector {
        match self {
            Self::ShortStraw => Box::new(ShortStraw::default()),
            Self::DouglasPeucker => Box::new(DouglasPeucker::default()),
            Self::DirectionGraph => Box::new(DirectionGraph::default()),
            Self::Sezgin => Box::new(Sezgin::default()),
            Self::KimSquared => Box::new(KimSquared::default()),
        }
    }
}

impl CornerDetector for CornerDetectorKind {
    fn label(&self) -> &str {
        match *self {
            Self::ShortStraw => ShortStraw::LABEL,
            Self::DouglasPeucker => DouglasPeucker::LABEL,
            Self::DirectionGraph => DirectionGraph::LABEL,
            Self::Sezgin => Sezgin::LABEL,
            Self::KimSquared => KimSquared::LABEL,
        }
    }

    fn detect(
        &self,
        stroke: &Stroke,
        deadline: Deadline,
    ) -> Result<Vec<Segmentation>, TimeoutError> {
        match *self {
            Self::ShortStraw => ShortStraw::default().detect(stroke, deadline),
            Self::DouglasPeucker => DouglasPeucker::default().detect(stroke, deadline),
            Self::DirectionGraph => DirectionGraph::default().detect(stroke, deadline),
            Self::Sezgin => Sezgin::default().detect(stroke, deadline),
            Self::KimSquared => KimSquared::default().detect(stroke, deadline),
        }
    }
}

/// Wrap a detector's interior corners into its single output
/// segmentation, scored by [`mean_straightness`].
///
/// Out-of-range or duplicate candidates are dropped and endpoints are
/// added; strokes shorter than 2 points produce no segmentation.
pub(crate) fn single_segmentation(
    stroke: &Stroke,
    candidates: Vec<usize>,
    label: &str,
) -> Vec<Segmentation> {
    let Ok(draft) = Segmentation::from_candidates(stroke.len(), candidates, 1.0, label) else {
        return Vec::new();
    };
    let confidence = mean_straightness(stroke, draft.corners());
    Segmentation::new(stroke.len(), draft.corners().to_vec(), confidence, label)
        .map_or_else(|_| vec![draft], |seg| vec![seg])
}

/// Indices `i` in `1..values.len() - 1` where `values[i]` is at least
/// as large as both neighbours and passes `keep`.
///
/// Plateaus report every member, so symmetric inputs give symmetric
/// candidates.
pub(crate) fn local_peaks(values: &[f64], keep: impl Fn(usize, f64) -> bool) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| values[i] >= values[i - 1] && values[i] >= values[i + 1])
        .filter(|&i| keep(i, values[i]))
        .collect()
}
