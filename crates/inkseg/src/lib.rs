//! inkseg: time-bounded corner detection for freehand pen strokes (sans-IO).
//!
//! Splits a stroke into the primitives it was drawn from by running
//! several corner detectors and reconciling their proposals:
//! detectors -> candidate pool -> Gaussian KDE -> density peaks ->
//! consensus segmentation.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! strokes and returns plain values. Loading strokes, drawing them, and
//! recognizing the resulting primitives all live elsewhere.
//!
//! Every entry point takes a [`Deadline`]. Detectors and objective
//! functions check it cooperatively and give up with a [`TimeoutError`]
//! once it has expired.

pub mod combine;
pub mod deadline;
pub mod detector;
pub mod diagnostics;
pub mod direction_graph;
pub mod douglas_peucker;
pub mod geometry;
pub mod kde;
pub mod kim_squared;
pub mod objective;
pub mod primitive;
pub mod sezgin;
pub mod short_straw;
pub mod types;

use std::time::Duration;

pub use combine::{CombinerConfig, ConfidencePolicy, KdeCombiner, agreement_strength};
pub use deadline::{Checkpoint, Deadline, TimeoutError};
pub use detector::{BoxedDetector, CornerDetector, CornerDetectorKind};
pub use diagnostics::{CombineDiagnostics, DetectorOutcome, DetectorRun, KdeStage};
pub use direction_graph::DirectionGraph;
pub use douglas_peucker::DouglasPeucker;
pub use kde::PlateauPolicy;
pub use kim_squared::KimSquared;
pub use objective::{
    DEGENERATE_SCORE, ObjectiveFunction, ObjectiveKind, PolylineFeatureArea, PolylineMse,
    PrimitiveFitError,
};
pub use primitive::{BasicFitter, PrimitiveFit, PrimitiveFitter, PrimitiveKind};
pub use sezgin::Sezgin;
pub use short_straw::ShortStraw;
pub use types::{BoundingBox, Point, Segmentation, SegmentationError, Stroke};

/// Segment a stroke with the default detector set and settings.
///
/// Starts a [`Deadline`] of `max_duration` now and returns the consensus
/// of [`KdeCombiner::default`]: all five built-in detectors, bandwidth
/// 4.0, fixed confidence 0.80.
///
/// ```rust
/// use std::time::Duration;
///
/// use inkseg::{Point, Stroke};
///
/// let stroke = Stroke::new(vec![
///     Point::new(0.0, 0.0, 0),
///     Point::new(10.0, 0.0, 10),
///     Point::new(10.0, 10.0, 20),
///     Point::new(0.0, 10.0, 30),
/// ])?;
/// let segmentation = inkseg::segment(&stroke, Duration::from_secs(1))?;
/// assert_eq!(segmentation.corners().first(), Some(&0));
/// assert_eq!(segmentation.corners().last(), Some(&3));
/// # Ok::<(), inkseg::SegmentationError>(())
/// ```
///
/// # Errors
///
/// Returns [`SegmentationError::StrokeTooShort`] for a 1-point stroke
/// and [`SegmentationError::Timeout`] if the budget ran out before any
/// detector completed.
pub fn segment(stroke: &Stroke, max_duration: Duration) -> Result<Segmentation, SegmentationError> {
    KdeCombiner::default().combine(stroke, Deadline::new(max_duration))
}
