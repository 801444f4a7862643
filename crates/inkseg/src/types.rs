//! Shared types for the inkseg stroke segmentation core.

use std::ops::Range;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deadline::TimeoutError;

/// A timestamped 2D pen sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Sample time in milliseconds. Only differences between samples matter.
    pub t: i64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64, t: i64) -> Self {
        Self { x, y, t }
    }

    /// Squared Euclidean distance to another point (time is ignored).
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point (time is ignored).
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned bounding box of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Smallest x coordinate.
    pub min_x: f64,
    /// Smallest y coordinate.
    pub min_y: f64,
    /// Largest x coordinate.
    pub max_x: f64,
    /// Largest y coordinate.
    pub max_y: f64,
}

impl BoundingBox {
    /// Horizontal extent.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Vertical extent.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Length of the box diagonal. Detectors scale their distance
    /// thresholds by this so they are independent of drawing size.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.width().hypot(self.height())
    }

    /// Box area.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// One continuous pen-down-to-pen-up sequence of timestamped points.
///
/// A stroke is validated once at construction and never mutated
/// afterwards: it is non-empty, every coordinate is finite, and
/// timestamps are non-decreasing. Segmentation never edits strokes;
/// consumers that need a different stroke build a new one (see
/// [`substroke`](Self::substroke)).
///
/// Points are compared by position within the stroke, not by value:
/// two samples may coincide spatially, and corner indices always refer
/// to a specific sample.
///
/// Bounding box, path length, and minimum inter-point distance are
/// computed on first use and cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StrokeRecord", into = "StrokeRecord")]
pub struct Stroke {
    id: Uuid,
    points: Vec<Point>,
    bounding_box: OnceLock<BoundingBox>,
    path_length: OnceLock<f64>,
    min_inter_point_distance: OnceLock<f64>,
}

impl Stroke {
    /// Create a stroke with a freshly generated identity.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::EmptyStroke`] if `points` is empty,
    /// [`SegmentationError::NonFinitePoint`] if any coordinate is NaN or
    /// infinite, and [`SegmentationError::UnsortedTimestamps`] if a
    /// timestamp is smaller than its predecessor's.
    pub fn new(points: Vec<Point>) -> Result<Self, SegmentationError> {
        Self::with_id(Uuid::new_v4(), points)
    }

    /// Create a stroke with a caller-supplied identity.
    ///
    /// # Errors
    ///
    /// Same as [`Stroke::new`].
    pub fn with_id(id: Uuid, points: Vec<Point>) -> Result<Self, SegmentationError> {
        if points.is_empty() {
            return Err(SegmentationError::EmptyStroke);
        }
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(SegmentationError::NonFinitePoint { index });
        }
        if let Some(index) = points.windows(2).position(|w| w[1].t < w[0].t) {
            return Err(SegmentationError::UnsortedTimestamps { index: index + 1 });
        }
        Ok(Self::from_validated(id, points))
    }

    /// Construct from points already known to satisfy the invariants.
    fn from_validated(id: Uuid, points: Vec<Point>) -> Self {
        Self {
            id,
            points,
            bounding_box: OnceLock::new(),
            path_length: OnceLock::new(),
            min_inter_point_distance: OnceLock::new(),
        }
    }

    /// Stable identity assigned at creation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Number of points. Always at least 1.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`: strokes are non-empty by construction.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the last point.
    #[must_use]
    pub const fn last_index(&self) -> usize {
        self.points.len() - 1
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Returns the point at `index`, if any.
    #[must_use]
    pub fn point(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    /// First point of the stroke.
    #[must_use]
    pub fn first(&self) -> Point {
        self.points[0]
    }

    /// Last point of the stroke.
    #[must_use]
    pub fn last(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    /// Axis-aligned bounding box (cached).
    pub fn bounding_box(&self) -> BoundingBox {
        *self.bounding_box.get_or_init(|| {
            let first = self.first();
            let init = BoundingBox {
                min_x: first.x,
                min_y: first.y,
                max_x: first.x,
                max_y: first.y,
            };
            self.points.iter().fold(init, |b, p| BoundingBox {
                min_x: b.min_x.min(p.x),
                min_y: b.min_y.min(p.y),
                max_x: b.max_x.max(p.x),
                max_y: b.max_y.max(p.y),
            })
        })
    }

    /// Total path length: sum of consecutive Euclidean distances (cached).
    pub fn path_length(&self) -> f64 {
        *self
            .path_length
            .get_or_init(|| self.points.windows(2).map(|w| w[0].distance(w[1])).sum())
    }

    /// Path length between two point indices (inclusive endpoints).
    ///
    /// Returns 0.0 when `end <= start` or the range is out of bounds.
    #[must_use]
    pub fn path_length_between(&self, start: usize, end: usize) -> f64 {
        if end <= start || end >= self.points.len() {
            return 0.0;
        }
        self.points[start..=end]
            .windows(2)
            .map(|w| w[0].distance(w[1]))
            .sum()
    }

    /// Smallest distance between consecutive points (cached).
    ///
    /// A single-point stroke reports `0.0`.
    pub fn min_inter_point_distance(&self) -> f64 {
        *self.min_inter_point_distance.get_or_init(|| {
            self.points
                .windows(2)
                .map(|w| w[0].distance(w[1]))
                .reduce(f64::min)
                .unwrap_or(0.0)
        })
    }

    /// Build a new stroke from a contiguous range of this stroke's points.
    ///
    /// The new stroke gets a fresh identity; `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::CornerOutOfRange`] if the range
    /// exceeds the stroke, or [`SegmentationError::EmptyStroke`] if it
    /// selects no points.
    pub fn substroke(&self, range: Range<usize>) -> Result<Self, SegmentationError> {
        if range.end > self.points.len() {
            return Err(SegmentationError::CornerOutOfRange {
                index: range.end.saturating_sub(1),
                len: self.points.len(),
            });
        }
        if range.is_empty() {
            return Err(SegmentationError::EmptyStroke);
        }
        Ok(Self::from_validated(
            Uuid::new_v4(),
            self.points[range].to_vec(),
        ))
    }
}

impl PartialEq for Stroke {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.points == other.points
    }
}

/// Serde-compatible proxy for [`Stroke`].
///
/// The identity is optional on input (a fresh one is generated) and
/// every deserialized stroke is re-validated.
#[derive(Serialize, Deserialize)]
struct StrokeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    points: Vec<Point>,
}

impl TryFrom<StrokeRecord> for Stroke {
    type Error = SegmentationError;

    fn try_from(record: StrokeRecord) -> Result<Self, Self::Error> {
        Self::with_id(record.id.unwrap_or_else(Uuid::new_v4), record.points)
    }
}

impl From<Stroke> for StrokeRecord {
    fn from(stroke: Stroke) -> Self {
        Self {
            id: Some(stroke.id),
            points: stroke.points,
        }
    }
}

/// Check that `corners` is a usable partition of a stroke with
/// `stroke_len` points: at least two indices, strictly increasing, all
/// within `[0, stroke_len - 1]`.
///
/// Endpoints are not required here; [`Segmentation::new`] adds that
/// check on top.
///
/// # Errors
///
/// Returns [`SegmentationError::TooFewCorners`],
/// [`SegmentationError::CornersNotIncreasing`], or
/// [`SegmentationError::CornerOutOfRange`].
pub fn validate_corners(corners: &[usize], stroke_len: usize) -> Result<(), SegmentationError> {
    if corners.len() < 2 {
        return Err(SegmentationError::TooFewCorners {
            count: corners.len(),
        });
    }
    if let Some(position) = corners.windows(2).position(|w| w[1] <= w[0]) {
        return Err(SegmentationError::CornersNotIncreasing {
            position: position + 1,
        });
    }
    if let Some(&index) = corners.iter().find(|&&c| c >= stroke_len) {
        return Err(SegmentationError::CornerOutOfRange {
            index,
            len: stroke_len,
        });
    }
    Ok(())
}

/// A candidate partition of a stroke into primitives.
///
/// Invariants (checked at construction, immutable afterwards):
/// corner indices are strictly increasing, start at 0, end at
/// `stroke_len - 1`, and there are at least two of them; confidence is
/// a finite value in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SegmentationRecord", into = "SegmentationRecord")]
pub struct Segmentation {
    corners: Vec<usize>,
    confidence: f64,
    label: String,
}

impl Segmentation {
    /// Create a segmentation from an exact corner list.
    ///
    /// # Errors
    ///
    /// Returns the [`validate_corners`] errors,
    /// [`SegmentationError::MissingEndpoint`] if the list does not start
    /// at 0 and end at `stroke_len - 1`, and
    /// [`SegmentationError::InvalidConfidence`] for a confidence outside
    /// `[0, 1]`.
    pub fn new(
        stroke_len: usize,
        corners: Vec<usize>,
        confidence: f64,
        label: impl Into<String>,
    ) -> Result<Self, SegmentationError> {
        validate_corners(&corners, stroke_len)?;
        if corners[0] != 0 {
            return Err(SegmentationError::MissingEndpoint {
                expected: 0,
                found: corners[0],
            });
        }
        let last = corners[corners.len() - 1];
        if last != stroke_len - 1 {
            return Err(SegmentationError::MissingEndpoint {
                expected: stroke_len - 1,
                found: last,
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(SegmentationError::InvalidConfidence(confidence));
        }
        Ok(Self {
            corners,
            confidence,
            label: label.into(),
        })
    }

    /// Build a segmentation from raw candidate indices.
    ///
    /// Candidates are sorted and deduplicated, indices past the end of
    /// the stroke are dropped, and both endpoints are added.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::StrokeTooShort`] for strokes with
    /// fewer than 2 points, or [`SegmentationError::InvalidConfidence`].
    pub fn from_candidates(
        stroke_len: usize,
        candidates: impl IntoIterator<Item = usize>,
        confidence: f64,
        label: impl Into<String>,
    ) -> Result<Self, SegmentationError> {
        if stroke_len < 2 {
            return Err(SegmentationError::StrokeTooShort { len: stroke_len });
        }
        let last = stroke_len - 1;
        let mut corners: Vec<usize> = candidates
            .into_iter()
            .filter(|&c| c > 0 && c < last)
            .collect();
        corners.push(0);
        corners.push(last);
        corners.sort_unstable();
        corners.dedup();
        Self::new(stroke_len, corners, confidence, label)
    }

    /// The degenerate segmentation holding only the two endpoints.
    ///
    /// # Errors
    ///
    /// Same as [`Segmentation::from_candidates`].
    pub fn endpoints(
        stroke_len: usize,
        confidence: f64,
        label: impl Into<String>,
    ) -> Result<Self, SegmentationError> {
        Self::from_candidates(stroke_len, [], confidence, label)
    }

    /// All corner indices, endpoints included.
    #[must_use]
    pub fn corners(&self) -> &[usize] {
        &self.corners
    }

    /// Corner indices excluding the two endpoints.
    #[must_use]
    pub fn interior_corners(&self) -> &[usize] {
        &self.corners[1..self.corners.len() - 1]
    }

    /// Confidence in `[0, 1]` reported by whatever produced this partition.
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Name of the strategy that produced this partition.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of primitive segments (one fewer than the corner count).
    #[must_use]
    pub const fn segment_count(&self) -> usize {
        self.corners.len() - 1
    }

    /// Consecutive `(start, end)` corner pairs.
    pub fn segments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.corners.windows(2).map(|w| (w[0], w[1]))
    }

    /// Split `stroke` into one new stroke per segment.
    ///
    /// Neighbouring substrokes share their corner point. The source
    /// stroke is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::CornerOutOfRange`] if this
    /// segmentation was built for a longer stroke.
    pub fn substrokes(&self, stroke: &Stroke) -> Result<Vec<Stroke>, SegmentationError> {
        self.segments()
            .map(|(start, end)| stroke.substroke(start..end + 1))
            .collect()
    }

    /// Sort segmentations by descending confidence.
    ///
    /// The sort is stable: equally confident segmentations keep their
    /// production order.
    #[must_use]
    pub fn rank(mut segmentations: Vec<Self>) -> Vec<Self> {
        segmentations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        segmentations
    }
}

/// Serde-compatible proxy for [`Segmentation`].
///
/// Deserialization re-checks the invariants that do not depend on the
/// stroke (the last corner is taken as the stroke's last index).
#[derive(Serialize, Deserialize)]
struct SegmentationRecord {
    corners: Vec<usize>,
    confidence: f64,
    label: String,
}

impl TryFrom<SegmentationRecord> for Segmentation {
    type Error = SegmentationError;

    fn try_from(record: SegmentationRecord) -> Result<Self, Self::Error> {
        let stroke_len = record.corners.last().map_or(0, |&last| last + 1);
        Self::new(stroke_len, record.corners, record.confidence, record.label)
    }
}

impl From<Segmentation> for SegmentationRecord {
    fn from(segmentation: Segmentation) -> Self {
        Self {
            corners: segmentation.corners,
            confidence: segmentation.confidence,
            label: segmentation.label,
        }
    }
}

/// Errors that can occur while segmenting or scoring strokes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentationError {
    /// The time budget ran out before the operation finished.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// A stroke was built from zero points.
    #[error("stroke has no points")]
    EmptyStroke,

    /// A stroke point has a NaN or infinite coordinate.
    #[error("stroke point {index} has a non-finite coordinate")]
    NonFinitePoint {
        /// Offending point index.
        index: usize,
    },

    /// A stroke point is timestamped earlier than its predecessor.
    #[error("stroke point {index} is timestamped before its predecessor")]
    UnsortedTimestamps {
        /// Offending point index.
        index: usize,
    },

    /// The stroke is too short to carry a valid segmentation.
    #[error("stroke has {len} point(s); at least 2 are needed to segment it")]
    StrokeTooShort {
        /// Number of points in the stroke.
        len: usize,
    },

    /// A corner list holds fewer than two indices.
    #[error("corner list has {count} index(es); at least 2 are required")]
    TooFewCorners {
        /// Number of indices supplied.
        count: usize,
    },

    /// A corner list is unsorted or holds duplicates.
    #[error("corner list is not strictly increasing at position {position}")]
    CornersNotIncreasing {
        /// Position in the list of the first offending index.
        position: usize,
    },

    /// A corner index points past the end of the stroke.
    #[error("corner index {index} is out of range for a stroke of {len} point(s)")]
    CornerOutOfRange {
        /// Offending index.
        index: usize,
        /// Stroke length.
        len: usize,
    },

    /// A segmentation does not start at 0 or end at the last index.
    #[error("segmentation must include endpoint {expected}, found {found}")]
    MissingEndpoint {
        /// Endpoint index that was expected.
        expected: usize,
        /// Index found in its place.
        found: usize,
    },

    /// A confidence value lies outside `[0, 1]` or is not finite.
    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),

    /// Combiner or detector configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SegmentationError {
    /// Returns `true` for [`SegmentationError::Timeout`].
    ///
    /// Timeouts mean "try again with more time"; every other variant
    /// means the input itself is unusable.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
