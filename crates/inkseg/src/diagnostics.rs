//! Combiner diagnostics: timing and counts for each detector and the
//! KDE stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! threshold tuning and detector comparison. Every call to
//! [`KdeCombiner::combine_with_diagnostics`](crate::KdeCombiner::combine_with_diagnostics)
//! collects them alongside the consensus segmentation.
//!
//! Duration measurements use [`std::time::Duration`] (platform-agnostic).
//! Timestamps are captured internally via the `web-time` crate, which
//! uses `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single combiner run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineDiagnostics {
    /// Number of points in the input stroke.
    pub stroke_len: usize,
    /// One entry per registered detector, in run order.
    pub detectors: Vec<DetectorRun>,
    /// The KDE stage, absent when it never ran (short strokes, empty
    /// pool, or hard timeout).
    pub kde: Option<KdeStage>,
    /// Interior corners of the consensus segmentation.
    pub consensus_corners: usize,
    /// `true` when the deadline expired during the detector loop and the
    /// consensus was built from partial results.
    pub degraded: bool,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// What happened to one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorRun {
    /// Detector label.
    pub label: String,
    /// Wall-clock duration of the detector call (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// How the call ended.
    pub outcome: DetectorOutcome,
}

/// How a detector call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorOutcome {
    /// The detector returned segmentations.
    Completed {
        /// Segmentations returned.
        segmentations: usize,
        /// Interior corners contributed to the pool.
        interior_corners: usize,
    },
    /// The detector reported a timeout.
    TimedOut,
    /// The detector was never called.
    Skipped,
}

/// KDE stage metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdeStage {
    /// Pooled candidate indices, repeats included.
    pub pool_size: usize,
    /// Distinct positions in the pool.
    pub distinct_positions: usize,
    /// Kernel bandwidth in index units.
    pub bandwidth: f64,
    /// Local maxima of the density curve.
    pub maxima: Vec<usize>,
    /// Wall-clock duration of density and maxima extraction (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl CombineDiagnostics {
    /// Number of detectors that returned a result.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.detectors
            .iter()
            .filter(|d| matches!(d.outcome, DetectorOutcome::Completed { .. }))
            .count()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Consensus Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!("Stroke: {} points", self.stroke_len));
        lines.push(format!(
            "Total duration: {:.3}ms{}",
            duration_ms(self.total_duration),
            if self.degraded {
                "  (degraded: deadline expired)"
            } else {
                ""
            },
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let pct = |ms: f64| {
            if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            }
        };

        for run in &self.detectors {
            let ms = duration_ms(run.duration);
            let details = format_outcome(run.outcome);
            lines.push(format!(
                "{:<24} {ms:>8.3}ms {:>9.1}%  {details}",
                run.label,
                pct(ms)
            ));
        }
        if let Some(ref kde) = self.kde {
            let ms = duration_ms(kde.duration);
            lines.push(format!(
                "{:<24} {ms:>8.3}ms {:>9.1}%  pool={} distinct={} h={:.2} maxima={:?}",
                "KDE",
                pct(ms),
                kde.pool_size,
                kde.distinct_positions,
                kde.bandwidth,
                kde.maxima,
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Detectors completed: {}/{}  |  Consensus interior corners: {}",
            self.completed_count(),
            self.detectors.len(),
            self.consensus_corners,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_outcome(outcome: DetectorOutcome) -> String {
    match outcome {
        DetectorOutcome::Completed {
            segmentations,
            interior_corners,
        } => format!("{segmentations} segmentation(s), {interior_corners} interior corner(s)"),
        DetectorOutcome::TimedOut => "timed out".to_string(),
        DetectorOutcome::Skipped => "skipped".to_string(),
    }
}
