//! KDE consensus combiner.
//!
//! Runs every registered [`CornerDetector`] on a stroke in a fixed order,
//! pools the interior corners they propose, and places the consensus
//! corners at the local maxima of a Gaussian KDE over that pool.
//!
//! # Time budget
//!
//! The caller's [`Deadline`] is checked before each detector. Once it
//! has expired the remaining detectors are skipped and the consensus is
//! built from whatever was collected ("degraded" in the diagnostics).
//! Only when no detector completed at all does the combiner fail with a
//! timeout. A detector that reports a timeout while the combiner's own
//! deadline is still live is recorded and skipped over; it does not stop
//! the run.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use web_time::Instant;

use crate::deadline::{self, Deadline, TimeoutError};
use crate::detector::{BoxedDetector, CornerDetector, CornerDetectorKind};
use crate::diagnostics::{CombineDiagnostics, DetectorOutcome, DetectorRun, KdeStage};
use crate::kde::{self, PlateauPolicy};
use crate::types::{Segmentation, SegmentationError, Stroke};

/// How the consensus segmentation's confidence is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConfidencePolicy {
    /// Always report this value, whatever the detectors said.
    Fixed(f64),
    /// Derive confidence from how many detectors agree with the
    /// consensus (see [`agreement_strength`]).
    AgreementStrength,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self::Fixed(CombinerConfig::DEFAULT_CONSENSUS_CONFIDENCE)
    }
}

/// Configuration for [`KdeCombiner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Gaussian kernel bandwidth, in index units.
    pub bandwidth: f64,
    /// Which index of a flat density peak becomes the corner.
    pub plateau: PlateauPolicy,
    /// Confidence assigned to the consensus.
    pub confidence: ConfidencePolicy,
    /// Detectors to run, in order.
    pub detectors: Vec<CornerDetectorKind>,
    /// Per-point iterations between deadline checks in the KDE stage.
    pub checkpoint_interval: usize,
}

impl CombinerConfig {
    /// Default for [`bandwidth`](Self::bandwidth).
    pub const DEFAULT_BANDWIDTH: f64 = 4.0;

    /// Default fixed consensus confidence.
    pub const DEFAULT_CONSENSUS_CONFIDENCE: f64 = 0.80;

    /// Default for [`checkpoint_interval`](Self::checkpoint_interval).
    pub const DEFAULT_CHECKPOINT_INTERVAL: usize = deadline::DEFAULT_CHECKPOINT_INTERVAL;

    /// Check every field for usable values.
    ///
    /// An empty detector list is allowed: the combiner then always
    /// returns the endpoints-only segmentation.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidConfig`] for a non-positive or
    /// non-finite bandwidth, a zero checkpoint interval, or a fixed
    /// confidence outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), SegmentationError> {
        if !(self.bandwidth.is_finite() && self.bandwidth > 0.0) {
            return Err(SegmentationError::InvalidConfig(format!(
                "bandwidth must be positive and finite, got {}",
                self.bandwidth
            )));
        }
        if self.checkpoint_interval == 0 {
            return Err(SegmentationError::InvalidConfig(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if let ConfidencePolicy::Fixed(c) = self.confidence
            && !(0.0..=1.0).contains(&c)
        {
            return Err(SegmentationError::InvalidConfig(format!(
                "fixed confidence must be in [0, 1], got {c}"
            )));
        }
        Ok(())
    }
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            bandwidth: Self::DEFAULT_BANDWIDTH,
            plateau: PlateauPolicy::default(),
            confidence: ConfidencePolicy::default(),
            detectors: CornerDetectorKind::ALL.to_vec(),
            checkpoint_interval: Self::DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

/// Everything one combiner run produced.
struct Run {
    consensus: Segmentation,
    individual: Vec<Segmentation>,
    diagnostics: CombineDiagnostics,
}

/// Merges several corner detectors into one consensus segmentation.
pub struct KdeCombiner {
    config: CombinerConfig,
    detectors: Vec<BoxedDetector>,
}

impl KdeCombiner {
    /// Label attached to consensus segmentations.
    pub const LABEL: &'static str = "KDE consensus";

    /// Combiner running the built-in detectors named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidConfig`] if `config` fails
    /// [`CombinerConfig::validate`].
    pub fn new(config: CombinerConfig) -> Result<Self, SegmentationError> {
        config.validate()?;
        let detectors = config.detectors.iter().map(|kind| kind.build()).collect();
        Ok(Self { config, detectors })
    }

    /// Combiner running caller-supplied detectors, in the given order.
    ///
    /// `config.detectors` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidConfig`] if `config` fails
    /// [`CombinerConfig::validate`].
    pub fn with_detectors(
        config: CombinerConfig,
        detectors: Vec<BoxedDetector>,
    ) -> Result<Self, SegmentationError> {
        config.validate()?;
        Ok(Self { config, detectors })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &CombinerConfig {
        &self.config
    }

    /// Labels of the registered detectors, in run order.
    #[must_use]
    pub fn detector_labels(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.label()).collect()
    }

    /// Consensus segmentation of `stroke`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::StrokeTooShort`] for a 1-point
    /// stroke, or [`SegmentationError::Timeout`] if the deadline expired
    /// before any detector completed (or during the KDE stage).
    pub fn combine(&self, stroke: &Stroke, deadline: Deadline) -> Result<Segmentation, SegmentationError> {
        self.run(stroke, deadline).map(|run| run.consensus)
    }

    /// Consensus segmentation plus per-stage diagnostics.
    ///
    /// # Errors
    ///
    /// Same as [`combine`](Self::combine).
    pub fn combine_with_diagnostics(
        &self,
        stroke: &Stroke,
        deadline: Deadline,
    ) -> Result<(Segmentation, CombineDiagnostics), SegmentationError> {
        self.run(stroke, deadline)
            .map(|run| (run.consensus, run.diagnostics))
    }

    /// The consensus and every individual detector segmentation, ranked
    /// by descending confidence.
    ///
    /// Ties keep production order: consensus first, then detectors in
    /// run order.
    ///
    /// # Errors
    ///
    /// Same as [`combine`](Self::combine).
    pub fn hypotheses(
        &self,
        stroke: &Stroke,
        deadline: Deadline,
    ) -> Result<Vec<Segmentation>, SegmentationError> {
        let run = self.run(stroke, deadline)?;
        let mut all = Vec::with_capacity(run.individual.len() + 1);
        all.push(run.consensus);
        all.extend(run.individual);
        Ok(Segmentation::rank(all))
    }

    fn run(&self, stroke: &Stroke, deadline: Deadline) -> Result<Run, SegmentationError> {
        let started = Instant::now();
        let len = stroke.len();
        if len < 2 {
            return Err(SegmentationError::StrokeTooShort { len });
        }

        let skipped = |detector: &BoxedDetector| DetectorRun {
            label: detector.label().to_string(),
            duration: Duration::ZERO,
            outcome: DetectorOutcome::Skipped,
        };

        // Two points have no interior: answer without asking anyone.
        if len == 2 {
            let consensus =
                Segmentation::endpoints(len, self.consensus_confidence(&[], &[]), Self::LABEL)?;
            debug!(stroke = %stroke.id(), "two-point stroke, skipping detectors");
            return Ok(Run {
                consensus,
                individual: Vec::new(),
                diagnostics: CombineDiagnostics {
                    stroke_len: len,
                    detectors: self.detectors.iter().map(skipped).collect(),
                    kde: None,
                    consensus_corners: 0,
                    degraded: false,
                    total_duration: started.elapsed(),
                },
            });
        }

        let mut runs = Vec::with_capacity(self.detectors.len());
        let mut individual = Vec::new();
        let mut proposals: Vec<Vec<usize>> = Vec::new();
        let mut pool: Vec<usize> = Vec::new();
        let mut degraded = false;

        for detector in &self.detectors {
            if degraded || deadline.is_expired() {
                degraded = true;
                runs.push(skipped(detector));
                continue;
            }

            let label = detector.label().to_string();
            let detector_started = Instant::now();
            let result = detector.detect(stroke, deadline);
            let duration = detector_started.elapsed();

            match result {
                Ok(segmentations) => {
                    let mut proposed = Vec::new();
                    let mut accepted = 0;
                    for seg in segmentations {
                        if seg.corners().last() != Some(&stroke.last_index()) {
                            warn!(detector = %label, "dropping segmentation built for a different stroke");
                            continue;
                        }
                        proposed.extend_from_slice(seg.interior_corners());
                        individual.push(seg);
                        accepted += 1;
                    }
                    debug!(
                        detector = %label,
                        segmentations = accepted,
                        interior_corners = proposed.len(),
                        elapsed = ?duration,
                        "detector completed"
                    );
                    runs.push(DetectorRun {
                        label,
                        duration,
                        outcome: DetectorOutcome::Completed {
                            segmentations: accepted,
                            interior_corners: proposed.len(),
                        },
                    });
                    pool.extend_from_slice(&proposed);
                    proposals.push(proposed);
                }
                Err(err) => {
                    if !deadline.is_expired() {
                        warn!(detector = %label, error = %err, "detector timed out on a live deadline, continuing");
                    }
                    runs.push(DetectorRun {
                        label,
                        duration,
                        outcome: DetectorOutcome::TimedOut,
                    });
                }
            }
        }
        // The last detector may have used up the budget.
        degraded |= deadline.is_expired();

        if degraded {
            if proposals.is_empty() {
                let err = TimeoutError {
                    elapsed: deadline.elapsed(),
                    budget: deadline.max_duration(),
                };
                warn!(budget = ?err.budget, "deadline expired before any detector completed");
                return Err(err.into());
            }
            info!(
                completed = proposals.len(),
                registered = self.detectors.len(),
                "deadline expired, building consensus from partial results"
            );
        }

        let kde = if pool.is_empty() {
            None
        } else {
            // After degrading, finishing the consensus beats failing it.
            let kde_deadline = if degraded {
                Deadline::unbounded()
            } else {
                deadline
            };
            let kde_started = Instant::now();
            let maxima = match self.consensus_maxima(&pool, len, kde_deadline) {
                Ok(maxima) => maxima,
                Err(err) => {
                    warn!(pool_size = pool.len(), "deadline expired during the KDE stage");
                    return Err(err.into());
                }
            };
            let mut distinct = pool.clone();
            distinct.sort_unstable();
            distinct.dedup();
            trace!(pool_size = pool.len(), distinct = distinct.len(), maxima = ?maxima, "kde stage");
            Some(KdeStage {
                pool_size: pool.len(),
                distinct_positions: distinct.len(),
                bandwidth: self.config.bandwidth,
                maxima,
                duration: kde_started.elapsed(),
            })
        };

        let maxima = kde.as_ref().map(|k| k.maxima.clone()).unwrap_or_default();
        let draft = Segmentation::from_candidates(len, maxima, 1.0, Self::LABEL)?;
        let confidence = self.consensus_confidence(&proposals, draft.interior_corners());
        let consensus = Segmentation::new(len, draft.corners().to_vec(), confidence, Self::LABEL)?;

        Ok(Run {
            diagnostics: CombineDiagnostics {
                stroke_len: len,
                detectors: runs,
                kde,
                consensus_corners: consensus.interior_corners().len(),
                degraded,
                total_duration: started.elapsed(),
            },
            consensus,
            individual,
        })
    }

    /// Density peaks of the pooled candidates.
    fn consensus_maxima(
        &self,
        pool: &[usize],
        len: usize,
        deadline: Deadline,
    ) -> Result<Vec<usize>, TimeoutError> {
        let mut checkpoint = deadline.checkpoint(self.config.checkpoint_interval);
        checkpoint.check_now()?;
        let curve = kde::density(pool, len, self.config.bandwidth, &mut checkpoint)?;
        kde::local_maxima(&curve, self.config.plateau, &mut checkpoint)
    }

    fn consensus_confidence(&self, proposals: &[Vec<usize>], interior: &[usize]) -> f64 {
        match self.config.confidence {
            ConfidencePolicy::Fixed(c) => c,
            ConfidencePolicy::AgreementStrength => {
                agreement_strength(proposals, interior, self.config.bandwidth)
            }
        }
    }
}

impl Default for KdeCombiner {
    fn default() -> Self {
        let config = CombinerConfig::default();
        let detectors = config.detectors.iter().map(|kind| kind.build()).collect();
        Self { config, detectors }
    }
}

impl fmt::Debug for KdeCombiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KdeCombiner")
            .field("config", &self.config)
            .field("detectors", &self.detector_labels())
            .finish()
    }
}

impl CornerDetector for KdeCombiner {
    fn label(&self) -> &str {
        Self::LABEL
    }

    fn detect(
        &self,
        stroke: &Stroke,
        deadline: Deadline,
    ) -> Result<Vec<Segmentation>, TimeoutError> {
        match self.combine(stroke, deadline) {
            Ok(consensus) => Ok(vec![consensus]),
            Err(SegmentationError::Timeout(err)) => Err(err),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// Share of detectors that agree with a consensus.
///
/// `proposals` holds each completed detector's interior corners. For
/// every consensus corner, count the detectors that proposed a corner
/// within `bandwidth` of it; the result is the mean of those shares.
/// With no interior consensus corners, it is the share of detectors
/// that proposed none either. With no detectors, 1.0.
#[must_use]
pub fn agreement_strength(proposals: &[Vec<usize>], interior: &[usize], bandwidth: f64) -> f64 {
    if proposals.is_empty() {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let detectors = proposals.len() as f64;

    if interior.is_empty() {
        #[allow(clippy::cast_precision_loss)]
        let silent = proposals.iter().filter(|p| p.is_empty()).count() as f64;
        return silent / detectors;
    }

    let shares: f64 = interior
        .iter()
        .map(|&corner| {
            #[allow(clippy::cast_precision_loss)]
            let near = proposals
                .iter()
                .filter(|p| p.iter().any(|&q| q.abs_diff(corner) as f64 <= bandwidth))
                .count() as f64;
            near / detectors
        })
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let corners = interior.len() as f64;
    (shares / corners).clamp(0.0, 1.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::Point;

    /// Proposes a fixed corner list and counts its calls.
    struct Scripted {
        corners: Vec<usize>,
        calls: Arc<AtomicUsize>,
    }

    impl CornerDetector for Scripted {
        fn label(&self) -> &str {
            "scripted"
        }

        fn detect(
            &self,
            stroke: &Stroke,
            _deadline: Deadline,
        ) -> Result<Vec<Segmentation>, TimeoutError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Segmentation::from_candidates(stroke.len(), self.corners.clone(), 0.5, "scripted")
                .into_iter()
                .collect())
        }
    }

    /// Always reports a timeout without looking at the deadline.
    struct GivesUp;

    impl CornerDetector for GivesUp {
        fn label(&self) -> &str {
            "gives-up"
        }

        fn detect(
            &self,
            _stroke: &Stroke,
            _deadline: Deadline,
        ) -> Result<Vec<Segmentation>, TimeoutError> {
            Err(TimeoutError {
                elapsed: Duration::from_millis(1),
                budget: Duration::ZERO,
            })
        }
    }

    /// Sleeps, then proposes nothing.
    struct Sleeps(Duration);

    impl CornerDetector for Sleeps {
        fn label(&self) -> &str {
            "sleeps"
        }

        fn detect(
            &self,
            stroke: &Stroke,
            _deadline: Deadline,
        ) -> Result<Vec<Segmentation>, TimeoutError> {
            std::thread::sleep(self.0);
            Ok(Segmentation::endpoints(stroke.len(), 0.5, "sleeps")
                .into_iter()
                .collect())
        }
    }

    fn scripted(corners: &[usize]) -> (BoxedDetector, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = Scripted {
            corners: corners.to_vec(),
            calls: Arc::clone(&calls),
        };
        (Box::new(detector), calls)
    }

    fn line(n: usize) -> Stroke {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
        let points = (0..n).map(|i| Point::new(i as f64, 0.0, i as i64)).collect();
        Stroke::new(points).unwrap()
    }

    #[test]
    fn default_config_values() {
        let config = CombinerConfig::default();
        assert!((config.bandwidth - 4.0).abs() < f64::EPSILON);
        assert_eq!(config.confidence, ConfidencePolicy::Fixed(0.80));
        assert_eq!(config.plateau, PlateauPolicy::LastBeforeDescent);
        assert_eq!(config.detectors, CornerDetectorKind::ALL.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_bandwidth = CombinerConfig {
            bandwidth: 0.0,
            ..CombinerConfig::default()
        };
        assert!(matches!(
            bad_bandwidth.validate(),
            Err(SegmentationError::InvalidConfig(_))
        ));
        let bad_interval = CombinerConfig {
            checkpoint_interval: 0,
            ..CombinerConfig::default()
        };
        assert!(bad_interval.validate().is_err());
        let bad_confidence = CombinerConfig {
            confidence: ConfidencePolicy::Fixed(1.2),
            ..CombinerConfig::default()
        };
        assert!(KdeCombiner::new(bad_confidence).is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{"bandwidth": 2.5, "confidence": "AgreementStrength"}"#;
        let config: CombinerConfig = serde_json::from_str(json).unwrap();
        assert!((config.bandwidth - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.confidence, ConfidencePolicy::AgreementStrength);
        assert_eq!(config.detectors.len(), 5);
        assert_eq!(config.checkpoint_interval, 1024);
    }

    #[test]
    fn repeated_votes_win_the_consensus() {
        let (a, _) = scripted(&[10]);
        let (b, _) = scripted(&[10]);
        let (c, _) = scripted(&[30]);
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), vec![a, b, c]).unwrap();
        let seg = combiner.combine(&line(41), Deadline::unbounded()).unwrap();
        assert_eq!(seg.corners(), &[0, 10, 30, 40]);
        assert_eq!(seg.label(), KdeCombiner::LABEL);
        assert!((seg.confidence() - 0.80).abs() < f64::EPSILON);
    }

    #[test]
    fn nearby_votes_merge_into_one_corner() {
        let (a, _) = scripted(&[19]);
        let (b, _) = scripted(&[20]);
        let (c, _) = scripted(&[21]);
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), vec![a, b, c]).unwrap();
        let seg = combiner.combine(&line(41), Deadline::unbounded()).unwrap();
        assert_eq!(seg.corners(), &[0, 20, 40]);
    }

    #[test]
    fn two_point_stroke_skips_detectors() {
        let (a, calls) = scripted(&[]);
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), vec![a]).unwrap();
        let (seg, diag) = combiner
            .combine_with_diagnostics(&line(2), Deadline::unbounded())
            .unwrap();
        assert_eq!(seg.corners(), &[0, 1]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(diag.detectors[0].outcome, DetectorOutcome::Skipped);
    }

    #[test]
    fn one_point_stroke_is_too_short() {
        let combiner = KdeCombiner::default();
        assert_eq!(
            combiner.combine(&line(1), Deadline::unbounded()),
            Err(SegmentationError::StrokeTooShort { len: 1 })
        );
        assert!(combiner.detect(&line(1), Deadline::unbounded()).unwrap().is_empty());
    }

    #[test]
    fn expired_deadline_is_a_hard_timeout() {
        let (a, calls) = scripted(&[5]);
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), vec![a]).unwrap();
        let result = combiner.combine(&line(20), Deadline::new(Duration::ZERO));
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(combiner.detect(&line(20), Deadline::new(Duration::ZERO)).is_err());
    }

    #[test]
    fn timeouts_on_a_live_deadline_degrade_to_endpoints() {
        let detectors: Vec<BoxedDetector> = (0..5).map(|_| Box::new(GivesUp) as BoxedDetector).collect();
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
        let (seg, diag) = combiner
            .combine_with_diagnostics(&line(30), Deadline::unbounded())
            .unwrap();
        assert_eq!(seg.corners(), &[0, 29]);
        assert!(!diag.degraded);
        assert!(diag.kde.is_none());
        assert!(diag.detectors.iter().all(|d| d.outcome == DetectorOutcome::TimedOut));
    }

    #[test]
    fn a_timed_out_detector_does_not_stop_the_rest() {
        let (a, calls) = scripted(&[7]);
        let detectors: Vec<BoxedDetector> = vec![Box::new(GivesUp), a];
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
        let seg = combiner.combine(&line(20), Deadline::unbounded()).unwrap();
        assert_eq!(seg.corners(), &[0, 7, 19]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_detector_list_returns_endpoints() {
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), Vec::new()).unwrap();
        let seg = combiner.combine(&line(10), Deadline::unbounded()).unwrap();
        assert_eq!(seg.corners(), &[0, 9]);
    }

    #[test]
    fn hypotheses_rank_consensus_and_individuals() {
        let (a, _) = scripted(&[4]);
        let (b, _) = scripted(&[14]);
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), vec![a, b]).unwrap();
        let ranked = combiner.hypotheses(&line(20), Deadline::unbounded()).unwrap();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].label(), KdeCombiner::LABEL);
        assert!(ranked.windows(2).all(|w| w[0].confidence() >= w[1].confidence()));
        assert_eq!(ranked[1].corners(), &[0, 4, 19]);
        assert_eq!(ranked[2].corners(), &[0, 14, 19]);
    }

    #[test]
    fn agreement_strength_policy() {
        let (a, _) = scripted(&[10]);
        let (b, _) = scripted(&[11]);
        let (c, _) = scripted(&[]);
        let (d, _) = scripted(&[30]);
        let config = CombinerConfig {
            confidence: ConfidencePolicy::AgreementStrength,
            ..CombinerConfig::default()
        };
        let combiner = KdeCombiner::with_detectors(config, vec![a, b, c, d]).unwrap();
        let seg = combiner.combine(&line(41), Deadline::unbounded()).unwrap();
        // Corner near 10/11 has 2 of 4 votes, corner 30 has 1 of 4.
        assert_eq!(seg.interior_corners().len(), 2);
        assert!((seg.confidence() - 0.375).abs() < 1e-12);
    }

    #[test]
    fn agreement_strength_edge_cases() {
        assert!((agreement_strength(&[], &[], 4.0) - 1.0).abs() < f64::EPSILON);
        let proposals = vec![vec![], vec![], vec![5]];
        assert!((agreement_strength(&proposals, &[], 4.0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((agreement_strength(&proposals, &[8], 4.0) - 1.0 / 3.0).abs() < 1e-12);
        assert!(agreement_strength(&proposals, &[20], 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn diagnostics_record_each_detector() {
        let (a, _) = scripted(&[5, 9]);
        let detectors: Vec<BoxedDetector> = vec![a, Box::new(GivesUp)];
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
        let (_, diag) = combiner
            .combine_with_diagnostics(&line(20), Deadline::unbounded())
            .unwrap();
        assert_eq!(diag.stroke_len, 20);
        assert_eq!(
            diag.detectors[0].outcome,
            DetectorOutcome::Completed {
                segmentations: 1,
                interior_corners: 2
            }
        );
        assert_eq!(diag.detectors[1].outcome, DetectorOutcome::TimedOut);
        let kde = diag.kde.unwrap();
        assert_eq!(kde.pool_size, 2);
        assert_eq!(kde.distinct_positions, 2);
    }

    #[test]
    fn degraded_consensus_on_a_long_stroke_finishes_promptly() {
        let stroke = line(200_000);
        let corners: Vec<usize> = (1..4000).map(|k| k * 50).collect();
        let (a, _) = scripted(&corners);
        let (late, late_calls) = scripted(&[7]);
        let detectors: Vec<BoxedDetector> =
            vec![a, Box::new(Sleeps(Duration::from_millis(60))), late];
        let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
        let (seg, diag) = combiner
            .combine_with_diagnostics(&stroke, Deadline::new(Duration::from_millis(50)))
            .unwrap();
        assert!(diag.degraded);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(seg.interior_corners(), corners.as_slice());
        let kde = diag.kde.unwrap();
        assert!(kde.duration < Duration::from_secs(1), "kde took {:?}", kde.duration);
    }

    #[test]
    fn combiner_is_itself_a_detector() {
        let (a, _) = scripted(&[6]);
        let inner = KdeCombiner::with_detectors(CombinerConfig::default(), vec![a]).unwrap();
        let detectors: Vec<BoxedDetector> = vec![Box::new(inner)];
        let outer = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
        let seg = outer.combine(&line(15), Deadline::unbounded()).unwrap();
        assert_eq!(seg.corners(), &[0, 6, 14]);
    }

    #[test]
    fn debug_lists_detector_labels() {
        let text = format!("{:?}", KdeCombiner::default());
        assert!(text.contains("ShortStraw"));
        assert!(text.contains("KimSquared"));
    }
}
