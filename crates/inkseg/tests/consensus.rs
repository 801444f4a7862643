//! Integration tests: the consensus combiner end to end with the built-in
//! detectors.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use inkseg::{
    BoxedDetector, CombinerConfig, ConfidencePolicy, CornerDetector, CornerDetectorKind, Deadline,
    DetectorOutcome, KdeCombiner, ObjectiveFunction, PlateauPolicy, Point, PolylineFeatureArea,
    PolylineMse, Segmentation, Stroke, TimeoutError,
};

fn polyline(coords: &[(f64, f64)]) -> Stroke {
    #[allow(clippy::cast_possible_wrap)]
    let points = coords
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| Point::new(x, y, i as i64 * 10))
        .collect();
    Stroke::new(points).unwrap()
}

/// Unit-spaced samples along straight runs between `vertices`.
fn dense(vertices: &[(f64, f64)]) -> Stroke {
    let mut coords = Vec::new();
    for w in vertices.windows(2) {
        let (ax, ay) = w[0];
        let (bx, by) = w[1];
        let steps = (bx - ax).hypot(by - ay).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        for s in 0..steps as usize {
            #[allow(clippy::cast_precision_loss)]
            let f = s as f64 / steps;
            coords.push((f.mul_add(bx - ax, ax), f.mul_add(by - ay, ay)));
        }
    }
    coords.push(vertices[vertices.len() - 1]);
    polyline(&coords)
}

fn right_angle() -> Stroke {
    polyline(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)])
}

fn load_stroke(name: &str) -> Stroke {
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    let path = workspace_root.join("assets/strokes").join(name);
    assert!(path.exists(), "stroke fixture not found at {path:?}");
    let json = std::fs::read_to_string(&path).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn assert_valid(seg: &Segmentation, stroke: &Stroke) {
    let corners = seg.corners();
    assert_eq!(corners.first(), Some(&0));
    assert_eq!(corners.last(), Some(&stroke.last_index()));
    assert!(
        corners.windows(2).all(|w| w[0] < w[1]),
        "corners not strictly increasing: {corners:?}"
    );
    assert!((0.0..=1.0).contains(&seg.confidence()));
}

/// Counts calls and proposes nothing.
struct Counting(Arc<AtomicUsize>);

impl CornerDetector for Counting {
    fn label(&self) -> &str {
        "counting"
    }

    fn detect(&self, stroke: &Stroke, _deadline: Deadline) -> Result<Vec<Segmentation>, TimeoutError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Segmentation::endpoints(stroke.len(), 1.0, "counting")
            .into_iter()
            .collect())
    }
}

/// Reports a timeout no matter how much time is left.
struct AlwaysTimesOut;

impl CornerDetector for AlwaysTimesOut {
    fn label(&self) -> &str {
        "always-times-out"
    }

    fn detect(&self, _stroke: &Stroke, deadline: Deadline) -> Result<Vec<Segmentation>, TimeoutError> {
        Err(TimeoutError {
            elapsed: deadline.elapsed(),
            budget: Duration::from_millis(1),
        })
    }
}

#[test]
fn every_detector_keeps_the_invariants() {
    let strokes = [
        right_angle(),
        dense(&[(0.0, 0.0), (30.0, 0.0), (30.0, 30.0)]),
        load_stroke("square.json"),
        load_stroke("line.json"),
    ];
    for stroke in &strokes {
        for kind in CornerDetectorKind::ALL {
            for seg in kind.detect(stroke, Deadline::unbounded()).unwrap() {
                assert_valid(&seg, stroke);
                assert_eq!(seg.label(), kind.label());
            }
        }
        let consensus = KdeCombiner::default().combine(stroke, Deadline::unbounded()).unwrap();
        assert_valid(&consensus, stroke);
    }
}

#[test]
fn combining_twice_gives_identical_corners() {
    let stroke = load_stroke("square.json");
    let combiner = KdeCombiner::default();
    let first = combiner.combine(&stroke, Deadline::unbounded()).unwrap();
    let second = combiner.combine(&stroke, Deadline::unbounded()).unwrap();
    assert_eq!(first.corners(), second.corners());
    assert_eq!(first.confidence().to_bits(), second.confidence().to_bits());
}

#[test]
fn two_point_stroke_never_reaches_a_detector() {
    let calls = Arc::new(AtomicUsize::new(0));
    let detectors: Vec<BoxedDetector> = vec![Box::new(Counting(Arc::clone(&calls)))];
    let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
    let stroke = polyline(&[(0.0, 0.0), (5.0, 5.0)]);
    let (seg, diag) = combiner
        .combine_with_diagnostics(&stroke, Deadline::unbounded())
        .unwrap();
    assert_eq!(seg.corners(), &[0, 1]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(diag.kde.is_none());
    assert_eq!(diag.detectors[0].outcome, DetectorOutcome::Skipped);
}

#[test]
fn expired_deadline_returns_timeout_without_running_detectors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let detectors: Vec<BoxedDetector> = vec![Box::new(Counting(Arc::clone(&calls)))];
    let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
    let err = combiner
        .combine(&right_angle(), Deadline::new(Duration::ZERO))
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let err = KdeCombiner::default()
        .combine(&load_stroke("square.json"), Deadline::new(Duration::ZERO))
        .unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn right_angle_consensus_includes_the_bend() {
    let stroke = right_angle();
    let combiner = KdeCombiner::default();
    let (seg, diag) = combiner
        .combine_with_diagnostics(&stroke, Deadline::unbounded())
        .unwrap();
    assert!(seg.corners().contains(&2), "got {:?}", seg.corners());
    assert_eq!(seg.corners(), &[0, 2, 3]);
    assert_eq!(diag.completed_count(), 5);

    let config = CombinerConfig {
        plateau: PlateauPolicy::FirstOfPlateau,
        ..CombinerConfig::default()
    };
    let seg = KdeCombiner::new(config).unwrap().combine(&stroke, Deadline::unbounded()).unwrap();
    assert_eq!(seg.corners(), &[0, 1, 3]);
}

#[test]
fn collinear_points_have_no_interior_corners() {
    #[allow(clippy::cast_precision_loss)]
    let coords: Vec<(f64, f64)> = (0..50).map(|i| (i as f64 * 2.0, i as f64)).collect();
    let stroke = polyline(&coords);
    let seg = KdeCombiner::default().combine(&stroke, Deadline::unbounded()).unwrap();
    assert_eq!(seg.corners(), &[0, 49]);
    assert!(PolylineMse.score(&stroke, seg.corners()) < 1e-9);
    assert!(PolylineFeatureArea.score(&stroke, seg.corners()) < 1e-9);
}

#[test]
fn detectors_that_all_time_out_leave_the_endpoints() {
    let detectors: Vec<BoxedDetector> = (0..5)
        .map(|_| Box::new(AlwaysTimesOut) as BoxedDetector)
        .collect();
    let combiner = KdeCombiner::with_detectors(CombinerConfig::default(), detectors).unwrap();
    let stroke = load_stroke("square.json");
    let (seg, diag) = combiner
        .combine_with_diagnostics(&stroke, Deadline::new(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(seg.corners(), &[0, stroke.last_index()]);
    assert_eq!(diag.completed_count(), 0);
    assert!(!diag.degraded);
}

#[test]
fn dense_l_shape_agrees_on_one_corner() {
    let stroke = dense(&[(0.0, 0.0), (50.0, 0.0), (50.0, 50.0)]);
    let seg = KdeCombiner::default().combine(&stroke, Deadline::unbounded()).unwrap();
    let interior = seg.interior_corners();
    assert_eq!(interior.len(), 1, "got {interior:?}");
    assert!(interior[0].abs_diff(50) <= 1);

    let pieces = seg.substrokes(&stroke).unwrap();
    assert_eq!(pieces.len(), 2);
    assert_eq!(pieces[0].last(), pieces[1].first());
}

#[test]
fn square_fixture_finds_its_three_corners() {
    let stroke = load_stroke("square.json");
    assert_eq!(stroke.len(), 161);
    let seg = KdeCombiner::default().combine(&stroke, Deadline::unbounded()).unwrap();
    for expected in [40, 80, 120] {
        assert!(
            seg.interior_corners().iter().any(|c| c.abs_diff(expected) <= 2),
            "no corner near {expected}: {:?}",
            seg.corners()
        );
    }
}

#[test]
fn hypotheses_cover_consensus_and_every_detector() {
    let stroke = dense(&[(0.0, 0.0), (30.0, 0.0), (30.0, 30.0)]);
    let ranked = KdeCombiner::default()
        .hypotheses(&stroke, Deadline::unbounded())
        .unwrap();
    assert_eq!(ranked.len(), 6);
    assert!(ranked.windows(2).all(|w| w[0].confidence() >= w[1].confidence()));
    for kind in CornerDetectorKind::ALL {
        assert!(ranked.iter().any(|seg| seg.label() == kind.label()));
    }
    assert!(ranked.iter().any(|seg| seg.label() == KdeCombiner::LABEL));
}

#[test]
fn agreement_confidence_rises_with_agreement() {
    let config = CombinerConfig {
        confidence: ConfidencePolicy::AgreementStrength,
        ..CombinerConfig::default()
    };
    let combiner = KdeCombiner::new(config).unwrap();
    let seg = combiner.combine(&right_angle(), Deadline::unbounded()).unwrap();
    // All five detectors propose index 2.
    assert!((seg.confidence() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn extreme_but_valid_inputs_still_segment() {
    let huge: Vec<(f64, f64)> = (0..50)
        .map(|i| (f64::from(i) * 1e298, if i % 2 == 0 { 1e300 } else { -1e300 }))
        .collect();
    let stroke = polyline(&huge);
    let ranked = KdeCombiner::default()
        .hypotheses(&stroke, Deadline::unbounded())
        .unwrap();
    assert!(ranked.iter().any(|seg| seg.label() == KdeCombiner::LABEL));
    for seg in &ranked {
        assert_eq!(seg.corners().first(), Some(&0));
        assert_eq!(seg.corners().last(), Some(&stroke.last_index()));
    }

    let extreme_times = Stroke::new(vec![
        Point::new(0.0, 0.0, i64::MIN),
        Point::new(5.0, 1.0, 0),
        Point::new(10.0, 0.0, i64::MAX),
        Point::new(12.0, 5.0, i64::MAX),
    ])
    .unwrap();
    let seg = KdeCombiner::default()
        .combine(&extreme_times, Deadline::unbounded())
        .unwrap();
    assert_valid(&seg, &extreme_times);
}

#[test]
fn stroke_json_without_id_gets_one() {
    let json = r#"{"points":[{"x":0,"y":0,"t":0},{"x":3,"y":4,"t":5}]}"#;
    let a: Stroke = serde_json::from_str(json).unwrap();
    let b: Stroke = serde_json::from_str(json).unwrap();
    assert_ne!(a.id(), b.id());
    assert!((a.path_length() - 5.0).abs() < 1e-12);

    let bad = r#"{"points":[{"x":0,"y":0,"t":5},{"x":1,"y":1,"t":4}]}"#;
    assert!(serde_json::from_str::<Stroke>(bad).is_err());
}
