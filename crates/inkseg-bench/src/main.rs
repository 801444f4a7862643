//! inkseg-bench: CLI tool for combiner parameter experimentation and diagnostics.
//!
//! Runs the KDE consensus combiner on a stroke loaded from a JSON file
//! with configurable parameters, printing per-detector diagnostics and
//! objective scores for the consensus. Useful for:
//!
//! - Comparing detector subsets and their individual timings
//! - Tuning the KDE bandwidth and plateau tie-breaking
//! - Checking how a time budget degrades the consensus
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin inkseg-bench -- [OPTIONS] <STROKE_PATH>
//! ```
//!
//! The stroke file holds `{ "points": [{ "x": .., "y": .., "t": .. }, ..] }`
//! with an optional `"id"`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use inkseg::{
    CombineDiagnostics, CombinerConfig, ConfidencePolicy, CornerDetectorKind, Deadline,
    KdeCombiner, ObjectiveFunction, ObjectiveKind, PlateauPolicy, PrimitiveFitError, Segmentation,
    Stroke,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Combiner parameter experimentation and diagnostics for inkseg.
///
/// Segments one stroke with configurable parameters and prints detailed
/// per-detector timing and corner-count diagnostics.
#[derive(Parser)]
#[command(name = "inkseg-bench", version)]
struct Cli {
    /// Path to the stroke JSON file.
    stroke_path: PathBuf,

    /// KDE bandwidth in index units.
    #[arg(long, default_value_t = CombinerConfig::DEFAULT_BANDWIDTH)]
    bandwidth: f64,

    /// Which index of a flat density peak becomes the corner.
    #[arg(long, value_enum, default_value_t = Plateau::LastBeforeDescent)]
    plateau: Plateau,

    /// Fixed consensus confidence; ignored with `--agreement`.
    #[arg(long, default_value_t = CombinerConfig::DEFAULT_CONSENSUS_CONFIDENCE)]
    confidence: f64,

    /// Derive confidence from detector agreement instead of a fixed value.
    #[arg(long)]
    agreement: bool,

    /// Detectors to run, in order (comma separated). Defaults to all five.
    #[arg(long, value_enum, value_delimiter = ',')]
    detectors: Vec<Detector>,

    /// Time budget per run in milliseconds.
    #[arg(long, default_value_t = 1000)]
    budget_ms: u64,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Also print every detector's own segmentation, ranked.
    #[arg(long)]
    hypotheses: bool,

    /// Full combiner config as a JSON string.
    ///
    /// When provided, all other combiner parameter flags are ignored.
    /// The JSON must be a valid `CombinerConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

/// Plateau tie-breaking selection.
#[derive(Clone, Copy, ValueEnum)]
enum Plateau {
    /// Last index before the density falls.
    LastBeforeDescent,
    /// First index of the flat top.
    FirstOfPlateau,
}

/// Detector selection.
#[derive(Clone, Copy, ValueEnum)]
enum Detector {
    /// Straw-length minima.
    ShortStraw,
    /// Recursive farthest-point splitting.
    DouglasPeucker,
    /// Direction-graph peaks.
    DirectionGraph,
    /// Curvature and speed with hybrid fit.
    Sezgin,
    /// Supported direction change.
    KimSquared,
}

impl From<Detector> for CornerDetectorKind {
    fn from(detector: Detector) -> Self {
        match detector {
            Detector::ShortStraw => Self::ShortStraw,
            Detector::DouglasPeucker => Self::DouglasPeucker,
            Detector::DirectionGraph => Self::DirectionGraph,
            Detector::Sezgin => Self::Sezgin,
            Detector::KimSquared => Self::KimSquared,
        }
    }
}

/// Build a [`CombinerConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<CombinerConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let detectors = if cli.detectors.is_empty() {
        CornerDetectorKind::ALL.to_vec()
    } else {
        cli.detectors.iter().copied().map(Into::into).collect()
    };

    Ok(CombinerConfig {
        bandwidth: cli.bandwidth,
        plateau: match cli.plateau {
            Plateau::LastBeforeDescent => PlateauPolicy::LastBeforeDescent,
            Plateau::FirstOfPlateau => PlateauPolicy::FirstOfPlateau,
        },
        confidence: if cli.agreement {
            ConfidencePolicy::AgreementStrength
        } else {
            ConfidencePolicy::Fixed(cli.confidence)
        },
        detectors,
        ..CombinerConfig::default()
    })
}

fn load_stroke(path: &Path) -> Result<Stroke, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    serde_json::from_str(&json).map_err(|e| format!("Error parsing {}: {e}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let combiner = match KdeCombiner::new(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stroke = match load_stroke(&cli.stroke_path) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        path = %cli.stroke_path.display(),
        id = %stroke.id(),
        points = stroke.len(),
        "loaded stroke"
    );
    debug!(config = ?combiner.config(), runs = cli.runs, "combiner ready");

    let budget = Duration::from_millis(cli.budget_ms);
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match combiner.combine_with_diagnostics(&stroke, Deadline::new(budget)) {
            Ok((consensus, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                    println!();
                    print_segmentation(&stroke, &consensus);
                }

                // Hypotheses on the first run only.
                if run == 0 && cli.hypotheses {
                    print_hypotheses(&combiner, &stroke, budget);
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Combiner error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print corners and objective scores for one segmentation.
fn print_segmentation(stroke: &Stroke, seg: &Segmentation) {
    println!(
        "{} (confidence {:.2}): {:?}",
        seg.label(),
        seg.confidence(),
        seg.corners()
    );
    for kind in ObjectiveKind::ALL {
        println!("  {:<24} {:.6}", kind.name(), kind.score(stroke, seg.corners()));
    }
    let primitive: PrimitiveFitError = PrimitiveFitError::default();
    println!(
        "  {:<24} {:.6}",
        primitive.name(),
        primitive.score(stroke, seg.corners())
    );
}

fn print_hypotheses(combiner: &KdeCombiner, stroke: &Stroke, budget: Duration) {
    match combiner.hypotheses(stroke, Deadline::new(budget)) {
        Ok(ranked) => {
            println!();
            println!("Hypotheses ({})\n{}", ranked.len(), "=".repeat(60));
            for seg in &ranked {
                print_segmentation(stroke, seg);
            }
        }
        Err(e) => eprintln!("Hypotheses error: {e}"),
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[CombineDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    let degraded = all_diagnostics.iter().filter(|d| d.degraded).count();
    if degraded > 0 {
        println!("Degraded runs: {degraded}");
    }

    // Per-detector means, in run order of the first run.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for (position, first) in all_diagnostics[0].detectors.iter().enumerate() {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.detectors.get(position))
            .map(|run| run.duration.as_secs_f64() * 1000.0)
            .collect();
        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{:<24} {stage_mean:>10.3}ms", first.label);
    }

    let kde_durations: Vec<f64> = all_diagnostics
        .iter()
        .filter_map(|d| d.kde.as_ref())
        .map(|k| k.duration.as_secs_f64() * 1000.0)
        .collect();
    if !kde_durations.is_empty() {
        let kde_mean = kde_durations.iter().sum::<f64>() / kde_durations.len() as f64;
        println!("{:<24} {kde_mean:>10.3}ms", "KDE");
    }
}
