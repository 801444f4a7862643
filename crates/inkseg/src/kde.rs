//! One-dimensional kernel density estimation over corner positions.
//!
//! The combiner pools every interior corner index its detectors
//! proposed, treats the pool as samples along "position in the stroke",
//! and looks for the peaks of a Gaussian KDE evaluated at every integer
//! position. Repeated indices are kept: two detectors agreeing on a
//! corner doubles its weight.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::deadline::{Checkpoint, TimeoutError};

/// Which index of a flat-topped peak is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlateauPolicy {
    /// The last index before the density strictly decreases.
    #[default]
    LastBeforeDescent,
    /// The first index of the plateau.
    FirstOfPlateau,
}

/// Kernel half-width in bandwidths. Past it a sample adds less than
/// `exp(-32)` of its peak weight and is left out.
pub const KERNEL_CUTOFF: f64 = 8.0;

/// Gaussian KDE of `pool` evaluated at `0..len`.
///
/// The pool is first collapsed into per-position counts and summed in
/// ascending position order, so two positions placed symmetrically
/// around the same samples get bit-identical densities. Each sample
/// only reaches [`KERNEL_CUTOFF`] bandwidths to either side, which keeps
/// the cost at one pass over the curve plus the kernel windows. An
/// empty pool gives an all-zero curve.
///
/// # Errors
///
/// Returns [`TimeoutError`] if `checkpoint` reports an expired deadline.
pub fn density(
    pool: &[usize],
    len: usize,
    bandwidth: f64,
    checkpoint: &mut Checkpoint,
) -> Result<Vec<f64>, TimeoutError> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &index in pool {
        checkpoint.tick()?;
        *counts.entry(index).or_insert(0) += 1;
    }
    let mut curve = vec![0.0; len];
    if counts.is_empty() || len == 0 {
        return Ok(curve);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let reach = (KERNEL_CUTOFF * bandwidth).ceil() as usize;
    for (&x, &count) in &counts {
        let lo = x.saturating_sub(reach);
        let hi = x.saturating_add(reach).min(len - 1);
        #[allow(clippy::cast_precision_loss)]
        let weight = count as f64;
        for (y, value) in curve.iter_mut().enumerate().take(hi + 1).skip(lo) {
            checkpoint.tick()?;
            #[allow(clippy::cast_precision_loss)]
            let u = (y as f64 - x as f64) / bandwidth;
            *value += weight * (-0.5 * u * u).exp();
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let norm = 1.0 / (pool.len() as f64 * bandwidth * TAU.sqrt());
    for value in &mut curve {
        *value *= norm;
    }
    Ok(curve)
}

/// Local maxima of a density curve in a single left-to-right pass.
///
/// A maximum is recorded when the curve strictly decreases after
/// rising (or from the start); scanning then waits for the next strict
/// rise. `policy` picks which index of a flat top is reported.
///
/// # Errors
///
/// Returns [`TimeoutError`] if `checkpoint` reports an expired deadline.
pub fn local_maxima(
    curve: &[f64],
    policy: PlateauPolicy,
    checkpoint: &mut Checkpoint,
) -> Result<Vec<usize>, TimeoutError> {
    let mut maxima = Vec::new();
    let mut searching = true;
    let mut plateau_start = 0;
    for i in 1..curve.len() {
        checkpoint.tick()?;
        if curve[i] > curve[i - 1] {
            searching = true;
            plateau_start = i;
        } else if curve[i] < curve[i - 1] && searching {
            maxima.push(match policy {
                PlateauPolicy::LastBeforeDescent => i - 1,
                PlateauPolicy::FirstOfPlateau => plateau_start,
            });
            searching = false;
        }
    }
    Ok(maxima)
}
