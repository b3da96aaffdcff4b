//! Weight synthesizer.
//!
//! Raw score per candidate, with `L` the window length in minutes:
//!
//! ```text
//! c   = |1 - x / L|                          convergence timing
//! r   = mean_slope * L / moving_average      relative return over the window
//! raw = c + r
//! ```
//!
//! Weights are the raw scores rescaled to sum to one. Summation always runs in
//! instrument order, so identical inputs give bit-identical weights no matter
//! how the universe was ordered.

use std::collections::BTreeMap;

use crate::convergence::Candidate;
use crate::domain::{InstrumentId, WeightVector};
use crate::error::EngineError;

/// Convergence-timing term: near 1 when the lines meet at the window start,
/// near 0 when they meet at the far edge of the window.
pub fn convergence_coefficient(convergence_index: f64, window_minutes: f64) -> f64 {
    (1.0 - convergence_index / window_minutes).abs()
}

/// Per-minute trend slope scaled to the whole window, relative to the average price.
pub fn return_coefficient(mean_slope: f64, moving_average: f64, window_minutes: f64) -> f64 {
    mean_slope * window_minutes / moving_average
}

pub fn raw_score(candidate: &Candidate, window_minutes: f64) -> f64 {
    convergence_coefficient(candidate.convergence_index, window_minutes)
        + return_coefficient(
            candidate.mean_slope,
            candidate.moving_average,
            window_minutes,
        )
}

pub fn raw_scores(
    candidates: &BTreeMap<InstrumentId, Candidate>,
    window_minutes: f64,
) -> BTreeMap<InstrumentId, f64> {
    candidates
        .iter()
        .map(|(id, candidate)| (id.clone(), raw_score(candidate, window_minutes)))
        .collect()
}

/// Rescale raw scores to sum to one.
///
/// An empty input is an empty vector, not an error. A zero or non-finite sum
/// fails with `DegenerateWeights` instead of dividing through.
pub fn normalize(raw: &BTreeMap<InstrumentId, f64>) -> Result<WeightVector, EngineError> {
    if raw.is_empty() {
        return Ok(WeightVector::new());
    }

    let sum: f64 = raw.values().sum();
    if sum == 0.0 || !sum.is_finite() {
        return Err(EngineError::DegenerateWeights { sum });
    }

    Ok(raw
        .iter()
        .map(|(id, score)| (id.clone(), score / sum))
        .collect())
}

/// Raw scores and normalized weights in one step.
pub fn synthesize(
    candidates: &BTreeMap<InstrumentId, Candidate>,
    window_minutes: f64,
) -> Result<WeightVector, EngineError> {
    normalize(&raw_scores(candidates, window_minutes))
}
