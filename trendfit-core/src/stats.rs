//! Local statistics extractor.
//!
//! For every sub-interval, one scan over the inclusive slice yields the
//! first-occurrence maximum, the first-occurrence minimum, and the mean.
//! Offsets are absolute positions in the rolling window, not positions
//! within the slice.

use serde::{Deserialize, Serialize};

use crate::error::InstrumentError;
use crate::partition::{IntervalRange, IntervalSet};

/// A local extremum: where it occurred and its price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    pub index: usize,
    pub value: f64,
}

/// Statistics for one (instrument, interval) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalStat {
    /// Starting day boundary of the interval (x-value of the mean line).
    pub start: usize,
    pub max: Extremum,
    pub min: Extremum,
    pub mean: f64,
}

/// Compute the statistics of a single interval.
pub fn interval_stat(prices: &[f64], range: IntervalRange) -> Result<IntervalStat, InstrumentError> {
    if range.end >= prices.len() {
        return Err(InstrumentError::ShortSeries {
            required: range.end + 1,
            actual: prices.len(),
        });
    }

    let slice = &prices[range.start..=range.end];
    let first = slice[0];
    if !first.is_finite() {
        return Err(InstrumentError::PriceGap {
            offset: range.start,
        });
    }

    let mut max = Extremum {
        index: range.start,
        value: first,
    };
    let mut min = max;
    let mut sum = 0.0;

    for (i, &price) in slice.iter().enumerate() {
        if !price.is_finite() {
            return Err(InstrumentError::PriceGap {
                offset: range.start + i,
            });
        }
        // Strict comparisons keep the first occurrence on ties.
        if price > max.value {
            max = Extremum {
                index: range.start + i,
                value: price,
            };
        }
        if price < min.value {
            min = Extremum {
                index: range.start + i,
                value: price,
            };
        }
        sum += price;
    }

    // Rounding can push the mean of a flat slice a hair past its extremes.
    let mean = (sum / slice.len() as f64).clamp(min.value, max.value);

    Ok(IntervalStat {
        start: range.start,
        max,
        min,
        mean,
    })
}

/// Compute statistics for every interval, preserving interval order.
pub fn extract(prices: &[f64], intervals: &IntervalSet) -> Result<Vec<IntervalStat>, InstrumentError> {
    intervals
        .iter()
        .map(|range| interval_stat(prices, *range))
        .collect()
}

/// Mean of the per-interval means. NaN for an empty slice.
pub fn moving_average(stats: &[IntervalStat]) -> f64 {
    if stats.is_empty() {
        return f64::NAN;
    }
    stats.iter().map(|s| s.mean).sum::<f64>() / stats.len() as f64
}
