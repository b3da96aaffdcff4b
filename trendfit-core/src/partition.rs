//! Interval partitioner.
//!
//! Splits a rolling window of `W` trading days into `W - S` overlapping
//! sub-intervals, each spanning `S` days of minute offsets. Interval `i`
//! runs from day boundary `i` to day boundary `i + S`, both ends inclusive,
//! so consecutive intervals share all but one day.

use serde::{Deserialize, Serialize};

use crate::domain::MINUTES_PER_DAY;
use crate::error::EngineError;

/// Inclusive range of minute offsets within the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRange {
    pub start: usize,
    pub end: usize,
}

impl IntervalRange {
    /// Number of samples covered (inclusive on both ends).
    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset <= self.end
    }
}

/// Ordered, monotonically increasing sub-intervals of one rolling window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSet {
    window_days: usize,
    sampling_interval_days: usize,
    ranges: Vec<IntervalRange>,
}

impl IntervalSet {
    pub fn ranges(&self) -> &[IntervalRange] {
        &self.ranges
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntervalRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn window_days(&self) -> usize {
        self.window_days
    }

    pub fn sampling_interval_days(&self) -> usize {
        self.sampling_interval_days
    }

    /// Window length in minute samples.
    pub fn window_len(&self) -> usize {
        self.window_days * MINUTES_PER_DAY
    }

    /// Smallest series length that covers every interval.
    pub fn required_samples(&self) -> usize {
        self.ranges.last().map_or(0, |r| r.end + 1)
    }
}

/// Partition a `window_days`-day window into `sampling_interval_days`-wide intervals.
pub fn partition(
    window_days: usize,
    sampling_interval_days: usize,
) -> Result<IntervalSet, EngineError> {
    if sampling_interval_days < 1 {
        return Err(EngineError::Configuration(
            "sampling interval must be at least one day".into(),
        ));
    }
    if sampling_interval_days >= window_days {
        return Err(EngineError::Configuration(format!(
            "sampling interval of {sampling_interval_days} day(s) leaves no intervals in a {window_days}-day window"
        )));
    }

    let bounds: Vec<usize> = (0..window_days).map(|day| day * MINUTES_PER_DAY).collect();
    let ranges = (0..window_days - sampling_interval_days)
        .map(|i| IntervalRange {
            start: bounds[i],
            end: bounds[i + sampling_interval_days],
        })
        .collect();

    Ok(IntervalSet {
        window_days,
        sampling_interval_days,
        ranges,
    })
}
