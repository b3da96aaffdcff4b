//! Engine error types.
//!
//! Two layers: `EngineError` is structural and aborts a whole cycle (except
//! `NonIntersectingTrend`, which the convergence filter turns into an
//! exclusion). `InstrumentError` is local to one instrument and only removes
//! that instrument from the cycle.

use thiserror::Error;

use crate::fit::LineKind;

/// Structural failures of the trend-fitting engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed window/interval sizing. Detected at setup; no cycle runs.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Too few intervals or points to fit a trend line. Aborts the cycle.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Raw scores summed to zero (or a non-finite value). Aborts the cycle.
    #[error("degenerate weights: raw scores sum to {sum}")]
    DegenerateWeights { sum: f64 },

    /// Max-line and min-line are parallel. Not a fault: the instrument is excluded.
    #[error("max and min trend lines are parallel and never intersect")]
    NonIntersectingTrend,
}

/// Failures confined to a single instrument's data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    #[error("series has {actual} samples, window needs {required}")]
    ShortSeries { required: usize, actual: usize },

    #[error("missing or non-finite price at offset {offset}")]
    PriceGap { offset: usize },

    #[error("{line} trend line cannot be fitted (fewer than two distinct x-values)")]
    DegenerateFit { line: LineKind },
}
