//! Convergence filter.
//!
//! An instrument qualifies when its max-line and min-line meet after the
//! start of the window (`x > 0`) and its mean-line rises faster than a fixed
//! threshold. All instruments are screened in a single pass that produces the
//! candidate map and the rejection list together, keyed by instrument.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::InstrumentId;
use crate::error::{EngineError, InstrumentError};
use crate::fit::{LineKind, TrendLine, TrendLines};

/// Slope differences at or below this are treated as parallel lines.
pub const PARALLEL_TOLERANCE: f64 = 1e-12;

/// Offset at which the max-line and min-line intersect.
///
/// Solves `intercept_max + slope_max * x = intercept_min + slope_min * x`.
/// Parallel (or numerically parallel) lines yield `NonIntersectingTrend`.
pub fn intersection(max: &TrendLine, min: &TrendLine) -> Result<f64, EngineError> {
    let denominator = min.slope - max.slope;
    if denominator.abs() <= PARALLEL_TOLERANCE {
        return Err(EngineError::NonIntersectingTrend);
    }
    let x = (max.intercept - min.intercept) / denominator;
    if !x.is_finite() {
        return Err(EngineError::NonIntersectingTrend);
    }
    Ok(x)
}

/// Trend lines plus the return-normalization denominator for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub lines: TrendLines,
    pub moving_average: f64,
}

/// An instrument that passed the filter.
///
/// Convergence timing and return estimate live in one record, so they can
/// never drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub convergence_index: f64,
    pub mean_slope: f64,
    pub moving_average: f64,
}

/// Why an instrument left the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MissingSeries,
    ShortSeries { required: usize, actual: usize },
    PriceGap { offset: usize },
    DegenerateFit { line: LineKind },
    ParallelTrendLines,
    ConvergenceBehindWindow { convergence_index: f64 },
    SlopeBelowThreshold { mean_slope: f64, threshold: f64 },
    NonPositiveAverage { moving_average: f64 },
}

impl From<InstrumentError> for RejectReason {
    fn from(err: InstrumentError) -> Self {
        match err {
            InstrumentError::ShortSeries { required, actual } => {
                RejectReason::ShortSeries { required, actual }
            }
            InstrumentError::PriceGap { offset } => RejectReason::PriceGap { offset },
            InstrumentError::DegenerateFit { line } => RejectReason::DegenerateFit { line },
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingSeries => write!(f, "no price series"),
            RejectReason::ShortSeries { required, actual } => {
                write!(f, "short series ({actual}/{required} samples)")
            }
            RejectReason::PriceGap { offset } => write!(f, "price gap at offset {offset}"),
            RejectReason::DegenerateFit { line } => write!(f, "degenerate {line} fit"),
            RejectReason::ParallelTrendLines => write!(f, "max/min lines parallel"),
            RejectReason::ConvergenceBehindWindow { convergence_index } => {
                write!(f, "lines converged at {convergence_index:.1}, not ahead of window start")
            }
            RejectReason::SlopeBelowThreshold {
                mean_slope,
                threshold,
            } => write!(f, "mean slope {mean_slope:.4} <= threshold {threshold}"),
            RejectReason::NonPositiveAverage { moving_average } => {
                write!(f, "moving average {moving_average} not positive")
            }
        }
    }
}

/// One excluded instrument and the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub instrument: InstrumentId,
    #[serde(flatten)]
    pub reason: RejectReason,
}

impl Rejection {
    pub fn new(instrument: InstrumentId, reason: impl Into<RejectReason>) -> Self {
        Self {
            instrument,
            reason: reason.into(),
        }
    }
}

/// Apply the retention rule to one instrument.
pub fn screen(assessment: &TrendAssessment, threshold: f64) -> Result<Candidate, RejectReason> {
    let lines = &assessment.lines;
    let convergence_index =
        intersection(&lines.max, &lines.min).map_err(|_| RejectReason::ParallelTrendLines)?;

    if convergence_index <= 0.0 {
        return Err(RejectReason::ConvergenceBehindWindow { convergence_index });
    }
    if lines.mean.slope <= threshold {
        return Err(RejectReason::SlopeBelowThreshold {
            mean_slope: lines.mean.slope,
            threshold,
        });
    }
    let moving_average = assessment.moving_average;
    if !(moving_average.is_finite() && moving_average > 0.0) {
        return Err(RejectReason::NonPositiveAverage { moving_average });
    }

    Ok(Candidate {
        convergence_index,
        mean_slope: lines.mean.slope,
        moving_average,
    })
}

/// Result of screening every assessed instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screening {
    pub candidates: BTreeMap<InstrumentId, Candidate>,
    pub rejections: Vec<Rejection>,
}

/// The mean-slope threshold filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceFilter {
    threshold: f64,
}

impl ConvergenceFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Screen all instruments in one pass, in instrument order.
    pub fn apply(&self, assessed: &BTreeMap<InstrumentId, TrendAssessment>) -> Screening {
        let mut screening = Screening::default();
        for (instrument, assessment) in assessed {
            match screen(assessment, self.threshold) {
                Ok(candidate) => {
                    screening.candidates.insert(instrument.clone(), candidate);
                }
                Err(reason) => {
                    tracing::debug!(%instrument, %reason, "instrument filtered");
                    screening
                        .rejections
                        .push(Rejection::new(instrument.clone(), reason));
                }
            }
        }
        screening
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(intercept: f64, slope: f64) -> TrendLine {
        TrendLine { intercept, slope }
    }

    fn assessment(max: TrendLine, min: TrendLine, mean_slope: f64) -> TrendAssessment {
        TrendAssessment {
            lines: TrendLines {
                max,
                min,
                mean: line(100.0, mean_slope),
            },
            moving_average: 100.0,
        }
    }

    #[test]
    fn narrowing_wedge_intersects_ahead() {
        // max falls, min rises: 110 - 0.01x = 90 + 0.01x at x = 1000
        let x = intersection(&line(110.0, -0.01), &line(90.0, 0.01)).unwrap();
        assert!((x - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn parallel_lines_do_not_intersect() {
        assert_eq!(
            intersection(&line(110.0, 0.5), &line(90.0, 0.5)),
            Err(EngineError::NonIntersectingTrend)
        );
    }

    #[test]
    fn parallel_lines_are_excluded_not_errors() {
        let a = assessment(line(110.0, 0.5), line(90.0, 0.5), 2.0);
        assert_eq!(screen(&a, 0.5), Err(RejectReason::ParallelTrendLines));
    }

    #[test]
    fn convergence_before_window_start_excluded() {
        // widening: max rises faster than min, lines met at x = -1000
        let a = assessment(line(110.0, 0.03), line(90.0, 0.01), 2.0);
        assert!(matches!(
            screen(&a, 0.5),
            Err(RejectReason::ConvergenceBehindWindow { .. })
        ));
    }

    #[test]
    fn slope_at_threshold_excluded() {
        let a = assessment(line(110.0, -0.01), line(90.0, 0.01), 0.5);
        assert!(matches!(
            screen(&a, 0.5),
            Err(RejectReason::SlopeBelowThreshold { .. })
        ));
    }

    #[test]
    fn qualifying_instrument_retained() {
        let a = assessment(line(110.0, -0.01), line(90.0, 0.01), 0.75);
        let candidate = screen(&a, 0.5).unwrap();
        assert!((candidate.convergence_index - 1000.0).abs() < 1e-9);
        assert_eq!(candidate.mean_slope, 0.75);
        assert_eq!(candidate.moving_average, 100.0);
    }

    #[test]
    fn apply_partitions_into_candidates_and_rejections() {
        let mut assessed = BTreeMap::new();
        assessed.insert(
            InstrumentId::from("KEEP"),
            assessment(line(110.0, -0.01), line(90.0, 0.01), 1.0),
        );
        assessed.insert(
            InstrumentId::from("FLAT"),
            assessment(line(110.0, 0.2), line(90.0, 0.2), 1.0),
        );

        let screening = ConvergenceFilter::new(0.5).apply(&assessed);
        assert_eq!(screening.candidates.len(), 1);
        assert!(screening.candidates.contains_key(&InstrumentId::from("KEEP")));
        assert_eq!(screening.rejections.len(), 1);
        assert_eq!(screening.rejections[0].instrument.as_str(), "FLAT");
        assert_eq!(screening.rejections[0].reason, RejectReason::ParallelTrendLines);
    }

    #[test]
    fn rejection_serializes_flat() {
        let rejection = Rejection::new(InstrumentId::from("XYZ"), RejectReason::ParallelTrendLines);
        let json = serde_json::to_string(&rejection).unwrap();
        assert_eq!(json, r#"{"instrument":"XYZ","reason":"parallel_trend_lines"}"#);
    }
}
