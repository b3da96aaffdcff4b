//! Trend fitter: degree-1 ordinary least squares through per-interval statistics.
//!
//! Three lines per instrument. The max- and min-lines use each extremum's own
//! offset as x; the mean-line uses the interval's starting day boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, InstrumentError};
use crate::stats::IntervalStat;

/// A fitted line `y = intercept + slope * x`, x in minute offsets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub intercept: f64,
    pub slope: f64,
}

impl TrendLine {
    pub fn value_at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Which statistic a trend line was fitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Max,
    Min,
    Mean,
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineKind::Max => "max",
            LineKind::Min => "min",
            LineKind::Mean => "mean",
        };
        write!(f, "{name}")
    }
}

/// The three trend lines of one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLines {
    pub max: TrendLine,
    pub min: TrendLine,
    pub mean: TrendLine,
}

/// Least-squares line through `(x, y)` points.
///
/// Fails with `InsufficientData` when fewer than two distinct x-values exist.
pub fn fit_line(points: &[(f64, f64)]) -> Result<TrendLine, EngineError> {
    if points.len() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "{} point(s), a trend line needs at least 2",
            points.len()
        )));
    }

    let n = points.len() as f64;
    let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - x_mean;
        (sxx + dx * dx, sxy + dx * (y - y_mean))
    });

    if sxx == 0.0 || !sxx.is_finite() {
        return Err(EngineError::InsufficientData(
            "fewer than two distinct x-values".into(),
        ));
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    if !slope.is_finite() || !intercept.is_finite() {
        return Err(EngineError::InsufficientData(
            "non-finite least-squares solution".into(),
        ));
    }

    Ok(TrendLine { intercept, slope })
}

/// Fit the max-, min- and mean-lines through one instrument's interval statistics.
pub fn fit_trend_lines(stats: &[IntervalStat]) -> Result<TrendLines, InstrumentError> {
    let max_points: Vec<(f64, f64)> = stats
        .iter()
        .map(|s| (s.max.index as f64, s.max.value))
        .collect();
    let min_points: Vec<(f64, f64)> = stats
        .iter()
        .map(|s| (s.min.index as f64, s.min.value))
        .collect();
    let mean_points: Vec<(f64, f64)> = stats.iter().map(|s| (s.start as f64, s.mean)).collect();

    let fit = |points: &[(f64, f64)], line: LineKind| {
        fit_line(points).map_err(|_| InstrumentError::DegenerateFit { line })
    };

    Ok(TrendLines {
        max: fit(&max_points, LineKind::Max)?,
        min: fit(&min_points, LineKind::Min)?,
        mean: fit(&mean_points, LineKind::Mean)?,
    })
}
