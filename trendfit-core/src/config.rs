//! Engine configuration: rolling window sizing and the mean-slope threshold.

use serde::{Deserialize, Serialize};

use crate::domain::MINUTES_PER_DAY;
use crate::error::EngineError;

/// Sizing and filtering parameters for one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rolling window length in trading days (W).
    pub window_days: usize,
    /// Width of each sub-interval in trading days (S).
    pub sampling_interval_days: usize,
    /// Minimum mean-line slope, in price units per minute.
    ///
    /// Not normalized by price level, so a fixed value admits high-priced
    /// instruments far more readily than low-priced ones.
    pub mean_slope_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: 10,
            sampling_interval_days: 2,
            mean_slope_threshold: 0.5,
        }
    }
}

impl EngineConfig {
    /// Reject sizings that cannot produce two intervals to fit through.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sampling_interval_days < 1 {
            return Err(EngineError::Configuration(
                "sampling_interval_days must be at least 1".into(),
            ));
        }
        if self.sampling_interval_days >= self.window_days {
            return Err(EngineError::Configuration(format!(
                "sampling_interval_days ({}) must be smaller than window_days ({})",
                self.sampling_interval_days, self.window_days
            )));
        }
        if self.interval_count() < 2 {
            return Err(EngineError::Configuration(format!(
                "window_days - sampling_interval_days must be at least 2 to fit a trend line, got {}",
                self.interval_count()
            )));
        }
        if !self.mean_slope_threshold.is_finite() || self.mean_slope_threshold < 0.0 {
            return Err(EngineError::Configuration(format!(
                "mean_slope_threshold must be finite and non-negative, got {}",
                self.mean_slope_threshold
            )));
        }
        Ok(())
    }

    /// Number of sub-intervals the partitioner will produce (W - S).
    pub fn interval_count(&self) -> usize {
        self.window_days.saturating_sub(self.sampling_interval_days)
    }

    /// Window length in minute samples (W * 390).
    pub fn window_minutes(&self) -> usize {
        self.window_days * MINUTES_PER_DAY
    }
}
