//! PriceSeries: one instrument's rolling window of minute prices.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Regular-session minutes per trading day.
pub const MINUTES_PER_DAY: usize = 390;

/// Minute prices for one instrument, re-indexed to offsets `0..len` from the
/// start of the rolling window.
///
/// Missing samples are NaN; the statistics extractor rejects the instrument
/// rather than interpolating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    /// Timestamp of offset 0, for reporting only.
    pub start: Option<NaiveDateTime>,
    prices: Vec<f64>,
}

impl PriceSeries {
    pub fn new(prices: Vec<f64>) -> Self {
        Self {
            start: None,
            prices,
        }
    }

    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Number of whole trading days covered.
    pub fn days(&self) -> usize {
        self.prices.len() / MINUTES_PER_DAY
    }

    pub fn last(&self) -> Option<f64> {
        self.prices.last().copied()
    }

    /// The most recent `n` samples (all of them when fewer exist).
    pub fn tail(&self, n: usize) -> &[f64] {
        let start = self.prices.len().saturating_sub(n);
        &self.prices[start..]
    }
}

impl From<Vec<f64>> for PriceSeries {
    fn from(prices: Vec<f64>) -> Self {
        Self::new(prices)
    }
}
