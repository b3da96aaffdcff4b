//! Collaborator traits for universe and price data, plus structured data errors.
//!
//! The engine never fetches anything itself. Hosts implement these traits
//! (a replay tape, a live feed, a test double) and the cycle consumes them.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{InstrumentId, PriceSeries};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("unknown instrument: {instrument}")]
    UnknownInstrument { instrument: InstrumentId },

    #[error("{instrument}: need {required} samples of history, {available} available")]
    InsufficientHistory {
        instrument: InstrumentId,
        required: usize,
        available: usize,
    },

    #[error("csv error: {0}")]
    Csv(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no cached data for symbol '{symbol}' (run `cache import` first)")]
    NoCachedData { symbol: String },

    #[error("universe error: {0}")]
    Universe(String),
}

/// Source of the tradable universe, refreshed once per trading day.
pub trait UniverseSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Ordered, deduplicated instruments eligible on `date`.
    fn instruments(&self, date: NaiveDate) -> Result<Vec<InstrumentId>, DataError>;
}

/// Minute price history as seen at the current moment.
pub trait PriceHistory {
    /// The most recent `samples` minute prices per instrument.
    ///
    /// Instruments without data are omitted rather than failing the batch;
    /// the cycle records them as rejected.
    fn window(
        &self,
        instruments: &[InstrumentId],
        samples: usize,
    ) -> Result<BTreeMap<InstrumentId, PriceSeries>, DataError>;

    /// The most recent `samples` prices for one instrument, oldest first.
    fn recent(&self, instrument: &InstrumentId, samples: usize) -> Result<Vec<f64>, DataError>;

    /// Whether the instrument can be traded right now.
    fn can_trade(&self, instrument: &InstrumentId) -> bool;
}
