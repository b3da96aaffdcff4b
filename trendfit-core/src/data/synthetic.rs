//! Deterministic synthetic minute tapes for demos and tests.
//!
//! Each symbol gets its own `StdRng` seeded from BLAKE3(master seed, symbol),
//! so adding a symbol never changes the prices of the others. Prices follow
//! a drifting trend, a damped oscillation (which gives converging envelopes)
//! and a small random walk.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::provider::DataError;
use super::tape::MinuteTape;
use crate::domain::{InstrumentId, MINUTES_PER_DAY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub start: NaiveDate,
    /// Trading days to generate (weekends are skipped).
    pub days: usize,
    pub seed: u64,
    pub base_price: f64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default(),
            days: 30,
            seed: 42,
            base_price: 100.0,
        }
    }
}

fn symbol_rng(seed: u64, symbol: &str) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(symbol.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// The first `count` weekdays on or after `start`.
pub fn trading_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(count)
        .collect()
}

/// Minute prices for one symbol, `days * MINUTES_PER_DAY` samples.
pub fn synthetic_prices(symbol: &str, spec: &SyntheticSpec) -> Vec<f64> {
    let mut rng = symbol_rng(spec.seed, symbol);
    let len = spec.days * MINUTES_PER_DAY;

    let drift = rng.gen_range(-0.002..0.006) * spec.base_price / 100.0;
    let amplitude = rng.gen_range(0.01..0.06) * spec.base_price;
    let period = rng.gen_range(150.0..600.0);
    let damping = rng.gen_range(0.2..1.0);
    let step = 0.0005 * spec.base_price;

    let mut walk = 0.0_f64;
    let floor = spec.base_price * 0.05;
    (0..len)
        .map(|t| {
            walk += rng.gen_range(-step..step);
            let t = t as f64;
            let decay = 1.0 - damping * t / len.max(1) as f64;
            let price = spec.base_price + drift * t + amplitude * decay * (t / period).sin() + walk;
            price.max(floor)
        })
        .collect()
}

/// A full tape over `symbols`.
pub fn synthetic_tape(symbols: &[&str], spec: &SyntheticSpec) -> Result<MinuteTape, DataError> {
    if !(spec.base_price.is_finite() && spec.base_price > 0.0) {
        return Err(DataError::ValidationError(format!(
            "base price must be positive, got {}",
            spec.base_price
        )));
    }
    let days = trading_days(spec.start, spec.days);
    let prices: BTreeMap<InstrumentId, Vec<f64>> = symbols
        .iter()
        .map(|s| (InstrumentId::from(*s), synthetic_prices(s, spec)))
        .collect();
    tracing::debug!(symbols = symbols.len(), days = days.len(), seed = spec.seed, "generated synthetic tape");
    MinuteTape::new(days, prices)
}
