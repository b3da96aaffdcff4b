//! MinuteTape: aligned minute prices for a set of instruments.
//!
//! Every instrument shares one day grid of `MINUTES_PER_DAY` samples per
//! trading day. Samples absent from the source are stored as NaN. The tape
//! carries a cursor: only samples before the cursor are visible through
//! [`PriceHistory`], which lets a replay walk the tape minute by minute
//! without look-ahead.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};

use super::provider::{DataError, PriceHistory, UniverseSource};
use crate::domain::bar::session_timestamp;
use crate::domain::{DatasetHash, InstrumentId, MinuteBar, PriceSeries, MINUTES_PER_DAY};

#[derive(Debug, Clone, PartialEq)]
pub struct MinuteTape {
    days: Vec<NaiveDate>,
    prices: BTreeMap<InstrumentId, Vec<f64>>,
    /// Number of visible samples (exclusive end position).
    cursor: usize,
}

impl MinuteTape {
    /// Build a tape from pre-aligned price vectors.
    ///
    /// Every vector must hold exactly `days.len() * MINUTES_PER_DAY` samples.
    /// The cursor starts at the end of the tape.
    pub fn new(
        days: Vec<NaiveDate>,
        prices: BTreeMap<InstrumentId, Vec<f64>>,
    ) -> Result<Self, DataError> {
        if days.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DataError::ValidationError(
                "trading days must be strictly increasing".into(),
            ));
        }
        let expected = days.len() * MINUTES_PER_DAY;
        for (instrument, series) in &prices {
            if series.len() != expected {
                return Err(DataError::ValidationError(format!(
                    "{instrument}: {} samples, expected {expected} ({} days)",
                    series.len(),
                    days.len()
                )));
            }
        }
        Ok(Self {
            days,
            prices,
            cursor: expected,
        })
    }

    /// Align per-instrument bars onto the union of their trading days.
    ///
    /// Minutes missing for an instrument become NaN. Duplicate samples for the
    /// same instrument and minute are rejected.
    pub fn from_bars(bars: BTreeMap<InstrumentId, Vec<MinuteBar>>) -> Result<Self, DataError> {
        let days: Vec<NaiveDate> = bars
            .values()
            .flatten()
            .map(|b| b.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let day_index: BTreeMap<NaiveDate, usize> =
            days.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut prices = BTreeMap::new();
        for (instrument, series) in bars {
            let mut grid = vec![f64::NAN; days.len() * MINUTES_PER_DAY];
            let mut seen = vec![false; grid.len()];
            for bar in series {
                if bar.minute as usize >= MINUTES_PER_DAY {
                    return Err(DataError::ValidationError(format!(
                        "{instrument}: minute {} on {} is outside the session",
                        bar.minute, bar.date
                    )));
                }
                let Some(day) = day_index.get(&bar.date) else {
                    continue;
                };
                let pos = day * MINUTES_PER_DAY + bar.minute as usize;
                if seen[pos] {
                    return Err(DataError::ValidationError(format!(
                        "{instrument}: duplicate sample at {} minute {}",
                        bar.date, bar.minute
                    )));
                }
                seen[pos] = true;
                grid[pos] = bar.price;
            }
            prices.insert(instrument, grid);
        }
        Self::new(days, prices)
    }

    /// Finite samples for one instrument, in tape order.
    pub fn bars_for(&self, instrument: &InstrumentId) -> Vec<MinuteBar> {
        let Some(series) = self.prices.get(instrument) else {
            return Vec::new();
        };
        series
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .map(|(pos, &price)| MinuteBar {
                date: self.days[pos / MINUTES_PER_DAY],
                minute: (pos % MINUTES_PER_DAY) as u32,
                price,
            })
            .collect()
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn symbols(&self) -> impl Iterator<Item = &InstrumentId> {
        self.prices.keys()
    }

    pub fn instrument_count(&self) -> usize {
        self.prices.len()
    }

    pub fn contains(&self, instrument: &InstrumentId) -> bool {
        self.prices.contains_key(instrument)
    }

    /// Total samples per instrument.
    pub fn len(&self) -> usize {
        self.days.len() * MINUTES_PER_DAY
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor; positions past the end are clamped.
    pub fn set_cursor(&mut self, position: usize) {
        self.cursor = position.min(self.len());
    }

    /// Tape position of a session minute, if that day is on the tape.
    pub fn position_of(&self, date: NaiveDate, minute: u32) -> Option<usize> {
        if minute as usize >= MINUTES_PER_DAY {
            return None;
        }
        let day = self.days.binary_search(&date).ok()?;
        Some(day * MINUTES_PER_DAY + minute as usize)
    }

    /// Wall-clock timestamp of a tape position.
    pub fn timestamp_at(&self, position: usize) -> Option<NaiveDateTime> {
        let date = self.days.get(position / MINUTES_PER_DAY)?;
        session_timestamp(*date, (position % MINUTES_PER_DAY) as u32)
    }

    /// Price at a tape position, ignoring the cursor.
    pub fn price_at(&self, instrument: &InstrumentId, position: usize) -> Option<f64> {
        self.prices
            .get(instrument)?
            .get(position)
            .copied()
            .filter(|p| p.is_finite())
    }

    /// Most recent visible price (the sample just before the cursor).
    pub fn current_price(&self, instrument: &InstrumentId) -> Option<f64> {
        self.price_at(instrument, self.cursor.checked_sub(1)?)
    }

    /// NaN samples per instrument, for instruments that have any.
    pub fn missing_samples(&self) -> BTreeMap<InstrumentId, usize> {
        self.prices
            .iter()
            .map(|(id, series)| (id.clone(), series.iter().filter(|p| !p.is_finite()).count()))
            .filter(|(_, missing)| *missing > 0)
            .collect()
    }

    /// Deterministic BLAKE3 hash over days, instruments and prices.
    pub fn dataset_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        for day in &self.days {
            hasher.update(day.to_string().as_bytes());
        }
        for (instrument, series) in &self.prices {
            hasher.update(instrument.as_str().as_bytes());
            for price in series {
                hasher.update(&price.to_le_bytes());
            }
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }

    fn visible(&self, instrument: &InstrumentId) -> Option<&[f64]> {
        self.prices.get(instrument).map(|s| &s[..self.cursor])
    }
}

impl PriceHistory for MinuteTape {
    fn window(
        &self,
        instruments: &[InstrumentId],
        samples: usize,
    ) -> Result<BTreeMap<InstrumentId, PriceSeries>, DataError> {
        let mut out = BTreeMap::new();
        for instrument in instruments {
            let Some(visible) = self.visible(instrument) else {
                continue;
            };
            let start = visible.len().saturating_sub(samples);
            let mut series = PriceSeries::new(visible[start..].to_vec());
            if let Some(ts) = self.timestamp_at(start) {
                series = series.with_start(ts);
            }
            out.insert(instrument.clone(), series);
        }
        Ok(out)
    }

    fn recent(&self, instrument: &InstrumentId, samples: usize) -> Result<Vec<f64>, DataError> {
        let visible = self
            .visible(instrument)
            .ok_or_else(|| DataError::UnknownInstrument {
                instrument: instrument.clone(),
            })?;
        let start = visible.len().saturating_sub(samples);
        Ok(visible[start..].to_vec())
    }

    fn can_trade(&self, instrument: &InstrumentId) -> bool {
        self.current_price(instrument).is_some()
    }
}

impl UniverseSource for MinuteTape {
    fn name(&self) -> &str {
        "tape"
    }

    /// Instruments with at least one price on `date`.
    fn instruments(&self, date: NaiveDate) -> Result<Vec<InstrumentId>, DataError> {
        let Ok(day) = self.days.binary_search(&date) else {
            return Ok(Vec::new());
        };
        let range = day * MINUTES_PER_DAY..(day + 1) * MINUTES_PER_DAY;
        Ok(self
            .prices
            .iter()
            .filter(|(_, series)| series[range.clone()].iter().any(|p| p.is_finite()))
            .map(|(id, _)| id.clone())
            .collect())
    }
}
