//! One evaluation cycle: price windows in, weight vector out.
//!
//! The cycle either completes or fails as a whole. Per-instrument data
//! problems become `Rejection`s and the rest of the universe is still
//! weighted; structural problems (too few intervals, degenerate
//! normalization) return an error and no weights at all.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::EngineConfig;
use crate::convergence::{
    Candidate, ConvergenceFilter, RejectReason, Rejection, TrendAssessment,
};
use crate::domain::{InstrumentId, PriceSeries, WeightVector};
use crate::error::{EngineError, InstrumentError};
use crate::fit::fit_trend_lines;
use crate::partition::{partition, IntervalSet};
use crate::stats::{extract, moving_average};
use crate::weights::{normalize, raw_scores};

/// Everything one cycle reads.
#[derive(Debug, Clone, Default)]
pub struct CycleInput {
    pub as_of: NaiveDateTime,
    /// The universe for this cycle, as delivered by the screening collaborator.
    pub instruments: Vec<InstrumentId>,
    pub series: BTreeMap<InstrumentId, PriceSeries>,
}

impl CycleInput {
    /// Input whose universe is exactly the instruments with a series.
    pub fn from_series(as_of: NaiveDateTime, series: BTreeMap<InstrumentId, PriceSeries>) -> Self {
        Self {
            as_of,
            instruments: series.keys().cloned().collect(),
            series,
        }
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub as_of: NaiveDateTime,
    pub interval_count: usize,
    /// Distinct instruments considered.
    pub evaluated: usize,
    pub candidates: BTreeMap<InstrumentId, Candidate>,
    pub raw_scores: BTreeMap<InstrumentId, f64>,
    pub weights: WeightVector,
    /// Sorted by instrument.
    pub rejections: Vec<Rejection>,
}

/// A validated configuration with its interval partition precomputed.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    intervals: IntervalSet,
}

impl Engine {
    /// Validate `config` and partition the window. Fails with `Configuration`.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let intervals = partition(config.window_days, config.sampling_interval_days)?;
        Ok(Self { config, intervals })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn intervals(&self) -> &IntervalSet {
        &self.intervals
    }

    /// Samples each instrument's series must carry.
    pub fn window_minutes(&self) -> usize {
        self.config.window_minutes()
    }

    /// Interval statistics, trend lines and moving average for one series.
    pub fn assess(&self, series: &PriceSeries) -> Result<TrendAssessment, InstrumentError> {
        let required = self.window_minutes();
        if series.len() < required {
            return Err(InstrumentError::ShortSeries {
                required,
                actual: series.len(),
            });
        }
        let prices = series.tail(required);
        let stats = extract(prices, &self.intervals)?;
        let lines = fit_trend_lines(&stats)?;
        Ok(TrendAssessment {
            lines,
            moving_average: moving_average(&stats),
        })
    }

    /// Run partition → statistics → fit → filter → weights for every instrument.
    pub fn evaluate(&self, input: &CycleInput) -> Result<CycleReport, EngineError> {
        if self.intervals.len() < 2 {
            return Err(EngineError::InsufficientData(format!(
                "{} interval(s), at least 2 are needed to fit trend lines",
                self.intervals.len()
            )));
        }

        let universe: BTreeSet<&InstrumentId> = input.instruments.iter().collect();
        let required = self.window_minutes();

        // Too few samples for any instrument aborts the whole cycle.
        if let Some((instrument, series)) = universe
            .iter()
            .filter_map(|id| input.series.get(*id).map(|s| (*id, s)))
            .find(|(_, s)| s.len() < required)
        {
            return Err(EngineError::InsufficientData(format!(
                "{instrument} has {} samples, the window needs {required}",
                series.len()
            )));
        }

        let mut assessed = BTreeMap::new();
        let mut rejections = Vec::new();

        for instrument in &universe {
            let Some(series) = input.series.get(*instrument) else {
                rejections.push(Rejection::new(
                    (*instrument).clone(),
                    RejectReason::MissingSeries,
                ));
                continue;
            };
            match self.assess(series) {
                Ok(assessment) => {
                    assessed.insert((*instrument).clone(), assessment);
                }
                Err(err) => {
                    tracing::debug!(instrument = %instrument, error = %err, "instrument excluded");
                    rejections.push(Rejection::new((*instrument).clone(), err));
                }
            }
        }

        let screening = ConvergenceFilter::new(self.config.mean_slope_threshold).apply(&assessed);
        rejections.extend(screening.rejections);
        rejections.sort_by(|a, b| a.instrument.cmp(&b.instrument));

        let raw = raw_scores(&screening.candidates, self.window_minutes() as f64);
        let weights = normalize(&raw)?;

        tracing::info!(
            as_of = %input.as_of,
            evaluated = universe.len(),
            candidates = screening.candidates.len(),
            rejected = rejections.len(),
            "cycle complete"
        );

        Ok(CycleReport {
            as_of: input.as_of,
            interval_count: self.intervals.len(),
            evaluated: universe.len(),
            candidates: screening.candidates,
            raw_scores: raw,
            weights,
            rejections,
        })
    }
}

/// Validate `config` and evaluate one cycle.
pub fn evaluate_cycle(config: &EngineConfig, input: &CycleInput) -> Result<CycleReport, EngineError> {
    Engine::new(config.clone())?.evaluate(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MINUTES_PER_DAY;

    fn as_of() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    /// Triangle wave (period 10) around a rising trend with a shrinking
    /// amplitude. Interval maxima sit on the line 7000 + 0.5x, minima on
    /// 3000 + 1.5x, so the envelopes meet at x = 4000.
    fn wedge(len: usize) -> PriceSeries {
        let prices = (0..len)
            .map(|t| {
                let phase = (t % 10) as f64;
                let osc = 2.0 * (phase - 5.0).abs() / 5.0 - 1.0;
                let amplitude = 2000.0 - 0.5 * t as f64;
                5000.0 + t as f64 + amplitude * osc
            })
            .collect();
        PriceSeries::new(prices)
    }

    fn linear(base: f64, slope: f64, len: usize) -> PriceSeries {
        PriceSeries::new((0..len).map(|t| base + slope * t as f64).collect())
    }

    #[test]
    fn invalid_config_rejected_at_setup() {
        let config = EngineConfig {
            window_days: 2,
            sampling_interval_days: 2,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::new(config),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn linear_series_is_excluded_as_parallel() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut series = BTreeMap::new();
        series.insert(InstrumentId::from("LIN"), linear(100.0, 1.0, 3900));
        let report = engine.evaluate(&CycleInput::from_series(as_of(), series)).unwrap();

        assert_eq!(report.interval_count, 8);
        assert!(report.weights.is_empty());
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections[0].reason, RejectReason::ParallelTrendLines);
    }

    #[test]
    fn wedge_is_weighted() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut series = BTreeMap::new();
        series.insert(InstrumentId::from("WEDGE"), wedge(3900));
        let report = engine.evaluate(&CycleInput::from_series(as_of(), series)).unwrap();

        assert_eq!(report.candidates.len(), 1, "rejections: {:?}", report.rejections);
        let candidate = report.candidates[&InstrumentId::from("WEDGE")];
        assert!((candidate.convergence_index - 4000.0).abs() < 1e-6);
        assert!((report.weights.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_series_is_rejected_not_fatal() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut series = BTreeMap::new();
        series.insert(InstrumentId::from("WEDGE"), wedge(3900));
        let mut input = CycleInput::from_series(as_of(), series);
        input.instruments.push(InstrumentId::from("GONE"));

        let report = engine.evaluate(&input).unwrap();
        assert_eq!(report.evaluated, 2);
        assert!(report
            .rejections
            .iter()
            .any(|r| r.instrument.as_str() == "GONE" && r.reason == RejectReason::MissingSeries));
    }

    #[test]
    fn gap_excludes_only_that_instrument() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut gappy = wedge(3900).prices().to_vec();
        gappy[MINUTES_PER_DAY * 4 + 7] = f64::NAN;

        let mut series = BTreeMap::new();
        series.insert(InstrumentId::from("GAP"), PriceSeries::new(gappy));
        series.insert(InstrumentId::from("WEDGE"), wedge(3900));
        let report = engine.evaluate(&CycleInput::from_series(as_of(), series)).unwrap();

        assert_eq!(report.weights.len(), 1);
        assert!(matches!(
            report.rejections[0].reason,
            RejectReason::PriceGap { .. }
        ));
    }

    #[test]
    fn one_short_series_aborts_the_cycle() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut series = BTreeMap::new();
        series.insert(InstrumentId::from("FULL"), wedge(3900));
        series.insert(InstrumentId::from("SHORT"), wedge(1000));
        assert!(matches!(
            engine.evaluate(&CycleInput::from_series(as_of(), series)),
            Err(EngineError::InsufficientData(_))
        ));
    }

    #[test]
    fn short_series_outside_universe_is_ignored() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut series = BTreeMap::new();
        series.insert(InstrumentId::from("FULL"), wedge(3900));
        series.insert(InstrumentId::from("SHORT"), wedge(1000));
        let input = CycleInput {
            as_of: as_of(),
            instruments: vec![InstrumentId::from("FULL")],
            series,
        };
        let report = engine.evaluate(&input).unwrap();
        assert_eq!(report.weights.len(), 1);
    }

    #[test]
    fn all_short_series_abort_the_cycle() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let mut series = BTreeMap::new();
        series.insert(InstrumentId::from("A"), linear(100.0, 1.0, 100));
        series.insert(InstrumentId::from("B"), linear(100.0, 1.0, 200));
        assert!(matches!(
            engine.evaluate(&CycleInput::from_series(as_of(), series)),
            Err(EngineError::InsufficientData(_))
        ));
    }

    #[test]
    fn longer_series_uses_most_recent_window() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let full = wedge(3900);
        let mut padded = vec![1.0; 500];
        padded.extend_from_slice(full.prices());

        let mut a = BTreeMap::new();
        a.insert(InstrumentId::from("X"), full);
        let mut b = BTreeMap::new();
        b.insert(InstrumentId::from("X"), PriceSeries::new(padded));

        let ra = engine.evaluate(&CycleInput::from_series(as_of(), a)).unwrap();
        let rb = engine.evaluate(&CycleInput::from_series(as_of(), b)).unwrap();
        assert_eq!(ra.weights, rb.weights);
    }

    #[test]
    fn empty_universe_gives_empty_weights() {
        let report = evaluate_cycle(&EngineConfig::default(), &CycleInput::default()).unwrap();
        assert!(report.weights.is_empty());
        assert_eq!(report.evaluated, 0);
    }
}
