//! Replay scheduler: walks a minute tape and drives the engine the way a
//! live host would.
//!
//! Per minute, in order:
//! 1. the broker fills orders submitted on the previous minute
//! 2. at `rebalance_minute`, once a full window is visible, one cycle runs
//!    and its weights go to the broker
//! 3. every `check_every_minutes`, the drawdown guard runs over the weights
//!    of the last successful cycle
//!
//! A failed cycle is logged, recorded and skipped: holdings stay as they
//! were. The previous weights are threaded through the loop explicitly.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trendfit_core::data::provider::{DataError, PriceHistory, UniverseSource};
use trendfit_core::data::tape::MinuteTape;
use trendfit_core::domain::{WeightVector, MINUTES_PER_DAY};
use trendfit_core::execution::OrderExecution;
use trendfit_core::{CycleInput, CycleReport, DrawdownGuard, Engine, EngineError};

use crate::broker::{Fill, PaperBroker};
use crate::config::{ConfigError, TrendfitConfig};
use crate::history::{CycleEvent, CycleHistory, CycleRecord};
use crate::metrics::ReplayMetrics;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("tape has {available} day(s), a {required}-day window needs at least {required}")]
    TapeTooShort { required: usize, available: usize },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("history write failed: {0}")]
    History(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    pub records: Vec<CycleRecord>,
    /// End-of-day equity.
    pub equity: Vec<EquityPoint>,
    pub fills: Vec<Fill>,
    pub metrics: ReplayMetrics,
}

impl ReplayResult {
    /// Weights of every completed rebalance, in time order.
    pub fn weight_history(&self) -> impl Iterator<Item = (NaiveDateTime, &WeightVector)> {
        self.records.iter().filter_map(|r| match &r.event {
            CycleEvent::Rebalance { weights, .. } => Some((r.as_of, weights)),
            _ => None,
        })
    }
}

pub struct Replay<'a> {
    config: &'a TrendfitConfig,
    engine: Engine,
    guard: DrawdownGuard,
    history: Option<&'a CycleHistory>,
}

impl<'a> Replay<'a> {
    pub fn new(config: &'a TrendfitConfig) -> Result<Self, ReplayError> {
        config.validate()?;
        Ok(Self {
            config,
            engine: Engine::new(config.engine.clone())?,
            guard: config.drawdown.guard(),
            history: None,
        })
    }

    /// Also append every record to a JSONL history.
    pub fn with_history(mut self, history: &'a CycleHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// One evaluation cycle at the tape's current cursor.
    pub fn evaluate_at(
        &self,
        tape: &MinuteTape,
        universe: &dyn UniverseSource,
        as_of: NaiveDateTime,
    ) -> Result<CycleReport, CycleFailure> {
        let instruments = universe.instruments(as_of.date())?;
        let series = tape.window(&instruments, self.engine.window_minutes())?;
        let report = self.engine.evaluate(&CycleInput {
            as_of,
            instruments,
            series,
        })?;
        Ok(report)
    }

    /// Walk the whole tape. The tape cursor is left at the end.
    pub fn run(
        &self,
        tape: &mut MinuteTape,
        universe: &dyn UniverseSource,
    ) -> Result<ReplayResult, ReplayError> {
        let window_days = self.config.engine.window_days;
        if tape.days().len() < window_days {
            return Err(ReplayError::TapeTooShort {
                required: window_days,
                available: tape.days().len(),
            });
        }

        let rebalance_minute = self.config.schedule.rebalance_minute as usize;
        let check_every = self.config.drawdown.check_every_minutes as usize;
        let window_minutes = self.engine.window_minutes();

        let mut broker = PaperBroker::new(
            self.config.broker.initial_capital,
            self.config.broker.min_order_value,
        );
        let mut held: Option<WeightVector> = None;
        let mut records = Vec::new();
        let mut equity = Vec::new();
        let mut metrics = ReplayMetrics::default();

        for position in 0..tape.len() {
            tape.set_cursor(position + 1);
            broker.step(tape);

            let minute = position % MINUTES_PER_DAY;
            let Some(as_of) = tape.timestamp_at(position) else {
                continue;
            };

            if minute == rebalance_minute && position + 1 >= window_minutes {
                let record = match self.evaluate_at(tape, universe, as_of) {
                    Ok(report) => match broker.rebalance(&report.weights) {
                        Ok(summary) => {
                            metrics.rebalances += 1;
                            held = Some(report.weights.clone());
                            CycleEvent::Rebalance {
                                evaluated: report.evaluated,
                                weights: report.weights,
                                rejections: report.rejections,
                                summary,
                            }
                        }
                        Err(e) => {
                            tracing::warn!(%as_of, error = %e, "rebalance rejected by broker");
                            metrics.failed_cycles += 1;
                            CycleEvent::CycleFailed {
                                error: e.to_string(),
                            }
                        }
                    },
                    Err(failure) => {
                        tracing::warn!(%as_of, error = %failure, "cycle failed, holding positions");
                        metrics.failed_cycles += 1;
                        CycleEvent::CycleFailed {
                            error: failure.to_string(),
                        }
                    }
                };
                self.record(&mut records, as_of, record)?;
            } else if minute % check_every == 0 {
                if let Some(weights) = held.take() {
                    let verdict = self.guard.run(&weights, &*tape, &broker);
                    for instrument in &verdict.liquidations {
                        if let Err(e) = broker.liquidate(instrument) {
                            tracing::warn!(%instrument, error = %e, "liquidation failed");
                        }
                    }
                    if !verdict.liquidations.is_empty() {
                        metrics.liquidations += verdict.liquidations.len();
                        let event = CycleEvent::Liquidation {
                            instruments: verdict.liquidations,
                        };
                        self.record(&mut records, as_of, event)?;
                    }
                    held = Some(verdict.weights);
                }
            }

            if minute == MINUTES_PER_DAY - 1 {
                equity.push(EquityPoint {
                    timestamp: as_of,
                    equity: broker.equity(),
                });
            }
        }

        let curve: Vec<f64> = equity.iter().map(|p| p.equity).collect();
        let curve_metrics = ReplayMetrics::from_equity(&curve);
        metrics.total_return = curve_metrics.total_return;
        metrics.max_drawdown = curve_metrics.max_drawdown;
        metrics.fills = broker.fills().len();
        tracing::info!(
            rebalances = metrics.rebalances,
            failed = metrics.failed_cycles,
            liquidations = metrics.liquidations,
            total_return = metrics.total_return,
            "replay finished"
        );

        Ok(ReplayResult {
            records,
            equity,
            fills: broker.fills().to_vec(),
            metrics,
        })
    }

    fn record(
        &self,
        records: &mut Vec<CycleRecord>,
        as_of: NaiveDateTime,
        event: CycleEvent,
    ) -> Result<(), ReplayError> {
        let record = CycleRecord { as_of, event };
        if let Some(history) = self.history {
            history.append(&record)?;
        }
        records.push(record);
        Ok(())
    }
}

/// Why a single cycle produced no weights.
#[derive(Debug, Error)]
pub enum CycleFailure {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Evaluate one cycle on the most recent full window of a tape.
pub fn evaluate_latest(
    config: &TrendfitConfig,
    tape: &MinuteTape,
    universe: &dyn UniverseSource,
) -> Result<CycleReport, ReplayError> {
    let replay = Replay::new(config)?;
    let window_days = config.engine.window_days;
    if tape.days().len() < window_days {
        return Err(ReplayError::TapeTooShort {
            required: window_days,
            available: tape.days().len(),
        });
    }
    let as_of = tape
        .cursor()
        .checked_sub(1)
        .and_then(|p| tape.timestamp_at(p))
        .unwrap_or_default();
    replay
        .evaluate_at(tape, universe, as_of)
        .map_err(|failure| match failure {
            CycleFailure::Engine(e) => ReplayError::Engine(e),
            CycleFailure::Data(e) => ReplayError::Data(e),
        })
}
