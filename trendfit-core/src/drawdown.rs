//! Drawdown guard.
//!
//! Between rebalances, a held instrument is liquidated when its short-term
//! price drop exceeds `multiplier` times a price-based volatility proxy. The
//! comparison is strict: a drop of exactly `multiplier * volatility` stays.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::provider::{DataError, PriceHistory};
use crate::domain::{InstrumentId, WeightVector};
use crate::execution::OrderExecution;

/// Samples in the short-term drop window (two periods ago vs now).
pub const SHORT_WINDOW: usize = 2;

/// Everything the guard needs to judge one held instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownProbe {
    pub price_two_periods_ago: f64,
    pub price_now: f64,
    /// Dispersion of recent prices, in price units.
    pub volatility: f64,
    pub has_open_order: bool,
    pub can_trade: bool,
}

impl DrawdownProbe {
    pub fn drop(&self) -> f64 {
        self.price_two_periods_ago - self.price_now
    }
}

/// Weights after the guard ran, plus what it flagged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownVerdict {
    pub weights: WeightVector,
    pub liquidations: Vec<InstrumentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownGuard {
    /// Drop threshold in multiples of the volatility proxy.
    pub multiplier: f64,
    /// Recent prices used for the volatility proxy.
    pub lookback: usize,
}

impl Default for DrawdownGuard {
    fn default() -> Self {
        Self {
            multiplier: 2.0,
            lookback: 30,
        }
    }
}

impl DrawdownGuard {
    pub fn should_liquidate(&self, probe: &DrawdownProbe) -> bool {
        probe.can_trade && !probe.has_open_order && probe.drop() > self.multiplier * probe.volatility
    }

    /// Remove flagged instruments from `weights`.
    ///
    /// Instruments without a probe are kept as they are.
    pub fn check(
        &self,
        weights: &WeightVector,
        probes: &BTreeMap<InstrumentId, DrawdownProbe>,
    ) -> DrawdownVerdict {
        let mut verdict = DrawdownVerdict {
            weights: weights.clone(),
            liquidations: Vec::new(),
        };
        for instrument in weights.instruments() {
            let Some(probe) = probes.get(instrument) else {
                continue;
            };
            if self.should_liquidate(probe) {
                tracing::info!(
                    %instrument,
                    drop = probe.drop(),
                    volatility = probe.volatility,
                    "drawdown guard flagged instrument"
                );
                verdict.liquidations.push(instrument.clone());
            }
        }
        for instrument in &verdict.liquidations {
            verdict.weights.remove(instrument);
        }
        verdict
    }

    /// Assemble a probe for `instrument` from the price and execution collaborators.
    pub fn probe(
        &self,
        instrument: &InstrumentId,
        history: &dyn PriceHistory,
        execution: &dyn OrderExecution,
    ) -> Result<DrawdownProbe, DataError> {
        let short = history.recent(instrument, SHORT_WINDOW)?;
        if short.len() < SHORT_WINDOW {
            return Err(DataError::InsufficientHistory {
                instrument: instrument.clone(),
                required: SHORT_WINDOW,
                available: short.len(),
            });
        }
        let recent = history.recent(instrument, self.lookback.max(SHORT_WINDOW))?;
        let volatility =
            price_volatility(&recent).ok_or_else(|| DataError::InsufficientHistory {
                instrument: instrument.clone(),
                required: self.lookback.max(SHORT_WINDOW),
                available: recent.iter().filter(|p| p.is_finite()).count(),
            })?;

        Ok(DrawdownProbe {
            price_two_periods_ago: short[0],
            price_now: short[short.len() - 1],
            volatility,
            has_open_order: execution.has_open_order(instrument),
            can_trade: history.can_trade(instrument),
        })
    }

    /// Probe every instrument in `weights` and apply the guard.
    ///
    /// Instruments whose probe fails (not enough history, unknown) are kept.
    pub fn run(
        &self,
        weights: &WeightVector,
        history: &dyn PriceHistory,
        execution: &dyn OrderExecution,
    ) -> DrawdownVerdict {
        let mut probes = BTreeMap::new();
        for instrument in weights.instruments() {
            match self.probe(instrument, history, execution) {
                Ok(probe) => {
                    probes.insert(instrument.clone(), probe);
                }
                Err(e) => tracing::debug!(%instrument, error = %e, "drawdown probe skipped"),
            }
        }
        self.check(weights, &probes)
    }
}

/// Sample standard deviation of the finite prices. `None` with fewer than two.
pub fn price_volatility(prices: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(before: f64, now: f64, volatility: f64) -> DrawdownProbe {
        DrawdownProbe {
            price_two_periods_ago: before,
            price_now: now,
            volatility,
            has_open_order: false,
            can_trade: true,
        }
    }

    fn held(ids: &[&str]) -> WeightVector {
        let w = 1.0 / ids.len() as f64;
        ids.iter().map(|s| (InstrumentId::from(*s), w)).collect()
    }

    #[test]
    fn drop_exactly_at_threshold_is_kept() {
        let guard = DrawdownGuard::default();
        assert!(!guard.should_liquidate(&probe(10.0, 7.0, 1.5)));
    }

    #[test]
    fn drop_just_past_threshold_is_flagged() {
        let guard = DrawdownGuard::default();
        assert!(guard.should_liquidate(&probe(10.0, 6.999, 1.5)));
    }

    #[test]
    fn open_order_blocks_liquidation() {
        let guard = DrawdownGuard::default();
        let mut p = probe(10.0, 5.0, 0.5);
        p.has_open_order = true;
        assert!(!guard.should_liquidate(&p));
    }

    #[test]
    fn untradable_instrument_is_not_flagged() {
        let guard = DrawdownGuard::default();
        let mut p = probe(10.0, 5.0, 0.5);
        p.can_trade = false;
        assert!(!guard.should_liquidate(&p));
    }

    #[test]
    fn rising_price_never_flagged() {
        let guard = DrawdownGuard::default();
        assert!(!guard.should_liquidate(&probe(10.0, 12.0, 0.0)));
    }

    #[test]
    fn check_removes_flagged_and_keeps_unprobed() {
        let guard = DrawdownGuard::default();
        let weights = held(&["AAA", "BBB", "CCC"]);
        let mut probes = BTreeMap::new();
        probes.insert(InstrumentId::from("AAA"), probe(10.0, 6.0, 1.0));
        probes.insert(InstrumentId::from("BBB"), probe(10.0, 9.5, 1.0));

        let verdict = guard.check(&weights, &probes);
        assert_eq!(verdict.liquidations, vec![InstrumentId::from("AAA")]);
        assert_eq!(verdict.weights.len(), 2);
        assert!(verdict.weights.contains(&InstrumentId::from("BBB")));
        assert!(verdict.weights.contains(&InstrumentId::from("CCC")));
        assert!(verdict.weights.total() <= 1.0);
    }

    #[test]
    fn volatility_is_sample_standard_deviation() {
        // mean 5, squared deviations sum to 32 over 8 samples: sqrt(32/7)
        let prices = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let vol = price_volatility(&prices).unwrap();
        assert!((vol - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn volatility_needs_two_finite_prices() {
        assert_eq!(price_volatility(&[1.0]), None);
        assert_eq!(price_volatility(&[1.0, f64::NAN]), None);
        assert_eq!(price_volatility(&[3.0, 3.0]), Some(0.0));
    }
}
