//! Paper broker: in-process `OrderExecution` over a minute tape.
//!
//! Orders submitted while the tape cursor is at minute `t` fill at the price
//! of minute `t + 1`, so an order stays open for exactly one step and the
//! drawdown guard can observe it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use trendfit_core::data::tape::MinuteTape;
use trendfit_core::domain::{InstrumentId, WeightVector};
use trendfit_core::execution::{ExecutionError, OrderExecution, RebalanceSummary};

/// Weights may overshoot one by this much through rounding.
const WEIGHT_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Signed share quantity: positive buys, negative sells.
    pub shares: f64,
    /// Tape position at which the order was submitted.
    pub submitted_at: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub position: usize,
    pub instrument: InstrumentId,
    pub shares: f64,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct PaperBroker {
    cash: f64,
    min_order_value: f64,
    holdings: BTreeMap<InstrumentId, f64>,
    pending: BTreeMap<InstrumentId, PendingOrder>,
    last_prices: BTreeMap<InstrumentId, f64>,
    /// Tape position of the most recent `step`.
    position: usize,
    fills: Vec<Fill>,
}

impl PaperBroker {
    pub fn new(initial_capital: f64, min_order_value: f64) -> Self {
        Self {
            cash: initial_capital,
            min_order_value,
            holdings: BTreeMap::new(),
            pending: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            position: 0,
            fills: Vec::new(),
        }
    }

    /// Advance to the tape's current minute: fill orders submitted earlier
    /// at this minute's price and refresh marks.
    ///
    /// Orders whose instrument has no price this minute stay open.
    pub fn step(&mut self, tape: &MinuteTape) {
        let Some(position) = tape.cursor().checked_sub(1) else {
            return;
        };
        self.position = position;

        for instrument in tape.symbols() {
            if let Some(price) = tape.price_at(instrument, position) {
                self.last_prices.insert(instrument.clone(), price);
            }
        }

        let due: Vec<InstrumentId> = self
            .pending
            .iter()
            .filter(|(_, order)| order.submitted_at < position)
            .map(|(id, _)| id.clone())
            .collect();
        for instrument in due {
            let Some(price) = tape.price_at(&instrument, position) else {
                continue;
            };
            let Some(order) = self.pending.remove(&instrument) else {
                continue;
            };
            self.cash -= order.shares * price;
            let held = self.holdings.entry(instrument.clone()).or_insert(0.0);
            *held += order.shares;
            if held.abs() < 1e-12 {
                self.holdings.remove(&instrument);
            }
            self.fills.push(Fill {
                position,
                instrument,
                shares: order.shares,
                price,
            });
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn holdings(&self) -> &BTreeMap<InstrumentId, f64> {
        &self.holdings
    }

    pub fn shares(&self, instrument: &InstrumentId) -> f64 {
        self.holdings.get(instrument).copied().unwrap_or(0.0)
    }

    pub fn pending(&self) -> &BTreeMap<InstrumentId, PendingOrder> {
        &self.pending
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Cash plus holdings marked at their last known price.
    pub fn equity(&self) -> f64 {
        self.cash
            + self
                .holdings
                .iter()
                .map(|(id, shares)| shares * self.last_prices.get(id).copied().unwrap_or(0.0))
                .sum::<f64>()
    }

    fn submit(&mut self, instrument: &InstrumentId, shares: f64) {
        tracing::debug!(%instrument, shares, position = self.position, "order submitted");
        self.pending.insert(
            instrument.clone(),
            PendingOrder {
                shares,
                submitted_at: self.position,
            },
        );
    }
}

impl OrderExecution for PaperBroker {
    fn has_open_order(&self, instrument: &InstrumentId) -> bool {
        self.pending.contains_key(instrument)
    }

    fn rebalance(&mut self, target: &WeightVector) -> Result<RebalanceSummary, ExecutionError> {
        if let Some((id, w)) = target.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(ExecutionError::InvalidTarget(format!("{id} has weight {w}")));
        }
        if target.total() > 1.0 + WEIGHT_SLACK {
            return Err(ExecutionError::InvalidTarget(format!(
                "weights sum to {}",
                target.total()
            )));
        }

        let equity = self.equity();
        let mut summary = RebalanceSummary::default();
        let mut universe: Vec<InstrumentId> = target.instruments().cloned().collect();
        universe.extend(
            self.holdings
                .keys()
                .filter(|id| !target.contains(id))
                .cloned(),
        );
        universe.sort();

        for instrument in universe {
            if self.has_open_order(&instrument) {
                summary.skipped_open_orders.push(instrument);
                continue;
            }
            let Some(price) = self.last_prices.get(&instrument).copied() else {
                summary.skipped_no_price.push(instrument);
                continue;
            };
            let weight = target.get(&instrument).unwrap_or(0.0);
            let desired = weight * equity / price;
            let delta = desired - self.shares(&instrument);
            if (delta * price).abs() < self.min_order_value {
                continue;
            }
            if weight == 0.0 {
                summary.closed += 1;
            }
            self.submit(&instrument, delta);
            summary.submitted += 1;
        }
        Ok(summary)
    }

    /// Sell the whole position. No-op when nothing is held.
    fn liquidate(&mut self, instrument: &InstrumentId) -> Result<(), ExecutionError> {
        let shares = self.shares(instrument);
        if shares == 0.0 {
            return Ok(());
        }
        if !self.last_prices.contains_key(instrument) {
            return Err(ExecutionError::NoPrice {
                instrument: instrument.clone(),
            });
        }
        self.submit(instrument, -shares);
        Ok(())
    }
}
