//! Order-execution collaborator interface.
//!
//! The engine hands a `WeightVector` across this seam. Reconciling it against
//! holdings, sizing orders and skipping instruments that already have an open
//! order is the implementor's job.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{InstrumentId, WeightVector};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no price available for {instrument}")]
    NoPrice { instrument: InstrumentId },

    #[error("invalid target allocation: {0}")]
    InvalidTarget(String),
}

/// What a rebalance actually did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceSummary {
    /// Orders submitted.
    pub submitted: usize,
    /// Instruments left untouched because an order was already open.
    pub skipped_open_orders: Vec<InstrumentId>,
    /// Instruments left untouched because no price was available.
    pub skipped_no_price: Vec<InstrumentId>,
    /// Held instruments absent from the target and sold out.
    pub closed: usize,
}

pub trait OrderExecution {
    fn has_open_order(&self, instrument: &InstrumentId) -> bool;

    /// Move holdings toward `target` (fractions of current equity).
    fn rebalance(&mut self, target: &WeightVector) -> Result<RebalanceSummary, ExecutionError>;

    /// Close the whole position in `instrument`.
    fn liquidate(&mut self, instrument: &InstrumentId) -> Result<(), ExecutionError>;
}
