//! TrendFit Core: trend-convergence portfolio weighting.
//!
//! Each rebalance cycle turns a window of minute prices into a weight vector:
//! - Interval partitioning of the rolling window
//! - Per-interval local statistics (max, min, mean)
//! - Least-squares trend lines through the maxima, minima and means
//! - Convergence filter on the max/min intersection and the mean slope
//! - Weight synthesis from convergence and return coefficients
//!
//! Between cycles the drawdown guard drops held instruments whose short-term
//! drop exceeds a volatility multiple. Prices, universe and order state come
//! from collaborator traits in [`data::provider`] and [`execution`].

pub mod config;
pub mod convergence;
pub mod cycle;
pub mod data;
pub mod domain;
pub mod drawdown;
pub mod error;
pub mod execution;
pub mod fit;
pub mod partition;
pub mod stats;
pub mod weights;

pub use config::EngineConfig;
pub use cycle::{evaluate_cycle, CycleInput, CycleReport, Engine};
pub use drawdown::{DrawdownGuard, DrawdownVerdict};
pub use error::{EngineError, InstrumentError};
