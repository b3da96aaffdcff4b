//! TrendFit Runner: host glue around the engine.
//!
//! This crate builds on `trendfit-core` to provide:
//! - TOML configuration with a content hash
//! - Tape loading with CSV/cache/synthetic fallback
//! - A paper broker implementing the order-execution seam
//! - The replay scheduler (daily rebalance, intra-day drawdown checks)
//! - JSONL cycle history, replay metrics and artifact export

pub mod artifacts;
pub mod broker;
pub mod config;
pub mod data_loader;
pub mod history;
pub mod metrics;
pub mod replay;

pub use broker::{Fill, PaperBroker};
pub use config::{ConfigError, TrendfitConfig};
pub use data_loader::{load_tape, resolve_universe, universe_source, LoadError, LoadOptions, LoadedTape};
pub use history::{CycleEvent, CycleHistory, CycleRecord};
pub use metrics::ReplayMetrics;
pub use replay::{evaluate_latest, Replay, ReplayError, ReplayResult};
