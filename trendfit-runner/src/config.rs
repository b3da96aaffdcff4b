//! Serializable replay configuration, loaded from TOML.
//!
//! ```toml
//! [engine]
//! window_days = 10
//! sampling_interval_days = 2
//! mean_slope_threshold = 0.5
//!
//! [drawdown]
//! multiplier = 2.0
//! lookback = 30
//! check_every_minutes = 30
//!
//! [schedule]
//! rebalance_minute = 30
//!
//! [broker]
//! initial_capital = 100000.0
//!
//! [universe]
//! symbols = ["AAPL", "MSFT"]
//! ```
//!
//! Every section is optional and falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use trendfit_core::domain::MINUTES_PER_DAY;
use trendfit_core::{DrawdownGuard, EngineConfig, EngineError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

/// Drawdown guard settings plus how often the guard runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownConfig {
    pub multiplier: f64,
    pub lookback: usize,
    pub check_every_minutes: u32,
}

impl Default for DrawdownConfig {
    fn default() -> Self {
        let guard = DrawdownGuard::default();
        Self {
            multiplier: guard.multiplier,
            lookback: guard.lookback,
            check_every_minutes: 30,
        }
    }
}

impl DrawdownConfig {
    pub fn guard(&self) -> DrawdownGuard {
        DrawdownGuard {
            multiplier: self.multiplier,
            lookback: self.lookback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Session minute (0 = 09:30) at which the daily rebalance fires.
    pub rebalance_minute: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rebalance_minute: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub initial_capital: f64,
    /// Orders smaller than this notional are not sent.
    pub min_order_value: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            min_order_value: 1.0,
        }
    }
}

/// Where the tradable universe comes from. Empty means "every instrument on the tape".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    pub symbols: Vec<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendfitConfig {
    pub engine: EngineConfig,
    pub drawdown: DrawdownConfig,
    pub schedule: ScheduleConfig,
    pub broker: BrokerConfig,
    pub universe: UniverseConfig,
}

impl TrendfitConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.schedule.rebalance_minute as usize >= MINUTES_PER_DAY {
            return Err(ConfigError::Invalid(format!(
                "schedule.rebalance_minute must be below {MINUTES_PER_DAY}, got {}",
                self.schedule.rebalance_minute
            )));
        }
        if self.drawdown.check_every_minutes == 0 {
            return Err(ConfigError::Invalid(
                "drawdown.check_every_minutes must be at least 1".into(),
            ));
        }
        if !(self.drawdown.multiplier.is_finite() && self.drawdown.multiplier >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "drawdown.multiplier must be finite and non-negative, got {}",
                self.drawdown.multiplier
            )));
        }
        if self.drawdown.lookback < 2 {
            return Err(ConfigError::Invalid(
                "drawdown.lookback needs at least 2 samples".into(),
            ));
        }
        if !(self.broker.initial_capital.is_finite() && self.broker.initial_capital > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "broker.initial_capital must be positive, got {}",
                self.broker.initial_capital
            )));
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    ///
    /// Two runs with identical configs share a hash.
    pub fn config_hash(&self) -> Result<String, ConfigError> {
        let json =
            serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
