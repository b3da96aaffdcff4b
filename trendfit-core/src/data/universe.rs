//! Static universe: sector-organized ticker lists in a TOML file.
//!
//! ```toml
//! name = "megacaps"
//!
//! [sectors]
//! Technology = ["AAPL", "MSFT"]
//! ETFs = ["SPY", "QQQ"]
//! ```
//!
//! The same list is returned for every date. Listing order is sectors in
//! name order, tickers in file order, first occurrence wins.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::provider::{DataError, UniverseSource};
use crate::domain::InstrumentId;

fn default_name() -> String {
    "static".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Universe {
    #[serde(default = "default_name")]
    pub name: String,
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// A single-sector universe over `symbols`.
    pub fn from_symbols<S: AsRef<str>>(name: &str, symbols: &[S]) -> Self {
        let mut sectors = BTreeMap::new();
        sectors.insert(
            "All".to_string(),
            symbols.iter().map(|s| s.as_ref().to_string()).collect(),
        );
        Self {
            name: name.to_string(),
            sectors,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Universe(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::Universe(format!("parse universe TOML: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, DataError> {
        toml::to_string_pretty(self).map_err(|e| DataError::Universe(format!("serialize: {e}")))
    }

    /// Deduplicated tickers across all sectors.
    pub fn all_tickers(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.sectors
            .values()
            .flat_map(|tickers| tickers.iter().map(|t| t.trim()))
            .filter(|t| !t.is_empty() && seen.insert(*t))
            .collect()
    }

    pub fn sector_tickers(&self, sector: &str) -> Option<&[String]> {
        self.sectors.get(sector).map(|v| v.as_slice())
    }

    pub fn sector_names(&self) -> Vec<&str> {
        self.sectors.keys().map(|s| s.as_str()).collect()
    }

    pub fn ticker_count(&self) -> usize {
        self.all_tickers().len()
    }
}

impl UniverseSource for Universe {
    fn name(&self) -> &str {
        &self.name
    }

    fn instruments(&self, _date: NaiveDate) -> Result<Vec<InstrumentId>, DataError> {
        Ok(self.all_tickers().into_iter().map(InstrumentId::from).collect())
    }
}
