//! Minute tape loading and universe resolution for the runner.
//!
//! Resolution order:
//! 1. `--data <csv>` given → read the CSV tape
//! 2. cache directory with the requested symbols → load from the Parquet cache
//! 3. synthetic options given → generate a synthetic tape (tagged)
//! 4. Otherwise → fail with a clear error

use std::path::PathBuf;
use thiserror::Error;

use trendfit_core::data::cache::ParquetCache;
use trendfit_core::data::provider::{DataError, UniverseSource};
use trendfit_core::data::synthetic::{synthetic_tape, SyntheticSpec};
use trendfit_core::data::tape::MinuteTape;
use trendfit_core::data::tape_csv;
use trendfit_core::data::universe::Universe;
use trendfit_core::domain::DatasetHash;

use crate::config::UniverseConfig;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no price data source: pass a CSV tape, a cache directory with symbols, or --synthetic")]
    NoSource,

    #[error("synthetic data needs at least one symbol")]
    NoSymbols,

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub csv: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub symbols: Vec<String>,
    pub synthetic: Option<SyntheticSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapeSource {
    Csv,
    Cache,
    Synthetic,
}

#[derive(Debug)]
pub struct LoadedTape {
    pub tape: MinuteTape,
    pub dataset_hash: DatasetHash,
    pub source: TapeSource,
}

impl LoadedTape {
    pub fn is_synthetic(&self) -> bool {
        self.source == TapeSource::Synthetic
    }
}

pub fn load_tape(opts: &LoadOptions) -> Result<LoadedTape, LoadError> {
    let (tape, source) = if let Some(path) = &opts.csv {
        (tape_csv::load_tape(path)?, TapeSource::Csv)
    } else if let (Some(dir), false) = (&opts.cache_dir, opts.symbols.is_empty()) {
        let cache = ParquetCache::new(dir);
        let symbols: Vec<&str> = opts.symbols.iter().map(String::as_str).collect();
        (cache.load_tape(&symbols)?, TapeSource::Cache)
    } else if let Some(spec) = &opts.synthetic {
        if opts.symbols.is_empty() {
            return Err(LoadError::NoSymbols);
        }
        tracing::warn!("generating synthetic minute prices, results are tagged as synthetic");
        let symbols: Vec<&str> = opts.symbols.iter().map(String::as_str).collect();
        (synthetic_tape(&symbols, spec)?, TapeSource::Synthetic)
    } else {
        return Err(LoadError::NoSource);
    };

    for (instrument, missing) in tape.missing_samples() {
        tracing::warn!(%instrument, missing, "tape has missing minute samples");
    }

    let dataset_hash = tape.dataset_hash();
    tracing::info!(
        source = ?source,
        instruments = tape.instrument_count(),
        days = tape.days().len(),
        dataset = dataset_hash.short(),
        "minute tape loaded"
    );
    Ok(LoadedTape {
        tape,
        dataset_hash,
        source,
    })
}

/// Static universe from the config, or `None` to use the tape's own listing.
pub fn resolve_universe(config: &UniverseConfig) -> Result<Option<Universe>, LoadError> {
    if let Some(path) = &config.file {
        return Ok(Some(Universe::from_file(path)?));
    }
    if config.symbols.is_empty() {
        return Ok(None);
    }
    Ok(Some(Universe::from_symbols("config", &config.symbols)))
}

/// Borrow the resolved universe, falling back to the tape.
pub fn universe_source<'a>(
    universe: &'a Option<Universe>,
    tape: &'a MinuteTape,
) -> &'a dyn UniverseSource {
    match universe {
        Some(u) => u,
        None => tape,
    }
}
