//! Parquet cache of minute prices with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{year}.parquet`
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per symbol (hash, date range, sample count)

use super::provider::DataError;
use super::tape::MinuteTape;
use crate::domain::{InstrumentId, MinuteBar};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata sidecar for a cached symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub sample_count: usize,
    pub data_hash: String,
    pub cached_at: chrono::NaiveDateTime,
}

pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Symbols with a cache directory, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, DataError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            if let Some(sym) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("symbol="))
            {
                symbols.push(sym.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Write minute bars for a symbol, one Parquet file per year.
    ///
    /// Replaces whatever was cached for the years touched.
    pub fn write(&self, symbol: &str, bars: &[MinuteBar]) -> Result<(), DataError> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(DataError::CacheError("no bars to cache".into()));
        };

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut by_year: HashMap<i32, Vec<&MinuteBar>> = HashMap::new();
        for bar in bars {
            by_year.entry(bar.date.year()).or_default().push(bar);
        }

        for (year, year_bars) in &by_year {
            let df = bars_to_dataframe(year_bars)?;
            let path = self.year_path(symbol, *year);
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&df, &tmp_path)?;

            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::CacheError(format!("atomic rename failed: {e}"))
            })?;
        }

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            start_date: first.date,
            end_date: last.date,
            sample_count: bars.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(bars)
                    .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;

        tracing::debug!(symbol, samples = bars.len(), "cached minute bars");
        Ok(())
    }

    /// Cache every instrument of a tape.
    pub fn write_tape(&self, tape: &MinuteTape) -> Result<usize, DataError> {
        let mut written = 0;
        for instrument in tape.symbols() {
            let bars = tape.bars_for(instrument);
            if bars.is_empty() {
                continue;
            }
            self.write(instrument.as_str(), &bars)?;
            written += 1;
        }
        Ok(written)
    }

    /// Load all cached bars for a symbol, sorted by date and minute.
    pub fn load(&self, symbol: &str) -> Result<Vec<MinuteBar>, DataError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        let mut all_bars = Vec::new();
        let entries =
            fs::read_dir(&sym_dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();

            // meta.json, .quarantined, leftover .tmp
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path) {
                Ok(bars) => all_bars.extend(bars),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        if all_bars.is_empty() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        all_bars.sort_by_key(|b| (b.date, b.minute));
        Ok(all_bars)
    }

    /// Load several symbols and align them into one tape.
    pub fn load_tape(&self, symbols: &[&str]) -> Result<MinuteTape, DataError> {
        let mut bars = BTreeMap::new();
        for symbol in symbols {
            bars.insert(InstrumentId::from(*symbol), self.load(symbol)?);
        }
        MinuteTape::from_bars(bars)
    }

    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.get_meta(sym);
                CacheStatus {
                    symbol: sym.to_string(),
                    cached: meta.is_some(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    sample_count: meta.as_ref().map(|m| m.sample_count),
                }
            })
            .collect()
    }

    /// Check if cached data for a symbol covers the requested date range.
    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.get_meta(symbol) {
            None => CoverageResult::NotCached,
            Some(meta) if meta.start_date <= start && meta.end_date >= end => {
                CoverageResult::FullyCovered
            }
            Some(meta) => CoverageResult::PartiallyCovered {
                cached_start: meta.start_date,
                cached_end: meta.end_date,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sample_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const COLUMNS: [&str; 3] = ["date", "minute", "price"];

/// chrono's default date is the Unix epoch.
fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn bars_to_dataframe(bars: &[&MinuteBar]) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch()).num_days() as i32)
        .collect();
    let minutes: Vec<u32> = bars.iter().map(|b| b.minute).collect();
    let prices: Vec<f64> = bars.iter().map(|b| b.price).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("minute".into(), minutes),
        Column::new("price".into(), prices),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<MinuteBar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }
    for col_name in &COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::ValidationError(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<MinuteBar>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));

    let date_ca = df
        .column("date")
        .map_err(map_err)?
        .date()
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?;
    let minute_ca = df
        .column("minute")
        .map_err(map_err)?
        .u32()
        .map_err(|e| DataError::ParquetError(format!("minute column type: {e}")))?;
    let price_ca = df
        .column("price")
        .map_err(map_err)?
        .f64()
        .map_err(|e| DataError::ParquetError(format!("price column type: {e}")))?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        let minute = minute_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null minute at row {i}")))?;
        bars.push(MinuteBar {
            date: epoch() + chrono::Duration::days(date_days as i64),
            minute,
            price: price_ca.get(i).unwrap_or(f64::NAN),
        });
    }

    if let Some(bad) = bars.iter().find(|b| !b.is_sane()) {
        return Err(DataError::ValidationError(format!(
            "insane sample on {} minute {}: {}",
            bad.date, bad.minute, bad.price
        )));
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bars() -> Vec<MinuteBar> {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        vec![
            MinuteBar { date: d, minute: 0, price: 100.0 },
            MinuteBar { date: d, minute: 1, price: 100.25 },
            MinuteBar { date: d, minute: 2, price: 99.75 },
        ]
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());

        cache.write("SPY", &sample_bars()).unwrap();
        let loaded = cache.load("SPY").unwrap();

        assert_eq!(loaded, sample_bars());
    }

    #[test]
    fn load_nonexistent_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        assert!(matches!(
            cache.load("NONEXISTENT"),
            Err(DataError::NoCachedData { .. })
        ));
    }

    #[test]
    fn cache_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());

        cache.write("SPY", &sample_bars()).unwrap();
        let meta = cache.get_meta("SPY").unwrap();

        assert_eq!(meta.symbol, "SPY");
        assert_eq!(meta.sample_count, 3);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn cache_status_and_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());

        cache.write("SPY", &sample_bars()).unwrap();
        let statuses = cache.status(&["SPY", "QQQ"]);

        assert!(statuses[0].cached);
        assert!(!statuses[1].cached);
        assert_eq!(cache.symbols().unwrap(), vec!["SPY".to_string()]);
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache.write("SPY", &sample_bars()).unwrap();

        let bad = dir.path().join("symbol=SPY").join("2023.parquet");
        fs::write(&bad, b"not parquet").unwrap();

        let loaded = cache.load("SPY").unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(!bad.exists());
        assert!(bad.with_extension("parquet.quarantined").exists());
    }

    #[test]
    fn coverage_check() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache.write("SPY", &sample_bars()).unwrap();

        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(cache.covers_range("SPY", d, d), CoverageResult::FullyCovered);
        assert!(matches!(
            cache.covers_range("SPY", d, d.succ_opt().unwrap()),
            CoverageResult::PartiallyCovered { .. }
        ));
        assert_eq!(cache.covers_range("QQQ", d, d), CoverageResult::NotCached);
    }

    #[test]
    fn tape_roundtrip_through_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let mut bars = BTreeMap::new();
        bars.insert(InstrumentId::from("SPY"), sample_bars());
        let tape = MinuteTape::from_bars(bars).unwrap();

        assert_eq!(cache.write_tape(&tape).unwrap(), 1);
        let back = cache.load_tape(&["SPY"]).unwrap();
        assert_eq!(back.dataset_hash(), tape.dataset_hash());
    }
}
