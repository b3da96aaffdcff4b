//! Replay artifacts: manifest JSON plus weight and equity CSVs.
//!
//! All persisted manifests carry a `schema_version`. Unknown versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::TrendfitConfig;
use crate::data_loader::TapeSource;
use crate::metrics::ReplayMetrics;
use crate::replay::{EquityPoint, ReplayResult};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub config_hash: String,
    pub dataset_hash: String,
    pub source: TapeSource,
    pub config: TrendfitConfig,
    pub instruments: usize,
    pub trading_days: usize,
    pub cycles: usize,
    pub metrics: ReplayMetrics,
    pub created_at: chrono::NaiveDateTime,
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_manifest(manifest: &Manifest) -> Result<String> {
    serde_json::to_string_pretty(manifest).context("failed to serialize manifest")
}

pub fn import_manifest(json: &str) -> Result<Manifest> {
    let manifest: Manifest =
        serde_json::from_str(json).context("failed to deserialize manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// One row per (rebalance, instrument): `as_of, symbol, weight`.
pub fn export_weights_csv(result: &ReplayResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["as_of", "symbol", "weight"])?;
    for (as_of, weights) in result.weight_history() {
        for (instrument, weight) in weights.iter() {
            wtr.write_record([
                &as_of.to_string(),
                instrument.as_str(),
                &format!("{weight:.8}"),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(equity: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity"])?;
    for point in equity {
        wtr.write_record([&point.timestamp.to_string(), &format!("{:.2}", point.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one replay.
///
/// Creates `replay_{dataset}_{timestamp}/` under `output_dir` holding
/// `manifest.json`, `weights.csv` and `equity.csv`. Returns the directory.
pub fn save_artifacts(
    manifest: &Manifest,
    result: &ReplayResult,
    output_dir: &Path,
) -> Result<PathBuf> {
    let short_hash: String = manifest.dataset_hash.chars().take(12).collect();
    let dirname = format!(
        "replay_{short_hash}_{}",
        manifest.created_at.format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_manifest(manifest)?)?;
    std::fs::write(run_dir.join("weights.csv"), export_weights_csv(result)?)?;
    std::fs::write(run_dir.join("equity.csv"), export_equity_csv(&result.equity)?)?;

    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{CycleEvent, CycleRecord};
    use trendfit_core::domain::InstrumentId;
    use trendfit_core::execution::RebalanceSummary;

    fn ts(h: u32) -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn result() -> ReplayResult {
        ReplayResult {
            records: vec![
                CycleRecord {
                    as_of: ts(10),
                    event: CycleEvent::Rebalance {
                        evaluated: 2,
                        weights: [(InstrumentId::from("AAA"), 0.4), (InstrumentId::from("BBB"), 0.6)]
                            .into_iter()
                            .collect(),
                        rejections: Vec::new(),
                        summary: RebalanceSummary::default(),
                    },
                },
                CycleRecord {
                    as_of: ts(11),
                    event: CycleEvent::CycleFailed {
                        error: "x".into(),
                    },
                },
            ],
            equity: vec![EquityPoint {
                timestamp: ts(15),
                equity: 100_000.0,
            }],
            fills: Vec::new(),
            metrics: ReplayMetrics::default(),
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            schema_version: SCHEMA_VERSION,
            config_hash: "c".repeat(64),
            dataset_hash: "d".repeat(64),
            source: TapeSource::Synthetic,
            config: TrendfitConfig::default(),
            instruments: 2,
            trading_days: 12,
            cycles: 2,
            metrics: ReplayMetrics::default(),
            created_at: ts(16),
        }
    }

    #[test]
    fn weights_csv_has_one_row_per_weight() {
        let csv = export_weights_csv(&result()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "as_of,symbol,weight");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2024-01-02 10:00:00,AAA,0.4"));
    }

    #[test]
    fn future_schema_is_rejected() {
        let mut m = manifest();
        m.schema_version = SCHEMA_VERSION + 1;
        let json = export_manifest(&m).unwrap();
        assert!(import_manifest(&json).is_err());
        assert!(import_manifest(&export_manifest(&manifest()).unwrap()).is_ok());
    }

    #[test]
    fn save_writes_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_artifacts(&manifest(), &result(), dir.path()).unwrap();
        assert!(run_dir.ends_with("replay_dddddddddddd_20240102_160000"));
        for file in ["manifest.json", "weights.csv", "equity.csv"] {
            assert!(run_dir.join(file).exists(), "{file} missing");
        }
    }
}
