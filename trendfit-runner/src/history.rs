//! Cycle history: JSONL append-only log of replay events.
//!
//! One JSON object per line: completed rebalances, failed cycles and
//! drawdown liquidations. The format is resilient to partial writes and easy
//! to stream.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use trendfit_core::convergence::Rejection;
use trendfit_core::domain::{InstrumentId, WeightVector};
use trendfit_core::execution::RebalanceSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CycleEvent {
    Rebalance {
        evaluated: usize,
        weights: WeightVector,
        rejections: Vec<Rejection>,
        summary: RebalanceSummary,
    },
    /// No rebalancing this cycle; prior positions held.
    CycleFailed { error: String },
    Liquidation { instruments: Vec<InstrumentId> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub as_of: NaiveDateTime,
    #[serde(flatten)]
    pub event: CycleEvent,
}

impl CycleRecord {
    pub fn is_rebalance(&self) -> bool {
        matches!(self.event, CycleEvent::Rebalance { .. })
    }
}

pub struct CycleHistory {
    path: PathBuf,
}

impl CycleHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &CycleRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        file.flush()
    }

    pub fn file_size_bytes(&self) -> io::Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Read every record; malformed lines are skipped.
    pub fn read_all(&self) -> io::Result<Vec<CycleRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CycleRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "skipping malformed history line"),
            }
        }
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trendfit_core::convergence::RejectReason;

    fn at(minute: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn rebalance() -> CycleRecord {
        CycleRecord {
            as_of: at(0),
            event: CycleEvent::Rebalance {
                evaluated: 2,
                weights: [(InstrumentId::from("AAA"), 1.0)].into_iter().collect(),
                rejections: vec![Rejection::new(
                    InstrumentId::from("BBB"),
                    RejectReason::ParallelTrendLines,
                )],
                summary: RebalanceSummary::default(),
            },
        }
    }

    #[test]
    fn append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let history = CycleHistory::new(dir.path().join("nested").join("cycles.jsonl"));

        history.append(&rebalance()).unwrap();
        history
            .append(&CycleRecord {
                as_of: at(30),
                event: CycleEvent::Liquidation {
                    instruments: vec![InstrumentId::from("AAA")],
                },
            })
            .unwrap();

        let records = history.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], rebalance());
        assert!(!records[1].is_rebalance());
        assert!(history.file_size_bytes().unwrap() > 0);
    }

    #[test]
    fn event_tag_is_flattened() {
        let json = serde_json::to_value(CycleRecord {
            as_of: at(0),
            event: CycleEvent::CycleFailed {
                error: "degenerate".into(),
            },
        })
        .unwrap();
        assert_eq!(json["event"], "cycle_failed");
        assert_eq!(json["error"], "degenerate");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cycles.jsonl");
        let good = serde_json::to_string(&rebalance()).unwrap();
        fs::write(&path, format!("{good}\nnot json\n\n")).unwrap();

        let records = CycleHistory::new(path).read_all().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let history = CycleHistory::new(dir.path().join("none.jsonl"));
        assert!(history.read_all().unwrap().is_empty());
        assert_eq!(history.file_size_bytes().unwrap(), 0);
    }
}
