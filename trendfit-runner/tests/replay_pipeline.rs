//! Replay pipeline: tape → scheduler → broker → history → artifacts.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use trendfit_core::data::provider::{DataError, UniverseSource};
use trendfit_core::data::synthetic::{trading_days, SyntheticSpec};
use trendfit_core::data::tape::MinuteTape;
use trendfit_core::domain::{InstrumentId, MINUTES_PER_DAY};
use trendfit_runner::artifacts::{import_manifest, save_artifacts, Manifest, SCHEMA_VERSION};
use trendfit_runner::{
    load_tape, CycleEvent, CycleHistory, LoadOptions, Replay, ReplayError, TrendfitConfig,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn converging(len: usize) -> Vec<f64> {
    let shrink = 300.0 / (2.0 * len as f64);
    (0..len)
        .map(|t| {
            let phase = (t % 10) as f64;
            let osc = 2.0 * (phase - 5.0).abs() / 5.0 - 1.0;
            2000.0 + t as f64 + (300.0 - shrink * t as f64) * osc
        })
        .collect()
}

fn tape_with(prices: BTreeMap<InstrumentId, Vec<f64>>, days: usize) -> MinuteTape {
    let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    MinuteTape::new(trading_days(start, days), prices).unwrap()
}

struct BrokenUniverse;

impl UniverseSource for BrokenUniverse {
    fn name(&self) -> &str {
        "broken"
    }

    fn instruments(&self, _date: NaiveDate) -> Result<Vec<InstrumentId>, DataError> {
        Err(DataError::Universe("screener offline".into()))
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn synthetic_replay_writes_history_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrendfitConfig::default();
    let mut loaded = load_tape(&LoadOptions {
        symbols: vec!["AAA".into(), "BBB".into(), "CCC".into()],
        synthetic: Some(SyntheticSpec {
            days: 13,
            ..SyntheticSpec::default()
        }),
        ..LoadOptions::default()
    })
    .unwrap();

    let history = CycleHistory::new(dir.path().join("cycles.jsonl"));
    let universe = loaded.tape.clone();
    let result = Replay::new(&config)
        .unwrap()
        .with_history(&history)
        .run(&mut loaded.tape, &universe)
        .unwrap();

    assert_eq!(result.metrics.rebalances + result.metrics.failed_cycles, 3);
    assert_eq!(result.equity.len(), 13);
    assert_eq!(history.read_all().unwrap(), result.records);

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION,
        config_hash: config.config_hash().unwrap(),
        dataset_hash: loaded.dataset_hash.to_string(),
        source: loaded.source,
        config: config.clone(),
        instruments: loaded.tape.instrument_count(),
        trading_days: loaded.tape.days().len(),
        cycles: result.records.len(),
        metrics: result.metrics.clone(),
        created_at: NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    };
    let run_dir = save_artifacts(&manifest, &result, dir.path()).unwrap();
    let back = import_manifest(&std::fs::read_to_string(run_dir.join("manifest.json")).unwrap())
        .unwrap();
    assert_eq!(back.config_hash, manifest.config_hash);
    assert_eq!(back.metrics, result.metrics);
}

#[test]
fn failed_cycles_hold_positions() {
    let mut prices = BTreeMap::new();
    prices.insert(InstrumentId::from("CONV"), converging(11 * MINUTES_PER_DAY));
    let mut tape = tape_with(prices, 11);

    let config = TrendfitConfig::default();
    let result = Replay::new(&config).unwrap().run(&mut tape, &BrokenUniverse).unwrap();

    assert_eq!(result.metrics.rebalances, 0);
    assert_eq!(result.metrics.failed_cycles, 1);
    assert!(result.fills.is_empty());
    assert!(matches!(
        &result.records[0].event,
        CycleEvent::CycleFailed { error } if error.contains("screener offline")
    ));
    assert!(result.equity.iter().all(|p| p.equity == 100_000.0));
}

#[test]
fn intraday_crash_triggers_liquidation() {
    let len = 12 * MINUTES_PER_DAY;
    let mut conv = converging(len);
    // day 10 rebalances at minute 30; crash lands on the minute-60 check
    let crash = 10 * MINUTES_PER_DAY + 60;
    conv[crash] = conv[crash - 1] * 0.3;

    let mut prices = BTreeMap::new();
    prices.insert(InstrumentId::from("CONV"), conv);
    let mut tape = tape_with(prices, 12);
    let universe = tape.clone();

    let config = TrendfitConfig::default();
    let result = Replay::new(&config).unwrap().run(&mut tape, &universe).unwrap();

    let liquidation = result
        .records
        .iter()
        .find(|r| matches!(r.event, CycleEvent::Liquidation { .. }))
        .expect("no liquidation recorded");
    assert_eq!(liquidation.as_of.format("%H:%M").to_string(), "10:30");
    assert!(result.metrics.liquidations >= 1);
}

#[test]
fn invalid_config_fails_before_replay() {
    let config = TrendfitConfig::from_toml("[drawdown]\ncheck_every_minutes = 0\n");
    assert!(config.is_err());

    let mut config = TrendfitConfig::default();
    config.engine.sampling_interval_days = 10;
    assert!(matches!(Replay::new(&config), Err(ReplayError::Config(_))));
}
