//! TrendFit CLI: evaluate, replay, synth, and cache management commands.
//!
//! Commands:
//! - `evaluate`: one weighting cycle on the most recent window of a tape
//! - `replay`: walk a whole tape with the paper broker and save artifacts
//! - `synth`: write a synthetic minute tape to CSV
//! - `cache import`: store a CSV tape in the Parquet cache
//! - `cache status`: report cached symbols and their date ranges

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use trendfit_core::data::cache::ParquetCache;
use trendfit_core::data::synthetic::{synthetic_tape, SyntheticSpec};
use trendfit_core::data::tape_csv;
use trendfit_core::CycleReport;
use trendfit_runner::artifacts::{save_artifacts, Manifest, SCHEMA_VERSION};
use trendfit_runner::{
    evaluate_latest, load_tape, resolve_universe, universe_source, CycleHistory, LoadOptions,
    Replay, TrendfitConfig,
};

#[derive(Parser)]
#[command(
    name = "trendfit",
    about = "TrendFit CLI: trend-line convergence portfolio weighting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the minute tape comes from.
#[derive(clap::Args, Debug, Clone)]
struct SourceArgs {
    /// CSV tape with `symbol,timestamp,price` rows.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Parquet cache directory (used with --symbols when --data is absent).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Symbols to load from the cache or to synthesize.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Generate a synthetic tape of this many trading days.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Seed for --synthetic.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

impl SourceArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            csv: self.data.clone(),
            cache_dir: self.cache_dir.clone(),
            symbols: self.symbols.clone(),
            synthetic: self.synthetic.map(|days| SyntheticSpec {
                days,
                seed: self.seed,
                ..SyntheticSpec::default()
            }),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one cycle on the most recent full window of a tape.
    Evaluate {
        #[command(flatten)]
        source: SourceArgs,

        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the full cycle report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Replay a tape minute by minute with the paper broker.
    Replay {
        #[command(flatten)]
        source: SourceArgs,

        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        /// Append cycle records to this JSONL file.
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Write a synthetic minute tape to CSV.
    Synth {
        /// Symbols to generate.
        #[arg(long, required = true, num_args = 1..)]
        symbols: Vec<String>,

        /// Trading days to generate.
        #[arg(long, default_value_t = 30)]
        days: usize,

        /// First trading day (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 100.0)]
        base_price: f64,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Store a CSV tape in the Parquet cache, one file per symbol.
    Import {
        /// CSV tape to import.
        #[arg(long)]
        data: PathBuf,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Show cached symbols and date ranges.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            source,
            config,
            json,
        } => run_evaluate(&source, config.as_deref(), json),
        Commands::Replay {
            source,
            config,
            output_dir,
            history,
        } => run_replay(&source, config.as_deref(), &output_dir, history),
        Commands::Synth {
            symbols,
            days,
            start,
            seed,
            base_price,
            out,
        } => run_synth(&symbols, days, start.as_deref(), seed, base_price, &out),
        Commands::Cache { action } => match action {
            CacheAction::Import { data, cache_dir } => run_cache_import(&data, &cache_dir),
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<TrendfitConfig> {
    match path {
        Some(p) => TrendfitConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(TrendfitConfig::default()),
    }
}

/// CLI symbols override the config's universe list when given.
fn load_options(source: &SourceArgs, config: &TrendfitConfig) -> LoadOptions {
    let mut opts = source.load_options();
    if opts.symbols.is_empty() {
        opts.symbols = config.universe.symbols.clone();
    }
    opts
}

fn run_evaluate(source: &SourceArgs, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let loaded = load_tape(&load_options(source, &config))?;
    let universe = resolve_universe(&config.universe)?;
    let report = evaluate_latest(&config, &loaded.tape, universe_source(&universe, &loaded.tape))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("As of:      {}", report.as_of);
    println!("Intervals:  {}", report.interval_count);
    println!("Evaluated:  {}", report.evaluated);
    println!("Candidates: {}", report.candidates.len());
    println!();

    if report.weights.is_empty() {
        println!("No instrument qualified; portfolio is empty.");
    } else {
        println!(
            "{:<10} {:>10} {:>14} {:>12} {:>12}",
            "Symbol", "Weight", "Convergence", "Slope", "Raw"
        );
        println!("{}", "-".repeat(62));
        for (instrument, weight) in report.weights.iter() {
            let Some(candidate) = report.candidates.get(instrument) else {
                continue;
            };
            let raw = report.raw_scores.get(instrument).copied().unwrap_or_default();
            println!(
                "{:<10} {:>9.4}% {:>14.1} {:>12.6} {:>12.4}",
                instrument.as_str(),
                weight * 100.0,
                candidate.convergence_index,
                candidate.mean_slope,
                raw
            );
        }
    }

    if !report.rejections.is_empty() {
        println!();
        println!("Excluded:");
        for rejection in &report.rejections {
            println!("  {:<10} {}", rejection.instrument.as_str(), rejection.reason);
        }
    }
}

fn run_replay(
    source: &SourceArgs,
    config_path: Option<&Path>,
    output_dir: &Path,
    history_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let loaded = load_tape(&load_options(source, &config))?;
    let universe = resolve_universe(&config.universe)?;
    let history = history_path.map(CycleHistory::new);

    let mut replay = Replay::new(&config)?;
    if let Some(h) = &history {
        replay = replay.with_history(h);
    }

    // The universe may borrow the tape, so replay a copy.
    let mut tape = loaded.tape.clone();
    let result = replay.run(&mut tape, universe_source(&universe, &loaded.tape))?;

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION,
        config_hash: config.config_hash()?,
        dataset_hash: loaded.dataset_hash.0.clone(),
        source: loaded.source,
        config: config.clone(),
        instruments: loaded.tape.instrument_count(),
        trading_days: loaded.tape.days().len(),
        cycles: result.records.len(),
        metrics: result.metrics.clone(),
        created_at: chrono::Local::now().naive_local(),
    };
    let run_dir = save_artifacts(&manifest, &result, output_dir)?;
    tracing::info!(dir = %run_dir.display(), "artifacts saved");

    let m = &result.metrics;
    println!("=== Replay Complete ===");
    if loaded.is_synthetic() {
        println!("Data:          SYNTHETIC");
    }
    println!("Dataset:       {}", loaded.dataset_hash.short());
    println!("Instruments:   {}", manifest.instruments);
    println!("Trading days:  {}", manifest.trading_days);
    println!("Rebalances:    {}", m.rebalances);
    println!("Failed cycles: {}", m.failed_cycles);
    println!("Liquidations:  {}", m.liquidations);
    println!("Fills:         {}", m.fills);
    println!("Total return:  {:.2}%", m.total_return * 100.0);
    println!("Max drawdown:  {:.2}%", m.max_drawdown * 100.0);
    println!();
    println!("Artifacts:     {}", run_dir.display());

    Ok(())
}

fn run_synth(
    symbols: &[String],
    days: usize,
    start: Option<&str>,
    seed: u64,
    base_price: f64,
    out: &Path,
) -> Result<()> {
    if days == 0 {
        bail!("--days must be at least 1");
    }
    if !(base_price.is_finite() && base_price > 0.0) {
        bail!("--base-price must be positive, got {base_price}");
    }
    let mut spec = SyntheticSpec {
        days,
        seed,
        base_price,
        ..SyntheticSpec::default()
    };
    if let Some(s) = start {
        spec.start = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid start date: {s}"))?;
    }

    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
    let tape = synthetic_tape(&refs, &spec)?;
    tape_csv::save_tape(&tape, out)?;

    println!(
        "Wrote {} symbols x {} days to {}",
        tape.instrument_count(),
        tape.days().len(),
        out.display()
    );
    println!("Dataset: {}", tape.dataset_hash().short());
    Ok(())
}

fn run_cache_import(data: &Path, cache_dir: &Path) -> Result<()> {
    let tape = tape_csv::load_tape(data)
        .with_context(|| format!("failed to read tape {}", data.display()))?;
    let cache = ParquetCache::new(cache_dir);
    let written = cache.write_tape(&tape)?;
    println!("Cached {written} symbols in {}", cache_dir.display());
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ParquetCache::new(cache_dir);
    let symbols = cache.symbols()?;
    if symbols.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", symbols.len());
    println!();
    println!("{:<10} {:<25} {:>10}", "Symbol", "Date Range", "Samples");
    println!("{}", "-".repeat(47));
    for status in cache.status(&refs) {
        let range = match (status.start_date, status.end_date) {
            (Some(s), Some(e)) => format!("{s} to {e}"),
            _ => "(no meta)".to_string(),
        };
        let samples = status
            .sample_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<10} {:<25} {:>10}", status.symbol, range, samples);
    }

    Ok(())
}
