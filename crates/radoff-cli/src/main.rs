//! radoff: solve the historical temperature-offset series against MODTRAN.
//!
//! Reads the NOAA monthly CO2 and CH4 records, merges them on the shared
//! month key, then finds for every observation the temperature offset that
//! restores the modelled upward IR flux to its pre-industrial baseline,
//! splitting the history across a fixed pool of solver workers.

mod config;
mod ingest;
mod output;
mod plot;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use radoff_core::cancel::CancelToken;
use radoff_core::dataset::Dataset;
use radoff_core::evaluator::ModtranEvaluator;
use radoff_core::scheduler::{compute_baseline, PartitionedScheduler};
use radoff_core::solver::OffsetSolver;

use crate::config::RunConfig;
use crate::ingest::MergedRow;

/// Solve the historical CO2/CH4 temperature-offset series against MODTRAN.
#[derive(Parser, Debug)]
#[command(name = "radoff")]
#[command(about = "Parallel temperature-offset solver for the CO2/CH4 observation history")]
struct Args {
    /// CO2 monthly-global CSV (NOAA format)
    #[arg(long, default_value = "co2_mm_gl.csv")]
    co2: PathBuf,

    /// CH4 monthly-global CSV (NOAA format)
    #[arg(long, default_value = "ch4_mm_gl.csv")]
    ch4: PathBuf,

    /// TOML run configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of solver workers (overrides the configuration)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Output file for the offset column (overrides the configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory to write time-series plots into (overrides the configuration)
    #[arg(long)]
    plots: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = RunConfig::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(plots) = args.plots {
        config.plots = Some(plots);
    }

    let co2 = ingest::read_series(&args.co2)?;
    let ch4 = ingest::read_series(&args.ch4)?;
    let merged = ingest::merge_series(&co2, &ch4);
    let mut dataset = ingest::to_dataset(&merged);
    info!(
        "merged {} monthly observations ({} CO2 rows, {} CH4 rows)",
        dataset.len(),
        co2.len(),
        ch4.len()
    );

    let evaluator = ModtranEvaluator::new(&config.base_url);
    let levels = config.pre_industrial;
    let baseline = compute_baseline(&evaluator, levels.co2, levels.ch4)
        .context("computing the pre-industrial baseline flux")?;
    info!(
        "pre-industrial baseline flux at {} ppm CO2, {} ppm CH4: {baseline} W/m^2",
        levels.co2, levels.ch4
    );

    let solver = OffsetSolver::from_parameters(config.solver.clone());
    let scheduler = PartitionedScheduler::new(config.workers);
    let cancel = CancelToken::new();
    let report = scheduler.run(&mut dataset, &evaluator, &solver, baseline, &cancel)?;

    output::write_offsets(&config.output, &dataset)?;
    info!("offsets written to {}", config.output.display());

    if let Some(dir) = &config.plots {
        render_plots(dir, &merged, &dataset)?;
    }

    if !report.is_complete() {
        for failure in &report.failures {
            warn!("row {}: {}", failure.index, failure.error);
        }
        bail!(
            "{} of {} rows failed; {} holds partial results",
            report.failures.len(),
            dataset.len(),
            config.output.display()
        );
    }
    info!("solved all {} rows", report.solved);
    Ok(())
}

/// Render the raw gas levels and both derived columns against the time axis.
fn render_plots(dir: &Path, merged: &[MergedRow], dataset: &Dataset) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let co2_series = [
        (
            "average",
            merged.iter().map(|r| (r.decimal, r.co2_average)).collect(),
        ),
        (
            "trend",
            merged.iter().map(|r| (r.decimal, r.co2_trend)).collect(),
        ),
    ];
    let ch4_series = [
        (
            "average",
            merged.iter().map(|r| (r.decimal, r.ch4_average)).collect(),
        ),
        (
            "trend",
            merged.iter().map(|r| (r.decimal, r.ch4_trend)).collect(),
        ),
    ];
    let flux_series = [(
        "flux",
        dataset
            .iter()
            .filter_map(|row| row.flux.map(|flux| (row.time, flux)))
            .collect(),
    )];
    let offset_series = [(
        "offset",
        dataset
            .iter()
            .filter_map(|row| row.offset.map(|offset| (row.time, offset)))
            .collect(),
    )];

    let charts = [
        ("co2.png", "CO2", "CO2 Level (ppm)", &co2_series[..]),
        ("ch4.png", "CH4", "CH4 Level (ppm)", &ch4_series[..]),
        ("flux.png", "Upward IR flux", "IR W/m^2", &flux_series[..]),
        (
            "toff.png",
            "Temperature offset",
            "Temperature Offset (\u{00b0}C)",
            &offset_series[..],
        ),
    ];
    for (file, title, y_label, series) in charts {
        let path = dir.join(file);
        plot::plot_series(&path, title, y_label, series)
            .map_err(|err| anyhow!("plotting {}: {err}", path.display()))?;
        info!("wrote {}", path.display());
    }
    Ok(())
}
