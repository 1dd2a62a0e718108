use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use bayes_coin::config::{InferenceConfig, ResolvedOutputs};
use bayes_coin::logging::init_logging;
use bayes_coin::runner::{InferenceRunner, load_observations};

/// Sequential Bayesian estimation of a coin's bias from 100 tosses.
#[derive(Debug, Parser)]
#[command(
    name = "bayes-coin",
    author,
    version,
    about = "Grid posterior over a coin's bias, updated toss by toss"
)]
struct Cli {
    /// Path to a YAML configuration file (built-in defaults are used when omitted).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// 100 comma-separated outcomes (0 = tail, 1 = head).
    #[arg(short, long, value_name = "TOSSES", conflicts_with_all = ["input_file", "simulate"])]
    input: Option<String>,

    /// Read the comma-separated outcomes from a file.
    #[arg(long, value_name = "FILE", conflicts_with = "simulate")]
    input_file: Option<PathBuf>,

    /// Simulate 100 tosses of a coin with this bias instead of reading input.
    #[arg(long, value_name = "BIAS")]
    simulate: Option<f64>,

    /// RNG seed used with --simulate.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the number of grid points.
    #[arg(long, value_name = "POINTS")]
    grid_points: Option<usize>,

    /// Exit after validating the configuration and input (no trace is computed).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match cli.config.as_ref() {
        Some(path) => InferenceConfig::from_path(path)?,
        None => InferenceConfig::default(),
    };

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(points) = cli.grid_points {
        config.grid.points = points;
    }

    if let Some(seed) = cli.seed {
        config.input.seed = Some(seed);
    }

    if let Some(text) = cli.input {
        config.input.set_inline(text);
    } else if let Some(path) = cli.input_file {
        config.input.set_file(path);
    } else if let Some(bias) = cli.simulate {
        config.input.set_simulated(bias);
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let (observations, source) =
        load_observations(&config.input).context("loading observations")?;

    println!(
        "Loaded {} tosses from {} for '{run_id}' ({} heads, {} tails; {} grid points, prior {})",
        observations.len(),
        source.describe(),
        observations.heads(),
        observations.tails(),
        config.grid.points,
        config.prior.label()
    );

    let logging = config.logging.clone();
    let runner = InferenceRunner::new(config, outputs.clone())?;

    if cli.validate_only {
        println!("Validation-only mode: posterior computation skipped.");
        return Ok(());
    }

    let logging_guard = init_logging(&logging, &outputs, &run_id)?;

    let summary = runner.run(&observations)?;
    println!(
        "MAP estimate for '{run_id}': {:.4} (mean {:.4}, 95% interval [{:.4}, {:.4}])",
        summary.map_estimate,
        summary.posterior.mean,
        summary.posterior.credible_interval.0,
        summary.posterior.credible_interval.1
    );
    println!(
        "Trace: {} rows at {} ({:.2} ms)",
        summary.rows_written,
        summary.jsonl_path.display(),
        summary.elapsed_ms
    );
    println!("Summary: {}", summary.summary_path.display());
    for plot in &summary.plot_paths {
        println!("Plot: {}", plot.display());
    }
    if let Some(guard) = logging_guard.as_ref() {
        println!("Telemetry log: {}", guard.telemetry_path.display());
    }

    Ok(())
}
