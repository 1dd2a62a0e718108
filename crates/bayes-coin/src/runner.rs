use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bayes_coin_core::{
    GridError, HypothesisGrid, ObservationError, ObservationSequence, PosteriorSummary,
    PosteriorTrace, PosteriorUpdater, Prior, PriorError, Toss, UpdateError,
};
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::config::{InferenceConfig, InputConfig, ResolvedOutputs};
use crate::report::{ReportError, RunReport};

const DEFAULT_SIMULATION_SEED: u64 = 20_251_017;

/// Where a run's observations came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationSource {
    Inline,
    File(PathBuf),
    Simulated { bias: f64, seed: u64 },
    DefaultSample,
}

impl ObservationSource {
    pub fn describe(&self) -> String {
        match self {
            ObservationSource::Inline => "inline input".to_string(),
            ObservationSource::File(path) => format!("file {}", path.display()),
            ObservationSource::Simulated { bias, seed } => {
                format!("simulated coin (bias {bias}, seed {seed})")
            }
            ObservationSource::DefaultSample => "bundled sample".to_string(),
        }
    }
}

/// Resolves the configured input into a validated sequence.
pub fn load_observations(
    input: &InputConfig,
) -> Result<(ObservationSequence, ObservationSource), RunnerError> {
    if let Some(text) = input.observations.as_deref() {
        return Ok((ObservationSequence::parse(text)?, ObservationSource::Inline));
    }

    if let Some(path) = input.file.as_ref() {
        let text = fs::read_to_string(path).map_err(|source| RunnerError::Input {
            path: path.clone(),
            source,
        })?;
        return Ok((
            ObservationSequence::parse(&text)?,
            ObservationSource::File(path.clone()),
        ));
    }

    if let Some(bias) = input.simulate_bias {
        let seed = input.seed.unwrap_or(DEFAULT_SIMULATION_SEED);
        let mut rng = StdRng::seed_from_u64(seed);
        let observations = ObservationSequence::simulate(bias, &mut rng)?;
        return Ok((observations, ObservationSource::Simulated { bias, seed }));
    }

    Ok((
        ObservationSequence::default_sample(),
        ObservationSource::DefaultSample,
    ))
}

/// Primary entry point for one inference run.
pub struct InferenceRunner {
    config: InferenceConfig,
    outputs: ResolvedOutputs,
    grid: HypothesisGrid,
    prior: Prior,
    updater: PosteriorUpdater,
}

/// Summary details returned after a run.
#[derive(Debug)]
pub struct RunSummary {
    pub observations: usize,
    pub heads: u32,
    pub tails: u32,
    pub map_estimate: f64,
    pub posterior: PosteriorSummary,
    pub rows_written: usize,
    pub elapsed_ms: f64,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub plot_paths: Vec<PathBuf>,
}

/// One line of the trace JSONL: the state after a single toss.
#[derive(Debug, Serialize)]
struct TraceRow<'a> {
    run_id: &'a str,
    step: usize,
    toss: Toss,
    value: u8,
    heads: u32,
    tails: u32,
    map: f64,
    mean: f64,
    probabilities: &'a [f64],
}

impl InferenceRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: InferenceConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let grid = config.grid.build()?;
        let prior = config.prior.build(&grid)?;
        let updater = PosteriorUpdater::new(config.grid.likelihood);
        Ok(Self {
            config,
            outputs,
            grid,
            prior,
            updater,
        })
    }

    pub fn grid(&self) -> &HypothesisGrid {
        &self.grid
    }

    pub fn prior(&self) -> &Prior {
        &self.prior
    }

    /// Compute the trace without writing any artifact.
    pub fn compute(
        &self,
        observations: &ObservationSequence,
    ) -> Result<PosteriorTrace, RunnerError> {
        Ok(self
            .updater
            .compute_trace(observations, &self.grid, &self.prior)?)
    }

    pub fn run(&self, observations: &ObservationSequence) -> Result<RunSummary, RunnerError> {
        let run_id = self.config.run_id.as_str();
        let started = Instant::now();
        let trace = self.compute(observations)?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let map_estimate = trace.map_estimate(&self.grid)?;

        event!(
            target: "bayes_coin::run",
            Level::INFO,
            run_id,
            grid_points = self.grid.len(),
            likelihood = self.updater.mode().as_str(),
            prior = %self.config.prior.label(),
            heads = observations.heads(),
            tails = observations.tails(),
            map_estimate,
            elapsed_ms,
            "posterior trace computed"
        );

        let rows_written = self.write_trace(&trace)?;

        let report = RunReport::from_trace(
            run_id,
            &trace,
            &self.grid,
            self.config.prior.label(),
            self.config.prior.shapes(),
            self.updater.mode().as_str(),
        )?;
        report.write_markdown(&self.outputs.summary_md)?;

        let mut plot_paths = Vec::new();
        for attempt in [
            report.render_final_plot(&self.outputs.plots_dir, &trace, &self.grid),
            report.render_evolution_plot(&self.outputs.plots_dir, &trace, &self.grid),
        ] {
            match attempt {
                Ok(path) => plot_paths.push(path),
                Err(err) => {
                    event!(
                        target: "bayes_coin::run",
                        Level::WARN,
                        run_id,
                        error = %err,
                        "plot rendering skipped"
                    );
                }
            }
        }

        Ok(RunSummary {
            observations: trace.len(),
            heads: report.heads,
            tails: report.tails,
            map_estimate,
            posterior: report.posterior,
            rows_written,
            elapsed_ms,
            jsonl_path: self.outputs.trace_jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            plot_paths,
        })
    }

    fn write_trace(&self, trace: &PosteriorTrace) -> Result<usize, RunnerError> {
        let path = &self.outputs.trace_jsonl;
        ensure_parent(path)?;
        let file = File::create(path).map_err(|source| RunnerError::Io {
            context: "creating trace jsonl",
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let mut rows = 0;
        for step in trace {
            let posterior = step.posterior();
            let row = TraceRow {
                run_id: &self.config.run_id,
                step: step.toss_number(),
                toss: step.toss(),
                value: step.toss().value(),
                heads: step.counts().heads(),
                tails: step.counts().tails(),
                map: posterior.map_estimate(&self.grid)?,
                mean: posterior.mean(&self.grid),
                probabilities: posterior.probabilities(),
            };
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n").map_err(|source| RunnerError::Io {
                context: "writing trace row",
                source,
            })?;
            rows += 1;
        }
        writer.flush().map_err(|source| RunnerError::Io {
            context: "flushing trace jsonl",
            source,
        })?;
        Ok(rows)
    }
}

fn ensure_parent(path: &Path) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| RunnerError::Io {
            context: "creating output directory",
            source,
        })?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Prior(#[from] PriorError),
    #[error("invalid observations: {0}")]
    Observation(#[from] ObservationError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("failed to read observations from {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode trace row: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Report(#[from] ReportError),
}
