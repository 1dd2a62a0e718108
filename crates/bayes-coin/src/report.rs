use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use bayes_coin_core::{HypothesisGrid, PosteriorSummary, PosteriorTrace, UpdateError};
use plotters::prelude::*;
use serde::Serialize;
use statrs::distribution::{Beta, Continuous, ContinuousCDF};
use thiserror::Error;

/// Toss numbers highlighted in the summary table and the evolution chart.
const MILESTONES: [usize; 7] = [1, 5, 10, 25, 50, 75, 100];
const CREDIBLE_LEVEL: f64 = 0.95;
const BISECTION_STEPS: usize = 100;
const PLOT_SIZE: (u32, u32) = (800, 400);

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("trace is empty")]
    EmptyTrace,
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("invalid analytic posterior Beta({alpha}, {beta}): {message}")]
    Analytic {
        alpha: f64,
        beta: f64,
        message: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render plot: {0}")]
    Plot(String),
}

/// Statistics of the grid posterior at one toss.
#[derive(Debug, Clone, Serialize)]
pub struct Milestone {
    pub toss: usize,
    pub heads: u32,
    pub tails: u32,
    pub summary: PosteriorSummary,
}

/// Closed-form `Beta(alpha + heads, beta + tails)` posterior the grid approximates.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticComparison {
    pub alpha: f64,
    pub beta: f64,
    pub mode: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub credible_interval: (f64, f64),
    /// Largest absolute gap between the grid posterior and the exact density
    /// evaluated at the grid points and normalized over them.
    pub max_grid_error: f64,
}

impl AnalyticComparison {
    pub fn new(
        prior_shapes: (f64, f64),
        heads: u32,
        tails: u32,
        probabilities: &[f64],
        grid: &HypothesisGrid,
    ) -> Result<Self, ReportError> {
        let alpha = prior_shapes.0 + heads as f64;
        let beta = prior_shapes.1 + tails as f64;
        let dist = Beta::new(alpha, beta).map_err(|err| ReportError::Analytic {
            alpha,
            beta,
            message: err.to_string(),
        })?;

        let sum = alpha + beta;
        let mean = alpha / sum;
        let std_dev = (alpha * beta / (sum * sum * (sum + 1.0))).sqrt();
        // alpha, beta >= 1 with at least one observation keeps the mode defined.
        let mode = (alpha - 1.0) / (sum - 2.0);

        let tail = (1.0 - CREDIBLE_LEVEL) / 2.0;
        let credible_interval = (
            inverse_cdf(&dist, tail),
            inverse_cdf(&dist, 1.0 - tail),
        );

        let max_grid_error = discretized_error(&dist, probabilities, grid)?;

        Ok(Self {
            alpha,
            beta,
            mode,
            mean,
            std_dev,
            credible_interval,
            max_grid_error,
        })
    }
}

fn discretized_error(
    dist: &Beta,
    probabilities: &[f64],
    grid: &HypothesisGrid,
) -> Result<f64, ReportError> {
    let densities: Vec<f64> = grid.iter().map(|p| dist.pdf(*p)).collect();
    let total: f64 = densities.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(ReportError::Analytic {
            alpha: dist.shape_a(),
            beta: dist.shape_b(),
            message: format!("density sums to {total} over the grid"),
        });
    }
    Ok(densities
        .iter()
        .zip(probabilities)
        .map(|(density, prob)| (prob - density / total).abs())
        .fold(0.0, f64::max))
}

fn inverse_cdf(dist: &Beta, target: f64) -> f64 {
    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if dist.cdf(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Everything the summary document and charts need about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub grid_points: usize,
    pub likelihood: String,
    pub prior: String,
    pub heads: u32,
    pub tails: u32,
    pub posterior: PosteriorSummary,
    pub analytic: AnalyticComparison,
    pub milestones: Vec<Milestone>,
}

impl RunReport {
    pub fn from_trace(
        run_id: &str,
        trace: &PosteriorTrace,
        grid: &HypothesisGrid,
        prior_label: String,
        prior_shapes: (f64, f64),
        likelihood: &str,
    ) -> Result<Self, ReportError> {
        let last = trace.final_step().ok_or(ReportError::EmptyTrace)?;
        let counts = last.counts();
        let posterior = PosteriorSummary::from_posterior(last.posterior(), grid)?;
        let analytic = AnalyticComparison::new(
            prior_shapes,
            counts.heads(),
            counts.tails(),
            last.posterior().probabilities(),
            grid,
        )?;

        let milestones = milestone_indices(trace.len())
            .into_iter()
            .filter_map(|idx| trace.get(idx))
            .map(|step| {
                Ok(Milestone {
                    toss: step.toss_number(),
                    heads: step.counts().heads(),
                    tails: step.counts().tails(),
                    summary: PosteriorSummary::from_posterior(step.posterior(), grid)?,
                })
            })
            .collect::<Result<Vec<_>, ReportError>>()?;

        Ok(Self {
            run_id: run_id.to_string(),
            grid_points: grid.len(),
            likelihood: likelihood.to_string(),
            prior: prior_label,
            heads: counts.heads(),
            tails: counts.tails(),
            posterior,
            analytic,
            milestones,
        })
    }

    pub fn to_markdown(&self) -> String {
        let post = &self.posterior;
        let exact = &self.analytic;
        let mut out = String::new();
        out.push_str(&format!("# Posterior Summary: {}\n\n", self.run_id));
        out.push_str(&format!(
            "Grid: {} points, likelihood `{}`, prior {}\n\n",
            self.grid_points, self.likelihood, self.prior
        ));
        out.push_str(&format!(
            "Observed {} heads and {} tails. **MAP estimate: {:.4}**\n\n",
            self.heads, self.tails, post.map
        ));

        out.push_str(&format!(
            "| Statistic | Grid posterior | Exact Beta({}, {}) |\n",
            exact.alpha, exact.beta
        ));
        out.push_str("|-----------|----------------|--------------------|\n");
        out.push_str(&format!(
            "| Mode (MAP) | {:.4} | {:.4} |\n",
            post.map, exact.mode
        ));
        out.push_str(&format!("| Mean | {:.4} | {:.4} |\n", post.mean, exact.mean));
        out.push_str(&format!(
            "| Std dev | {:.4} | {:.4} |\n",
            post.std_dev, exact.std_dev
        ));
        out.push_str(&format!(
            "| 95% interval | [{:.4}, {:.4}] | [{:.4}, {:.4}] |\n\n",
            post.credible_interval.0,
            post.credible_interval.1,
            exact.credible_interval.0,
            exact.credible_interval.1
        ));
        out.push_str(&format!(
            "Posterior entropy: {:.4} nats. Max grid error vs discretized exact posterior: {:.2e}\n\n",
            post.entropy, exact.max_grid_error
        ));

        out.push_str("## Evolution\n\n");
        out.push_str("| Toss | Heads | Tails | MAP | Mean | 95% interval |\n");
        out.push_str("|------|-------|-------|-----|------|--------------|\n");
        for m in &self.milestones {
            out.push_str(&format!(
                "| {} | {} | {} | {:.4} | {:.4} | [{:.4}, {:.4}] |\n",
                m.toss,
                m.heads,
                m.tails,
                m.summary.map,
                m.summary.mean,
                m.summary.credible_interval.0,
                m.summary.credible_interval.1
            ));
        }
        out
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ReportError::Io {
                context: "creating summary directory",
                source: e,
            })?;
        }
        fs::write(path, self.to_markdown()).map_err(|e| ReportError::Io {
            context: "writing summary markdown",
            source: e,
        })
    }

    /// Final posterior with a dashed MAP marker.
    pub fn render_final_plot(
        &self,
        dir: impl AsRef<Path>,
        trace: &PosteriorTrace,
        grid: &HypothesisGrid,
    ) -> Result<PathBuf, ReportError> {
        let output_path = prepare_plot_dir(dir.as_ref())?.join("final_posterior.png");
        let posterior = trace
            .final_posterior()
            .ok_or(ReportError::EmptyTrace)?
            .probabilities();
        let curve: Vec<(f64, f64)> = grid.iter().copied().zip(posterior.iter().copied()).collect();
        let y_max = (self.posterior.peak * 1.1).max(f64::EPSILON);
        let map = self.posterior.map;

        guarded_plot(|| {
            let root = BitMapBackend::new(&output_path, PLOT_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(plot_err)?;

            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .caption("Final Posterior Distribution", ("sans-serif", 22))
                .set_label_area_size(LabelAreaPosition::Left, 60)
                .set_label_area_size(LabelAreaPosition::Bottom, 40)
                .build_cartesian_2d(0.0..1.0, 0.0..y_max)
                .map_err(plot_err)?;

            chart
                .configure_mesh()
                .x_desc("Bias (p)")
                .y_desc("Probability")
                .draw()
                .map_err(plot_err)?;

            chart
                .draw_series(std::iter::once(PathElement::new(
                    curve.clone(),
                    BLUE.stroke_width(2),
                )))
                .map_err(plot_err)?;
            chart
                .draw_series(dashed_vertical(map, y_max))
                .map_err(plot_err)?;

            drop(chart);
            root.present().map_err(plot_err)?;
            Ok(output_path.clone())
        })
    }

    /// Posterior curves at each milestone toss overlaid on one chart.
    pub fn render_evolution_plot(
        &self,
        dir: impl AsRef<Path>,
        trace: &PosteriorTrace,
        grid: &HypothesisGrid,
    ) -> Result<PathBuf, ReportError> {
        let output_path = prepare_plot_dir(dir.as_ref())?.join("posterior_evolution.png");
        let curves: Vec<Vec<(f64, f64)>> = milestone_indices(trace.len())
            .into_iter()
            .filter_map(|idx| trace.get(idx))
            .map(|step| {
                grid.iter()
                    .copied()
                    .zip(step.posterior().probabilities().iter().copied())
                    .collect()
            })
            .collect();
        let y_max = trace
            .iter()
            .map(|step| step.posterior().peak())
            .fold(f64::EPSILON, f64::max)
            * 1.1;

        guarded_plot(|| {
            let root = BitMapBackend::new(&output_path, PLOT_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(plot_err)?;

            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .caption("Posterior Evolution", ("sans-serif", 22))
                .set_label_area_size(LabelAreaPosition::Left, 60)
                .set_label_area_size(LabelAreaPosition::Bottom, 40)
                .build_cartesian_2d(0.0..1.0, 0.0..y_max)
                .map_err(plot_err)?;

            chart
                .configure_mesh()
                .x_desc("Bias (p)")
                .y_desc("Probability")
                .draw()
                .map_err(plot_err)?;

            chart
                .draw_series(curves.iter().enumerate().map(|(idx, curve)| {
                    PathElement::new(curve.clone(), Palette99::pick(idx).stroke_width(2))
                }))
                .map_err(plot_err)?;

            drop(chart);
            root.present().map_err(plot_err)?;
            Ok(output_path.clone())
        })
    }
}

fn milestone_indices(len: usize) -> Vec<usize> {
    MILESTONES
        .iter()
        .filter(|toss| **toss <= len)
        .map(|toss| toss - 1)
        .collect()
}

fn prepare_plot_dir(dir: &Path) -> Result<&Path, ReportError> {
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir).map_err(|e| ReportError::Io {
            context: "creating plots directory",
            source: e,
        })?;
    }
    Ok(dir)
}

fn dashed_vertical(x: f64, y_max: f64) -> Vec<PathElement<(f64, f64)>> {
    const DASHES: usize = 20;
    let step = y_max / (2 * DASHES) as f64;
    (0..DASHES)
        .map(|i| {
            let start = 2.0 * i as f64 * step;
            PathElement::new(vec![(x, start), (x, start + step)], RED.stroke_width(2))
        })
        .collect()
}

fn plot_err<E: std::fmt::Display>(err: E) -> ReportError {
    ReportError::Plot(err.to_string())
}

/// Runs a plotters closure, converting a panic (e.g. missing font support) into an error.
fn guarded_plot<F>(draw: F) -> Result<PathBuf, ReportError>
where
    F: FnOnce() -> Result<PathBuf, ReportError>,
{
    let prev_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let attempt = panic::catch_unwind(AssertUnwindSafe(draw));
    panic::set_hook(prev_hook);

    match attempt {
        Ok(result) => result,
        Err(_) => Err(ReportError::Plot(
            "plotters panicked while rendering (missing font support?)".into(),
        )),
    }
}
