//! Sequential grid posterior over the coin bias.
//!
//! After each toss the posterior is rebuilt from the cumulative head/tail counts and the
//! original prior: `post(p) ∝ p^heads · (1-p)^tails · prior(p)`. This equals chaining
//! one-toss updates through the previous posterior.

use crate::grid::{HypothesisGrid, Prior};
use crate::observation::{ObservationSequence, Toss};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// How the per-step likelihood is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikelihoodMode {
    /// `p^heads · (1-p)^tails` evaluated directly in linear space.
    #[default]
    Direct,
    /// Log-likelihood shifted by its maximum before exponentiating; cannot underflow.
    LogSpace,
}

impl LikelihoodMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            LikelihoodMode::Direct => "direct",
            LikelihoodMode::LogSpace => "log_space",
        }
    }
}

/// Heads and tails observed so far in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct RunningCounts {
    heads: u32,
    tails: u32,
}

impl RunningCounts {
    pub const fn new() -> Self {
        Self { heads: 0, tails: 0 }
    }

    pub fn observe(&mut self, toss: Toss) {
        match toss {
            Toss::Head => self.heads += 1,
            Toss::Tail => self.tails += 1,
        }
    }

    pub const fn heads(&self) -> u32 {
        self.heads
    }

    pub const fn tails(&self) -> u32 {
        self.tails
    }

    pub const fn total(&self) -> u32 {
        self.heads + self.tails
    }
}

/// Probability mass over the grid after some number of tosses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Posterior {
    probabilities: Vec<f64>,
}

impl Posterior {
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.probabilities.iter().sum()
    }

    /// Largest probability in the distribution, `0.0` when empty.
    pub fn peak(&self) -> f64 {
        self.probabilities.iter().copied().fold(0.0, f64::max)
    }

    pub fn map_estimate(&self, grid: &HypothesisGrid) -> Result<f64, UpdateError> {
        map_estimate(&self.probabilities, grid)
    }

    /// Posterior expectation of the bias.
    pub fn mean(&self, grid: &HypothesisGrid) -> f64 {
        grid.iter()
            .zip(&self.probabilities)
            .map(|(p, prob)| p * prob)
            .sum()
    }
}

impl AsRef<[f64]> for Posterior {
    fn as_ref(&self) -> &[f64] {
        &self.probabilities
    }
}

/// One entry of a [`PosteriorTrace`]: the toss just incorporated and the resulting state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    index: usize,
    toss: Toss,
    counts: RunningCounts,
    posterior: Posterior,
}

impl TraceStep {
    /// Zero-based position of the toss in the observation sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    /// One-based toss number, as shown to readers.
    pub fn toss_number(&self) -> usize {
        self.index + 1
    }

    pub fn toss(&self) -> Toss {
        self.toss
    }

    pub fn counts(&self) -> RunningCounts {
        self.counts
    }

    pub fn posterior(&self) -> &Posterior {
        &self.posterior
    }
}

/// Ordered posteriors, one per observation. Iterating does not consume the trace, so
/// renderers may walk it as many times as they need.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosteriorTrace {
    steps: Vec<TraceStep>,
}

impl PosteriorTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceStep> {
        self.steps.iter()
    }

    pub fn final_step(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    pub fn final_posterior(&self) -> Option<&Posterior> {
        self.steps.last().map(TraceStep::posterior)
    }

    /// MAP estimate of the last posterior in the trace.
    pub fn map_estimate(&self, grid: &HypothesisGrid) -> Result<f64, UpdateError> {
        let posterior = self
            .final_posterior()
            .ok_or(UpdateError::EmptyDistribution)?;
        posterior.map_estimate(grid)
    }
}

impl<'a> IntoIterator for &'a PosteriorTrace {
    type Item = &'a TraceStep;
    type IntoIter = std::slice::Iter<'a, TraceStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Turns an observation sequence and a prior into a [`PosteriorTrace`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PosteriorUpdater {
    mode: LikelihoodMode,
}

impl PosteriorUpdater {
    pub const fn new(mode: LikelihoodMode) -> Self {
        Self { mode }
    }

    pub const fn mode(&self) -> LikelihoodMode {
        self.mode
    }

    /// Runs the sequential update over every observation.
    ///
    /// Either the full trace is returned or an error is raised; no partial trace escapes.
    pub fn compute_trace(
        &self,
        observations: &ObservationSequence,
        grid: &HypothesisGrid,
        prior: &Prior,
    ) -> Result<PosteriorTrace, UpdateError> {
        if prior.len() != grid.len() {
            return Err(UpdateError::PriorMismatch {
                grid: grid.len(),
                prior: prior.len(),
            });
        }

        let mut counts = RunningCounts::new();
        let mut steps = Vec::with_capacity(observations.len());
        for (index, toss) in observations.iter().enumerate() {
            counts.observe(toss);
            let unnormalized = match self.mode {
                LikelihoodMode::Direct => direct_weights(grid, prior, counts),
                LikelihoodMode::LogSpace => log_space_weights(grid, prior, counts),
            };
            let probabilities = normalize(index, unnormalized)?;
            trace!(
                step = index,
                heads = counts.heads(),
                tails = counts.tails(),
                "posterior updated"
            );
            steps.push(TraceStep {
                index,
                toss,
                counts,
                posterior: Posterior { probabilities },
            });
        }

        debug!(
            steps = steps.len(),
            grid_points = grid.len(),
            mode = self.mode.as_str(),
            "posterior trace computed"
        );
        Ok(PosteriorTrace { steps })
    }
}

/// Grid value with the highest probability; ties resolve to the lowest index.
pub fn map_estimate(posterior: &[f64], grid: &HypothesisGrid) -> Result<f64, UpdateError> {
    if posterior.is_empty() {
        return Err(UpdateError::EmptyDistribution);
    }
    if posterior.len() != grid.len() {
        return Err(UpdateError::LengthMismatch {
            grid: grid.len(),
            posterior: posterior.len(),
        });
    }
    let mut best_idx = 0;
    let mut best = f64::NEG_INFINITY;
    for (idx, prob) in posterior.iter().copied().enumerate() {
        if prob > best {
            best = prob;
            best_idx = idx;
        }
    }
    Ok(grid.points()[best_idx])
}

fn direct_weights(grid: &HypothesisGrid, prior: &Prior, counts: RunningCounts) -> Vec<f64> {
    let heads = counts.heads() as i32;
    let tails = counts.tails() as i32;
    grid.iter()
        .zip(prior.weights())
        .map(|(p, weight)| p.powi(heads) * (1.0 - p).powi(tails) * weight)
        .collect()
}

fn log_space_weights(grid: &HypothesisGrid, prior: &Prior, counts: RunningCounts) -> Vec<f64> {
    let heads = counts.heads() as f64;
    let tails = counts.tails() as f64;
    // 0 · ln 0 must stay 0 so that 0^0 = 1.
    let log_weights: Vec<f64> = grid
        .iter()
        .zip(prior.weights())
        .map(|(p, weight)| {
            let head_term = if heads > 0.0 { heads * p.ln() } else { 0.0 };
            let tail_term = if tails > 0.0 { tails * (1.0 - p).ln() } else { 0.0 };
            head_term + tail_term + weight.ln()
        })
        .collect();
    let max = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![0.0; log_weights.len()];
    }
    log_weights.iter().map(|lw| (lw - max).exp()).collect()
}

fn normalize(step: usize, mut weights: Vec<f64>) -> Result<Vec<f64>, UpdateError> {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(UpdateError::DegenerateNormalization { step, total });
    }
    for weight in &mut weights {
        *weight /= total;
    }
    Ok(weights)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateError {
    PriorMismatch { grid: usize, prior: usize },
    DegenerateNormalization { step: usize, total: f64 },
    EmptyDistribution,
    LengthMismatch { grid: usize, posterior: usize },
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::PriorMismatch { grid, prior } => {
                write!(f, "prior has {prior} weights but the grid has {grid} points")
            }
            UpdateError::DegenerateNormalization { step, total } => write!(
                f,
                "posterior at toss {} cannot be normalized (unnormalized mass {total})",
                step + 1
            ),
            UpdateError::EmptyDistribution => {
                write!(f, "cannot take the MAP estimate of an empty distribution")
            }
            UpdateError::LengthMismatch { grid, posterior } => write!(
                f,
                "distribution has {posterior} entries but the grid has {grid} points"
            ),
        }
    }
}

impl std::error::Error for UpdateError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::NORMALIZATION_TOLERANCE;
    use crate::observation::SEQUENCE_LEN;

    fn alternating() -> ObservationSequence {
        let values: Vec<i64> = (0..SEQUENCE_LEN as i64).map(|i| i % 2).collect();
        ObservationSequence::from_values(&values).unwrap()
    }

    #[test]
    fn counts_track_each_toss() {
        let mut counts = RunningCounts::new();
        counts.observe(Toss::Head);
        counts.observe(Toss::Tail);
        counts.observe(Toss::Head);
        assert_eq!(counts.heads(), 2);
        assert_eq!(counts.tails(), 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn first_head_gives_linear_posterior() {
        let grid = HypothesisGrid::new(5).unwrap();
        let prior = Prior::uniform(&grid);
        let mut values = vec![0i64; SEQUENCE_LEN];
        values[0] = 1;
        let obs = ObservationSequence::from_values(&values).unwrap();
        let trace = PosteriorUpdater::default()
            .compute_trace(&obs, &grid, &prior)
            .unwrap();
        // p / sum(p) over {0, .25, .5, .75, 1}
        let expected = [0.0, 0.1, 0.2, 0.3, 0.4];
        for (got, want) in trace.steps()[0]
            .posterior()
            .probabilities()
            .iter()
            .zip(expected)
        {
            assert!((got - want).abs() < 1e-12, "{got} vs {want}");
        }
    }

    #[test]
    fn endpoints_follow_zero_power_convention() {
        let grid = HypothesisGrid::new(3).unwrap();
        let prior = Prior::uniform(&grid);
        let obs = alternating();
        let trace = PosteriorUpdater::default()
            .compute_trace(&obs, &grid, &prior)
            .unwrap();
        // First toss is a tail: p = 1 is ruled out, p = 0 keeps (1-0)^1 = 1.
        let first = trace.steps()[0].posterior().probabilities();
        assert_eq!(first[2], 0.0);
        assert!(first[0] > 0.0);
        // Once both faces are seen only the midpoint survives.
        let second = trace.steps()[1].posterior().probabilities();
        assert_eq!(second, &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn every_step_is_normalized() {
        let grid = HypothesisGrid::default();
        let prior = Prior::uniform(&grid);
        for mode in [LikelihoodMode::Direct, LikelihoodMode::LogSpace] {
            let trace = PosteriorUpdater::new(mode)
                .compute_trace(&alternating(), &grid, &prior)
                .unwrap();
            assert_eq!(trace.len(), SEQUENCE_LEN);
            for step in &trace {
                assert!((step.posterior().total() - 1.0).abs() <= NORMALIZATION_TOLERANCE);
            }
        }
    }

    #[test]
    fn log_space_matches_direct() {
        let grid = HypothesisGrid::default();
        let prior = Prior::beta(&grid, 2.0, 5.0).unwrap();
        let obs = ObservationSequence::default_sample();
        let direct = PosteriorUpdater::new(LikelihoodMode::Direct)
            .compute_trace(&obs, &grid, &prior)
            .unwrap();
        let log_space = PosteriorUpdater::new(LikelihoodMode::LogSpace)
            .compute_trace(&obs, &grid, &prior)
            .unwrap();
        for (a, b) in direct.iter().zip(log_space.iter()) {
            assert_eq!(a.counts(), b.counts());
            for (x, y) in a
                .posterior()
                .probabilities()
                .iter()
                .zip(b.posterior().probabilities())
            {
                assert!((x - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn impossible_evidence_is_degenerate() {
        let grid = HypothesisGrid::new(4).unwrap();
        // All prior mass on p = 0, which a head rules out.
        let prior = Prior::from_weights(&grid, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let mut values = vec![0i64; SEQUENCE_LEN];
        values[3] = 1;
        let obs = ObservationSequence::from_values(&values).unwrap();
        for mode in [LikelihoodMode::Direct, LikelihoodMode::LogSpace] {
            let err = PosteriorUpdater::new(mode)
                .compute_trace(&obs, &grid, &prior)
                .unwrap_err();
            assert!(matches!(
                err,
                UpdateError::DegenerateNormalization { step: 3, .. }
            ));
        }
    }

    #[test]
    fn mismatched_prior_is_rejected() {
        let grid = HypothesisGrid::new(10).unwrap();
        let other = HypothesisGrid::new(11).unwrap();
        let prior = Prior::uniform(&other);
        let err = PosteriorUpdater::default()
            .compute_trace(&alternating(), &grid, &prior)
            .unwrap_err();
        assert_eq!(err, UpdateError::PriorMismatch { grid: 10, prior: 11 });
    }

    #[test]
    fn map_prefers_first_maximum() {
        let grid = HypothesisGrid::new(4).unwrap();
        let map = map_estimate(&[0.1, 0.4, 0.4, 0.1], &grid).unwrap();
        assert!((map - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn map_rejects_empty_and_mismatched() {
        let grid = HypothesisGrid::new(4).unwrap();
        assert_eq!(map_estimate(&[], &grid), Err(UpdateError::EmptyDistribution));
        assert!(matches!(
            map_estimate(&[0.5, 0.5], &grid),
            Err(UpdateError::LengthMismatch { .. })
        ));
    }
}
