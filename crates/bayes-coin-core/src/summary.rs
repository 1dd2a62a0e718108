//! Descriptive statistics of a grid posterior.

use crate::grid::HypothesisGrid;
use crate::posterior::{Posterior, UpdateError};
use serde::Serialize;

/// Probability mass left outside the credible interval, split evenly between both tails.
const CREDIBLE_TAIL_MASS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PosteriorSummary {
    pub map: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Equal-tailed 95% interval read off the discrete CDF.
    pub credible_interval: (f64, f64),
    /// Shannon entropy in nats.
    pub entropy: f64,
    pub peak: f64,
}

impl PosteriorSummary {
    pub fn from_posterior(
        posterior: &Posterior,
        grid: &HypothesisGrid,
    ) -> Result<Self, UpdateError> {
        let map = posterior.map_estimate(grid)?;
        let probs = posterior.probabilities();
        let mean = posterior.mean(grid);
        let variance: f64 = grid
            .iter()
            .zip(probs)
            .map(|(p, prob)| (p - mean).powi(2) * prob)
            .sum();

        let entropy = probs
            .iter()
            .filter(|prob| **prob > 0.0)
            .map(|prob| -prob * prob.ln())
            .sum();

        Ok(Self {
            map,
            mean,
            std_dev: variance.max(0.0).sqrt(),
            credible_interval: credible_interval(probs, grid),
            entropy,
            peak: posterior.peak(),
        })
    }
}

fn credible_interval(probs: &[f64], grid: &HypothesisGrid) -> (f64, f64) {
    let lower_target = CREDIBLE_TAIL_MASS / 2.0;
    let upper_target = 1.0 - CREDIBLE_TAIL_MASS / 2.0;
    let points = grid.points();
    let mut lower = None;
    let mut upper = points[points.len() - 1];
    let mut cumulative = 0.0;
    for (idx, prob) in probs.iter().enumerate() {
        cumulative += prob;
        if lower.is_none() && cumulative >= lower_target {
            lower = Some(points[idx]);
        }
        if cumulative >= upper_target {
            upper = points[idx];
            break;
        }
    }
    (lower.unwrap_or(points[0]), upper)
}
