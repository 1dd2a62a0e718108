//! Discretized hypothesis space for the coin bias and prior weights over it.

use serde::Serialize;
use std::fmt;

/// Number of grid points used when no resolution is configured.
pub const DEFAULT_GRID_POINTS: usize = 200;

/// Maximum deviation from one tolerated when checking that weights form a distribution.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Evenly spaced candidate values of the bias `p`, from exactly 0 to exactly 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisGrid {
    points: Vec<f64>,
}

impl HypothesisGrid {
    /// Builds a grid of `points` values spanning `[0, 1]` inclusive.
    pub fn new(points: usize) -> Result<Self, GridError> {
        if points < 2 {
            return Err(GridError::TooFewPoints { requested: points });
        }
        Ok(Self {
            points: linspace(points),
        })
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.points.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.points.iter()
    }

    /// Spacing between adjacent grid points.
    pub fn resolution(&self) -> f64 {
        1.0 / (self.points.len() - 1) as f64
    }

    /// Index of the grid point closest to `p` (clamped into `[0, 1]`).
    pub fn nearest_index(&self, p: f64) -> usize {
        let clamped = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        let idx = (clamped / self.resolution()).round() as usize;
        idx.min(self.points.len() - 1)
    }
}

impl Default for HypothesisGrid {
    fn default() -> Self {
        Self {
            points: linspace(DEFAULT_GRID_POINTS),
        }
    }
}

fn linspace(points: usize) -> Vec<f64> {
    let last = (points - 1) as f64;
    (0..points).map(|idx| idx as f64 / last).collect()
}

/// Probability mass over a [`HypothesisGrid`] before any toss is observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prior {
    weights: Vec<f64>,
}

impl Prior {
    /// Equal mass on every grid point.
    pub fn uniform(grid: &HypothesisGrid) -> Self {
        let n = grid.len();
        Self {
            weights: vec![1.0 / n as f64; n],
        }
    }

    /// Accepts weights that already form a distribution over `grid`.
    pub fn from_weights(grid: &HypothesisGrid, weights: Vec<f64>) -> Result<Self, PriorError> {
        check_weights(grid, &weights)?;
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(PriorError::NotNormalized { total });
        }
        Ok(Self { weights })
    }

    /// Scales arbitrary non-negative weights so they sum to one.
    pub fn normalized(grid: &HypothesisGrid, mut weights: Vec<f64>) -> Result<Self, PriorError> {
        check_weights(grid, &weights)?;
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(PriorError::ZeroMass);
        }
        for weight in &mut weights {
            *weight /= total;
        }
        Ok(Self { weights })
    }

    /// Discretized `Beta(alpha, beta)` density. Both shapes must be at least one so the
    /// density stays finite at the grid endpoints.
    pub fn beta(grid: &HypothesisGrid, alpha: f64, beta: f64) -> Result<Self, PriorError> {
        if !(alpha.is_finite() && beta.is_finite()) || alpha < 1.0 || beta < 1.0 {
            return Err(PriorError::InvalidShape { alpha, beta });
        }
        let weights = grid
            .iter()
            .map(|p| p.powf(alpha - 1.0) * (1.0 - p).powf(beta - 1.0))
            .collect();
        Self::normalized(grid, weights)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

fn check_weights(grid: &HypothesisGrid, weights: &[f64]) -> Result<(), PriorError> {
    if weights.len() != grid.len() {
        return Err(PriorError::LengthMismatch {
            grid: grid.len(),
            weights: weights.len(),
        });
    }
    for (index, weight) in weights.iter().copied().enumerate() {
        if !weight.is_finite() {
            return Err(PriorError::NonFinite { index });
        }
        if weight < 0.0 {
            return Err(PriorError::NegativeWeight { index, weight });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    TooFewPoints { requested: usize },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::TooFewPoints { requested } => {
                write!(f, "grid needs at least 2 points, got {requested}")
            }
        }
    }
}

impl std::error::Error for GridError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriorError {
    LengthMismatch { grid: usize, weights: usize },
    NegativeWeight { index: usize, weight: f64 },
    NonFinite { index: usize },
    NotNormalized { total: f64 },
    ZeroMass,
    InvalidShape { alpha: f64, beta: f64 },
}

impl fmt::Display for PriorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorError::LengthMismatch { grid, weights } => {
                write!(f, "prior has {weights} weights but the grid has {grid} points")
            }
            PriorError::NegativeWeight { index, weight } => {
                write!(f, "prior weight {weight} at index {index} is negative")
            }
            PriorError::NonFinite { index } => {
                write!(f, "prior weight at index {index} is not finite")
            }
            PriorError::NotNormalized { total } => {
                write!(f, "prior weights sum to {total}, expected 1")
            }
            PriorError::ZeroMass => write!(f, "prior weights carry no probability mass"),
            PriorError::InvalidShape { alpha, beta } => {
                write!(f, "beta prior shapes must be >= 1, got ({alpha}, {beta})")
            }
        }
    }
}

impl std::error::Error for PriorError {}
