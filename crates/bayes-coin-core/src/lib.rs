#![deny(warnings)]
//! Sequential Bayesian estimation of a coin's bias on a discrete grid.

pub mod grid;
pub mod observation;
pub mod posterior;
pub mod summary;

pub use grid::{GridError, HypothesisGrid, Prior, PriorError};
pub use observation::{DEFAULT_SAMPLE, ObservationError, ObservationSequence, SEQUENCE_LEN, Toss};
pub use posterior::{
    LikelihoodMode, Posterior, PosteriorTrace, PosteriorUpdater, RunningCounts, TraceStep,
    UpdateError, map_estimate,
};
pub use summary::PosteriorSummary;

pub struct AppInfo;

impl AppInfo {
    pub const fn name() -> &'static str {
        "bayes-coin"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
