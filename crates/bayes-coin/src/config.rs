use bayes_coin_core::grid::DEFAULT_GRID_POINTS;
use bayes_coin_core::{GridError, HypothesisGrid, LikelihoodMode, Prior, PriorError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_RUN_ID: &str = "coin_demo";
const MAX_GRID_POINTS: usize = 1_000_000;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root inference configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InferenceConfig {
    pub run_id: String,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub prior: PriorConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            run_id: DEFAULT_RUN_ID.to_string(),
            grid: GridConfig::default(),
            prior: PriorConfig::default(),
            input: InputConfig::default(),
            outputs: OutputsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl InferenceConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: InferenceConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.grid.validate()?;
        self.prior.validate()?;
        self.input.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            trace_jsonl: resolve_template(&self.run_id, &self.outputs.trace_jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
            plots_dir: resolve_template(&self.run_id, &self.outputs.plots_dir),
        }
    }
}

/// Resolution of the hypothesis grid and how likelihoods are evaluated on it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GridConfig {
    #[serde(default = "default_grid_points")]
    pub points: usize,
    #[serde(default)]
    pub likelihood: LikelihoodMode,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            points: DEFAULT_GRID_POINTS,
            likelihood: LikelihoodMode::default(),
        }
    }
}

impl GridConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.points < 2 {
            return Err(ValidationError::InvalidField {
                field: "grid.points".to_string(),
                message: "grid needs at least 2 points".to_string(),
            });
        }
        if self.points > MAX_GRID_POINTS {
            return Err(ValidationError::InvalidField {
                field: "grid.points".to_string(),
                message: format!("grid may have at most {MAX_GRID_POINTS} points"),
            });
        }
        Ok(())
    }

    pub fn build(&self) -> Result<HypothesisGrid, GridError> {
        HypothesisGrid::new(self.points)
    }
}

fn default_grid_points() -> usize {
    DEFAULT_GRID_POINTS
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriorKind {
    #[default]
    Uniform,
    Beta,
}

/// Prior belief over the bias. A uniform prior is `Beta(1, 1)`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PriorConfig {
    #[serde(default)]
    pub kind: PriorKind,
    #[serde(default = "default_shape")]
    pub alpha: f64,
    #[serde(default = "default_shape")]
    pub beta: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            kind: PriorKind::Uniform,
            alpha: default_shape(),
            beta: default_shape(),
        }
    }
}

impl PriorConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.kind != PriorKind::Beta {
            return Ok(());
        }
        for (label, value) in [("prior.alpha", self.alpha), ("prior.beta", self.beta)] {
            if !value.is_finite() || value < 1.0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: format!("shape must be a finite value >= 1, got {value}"),
                });
            }
        }
        Ok(())
    }

    /// Beta shapes equivalent to this prior.
    pub fn shapes(&self) -> (f64, f64) {
        match self.kind {
            PriorKind::Uniform => (1.0, 1.0),
            PriorKind::Beta => (self.alpha, self.beta),
        }
    }

    pub fn label(&self) -> String {
        match self.kind {
            PriorKind::Uniform => "uniform".to_string(),
            PriorKind::Beta => format!("Beta({}, {})", self.alpha, self.beta),
        }
    }

    pub fn build(&self, grid: &HypothesisGrid) -> Result<Prior, PriorError> {
        match self.kind {
            PriorKind::Uniform => Ok(Prior::uniform(grid)),
            PriorKind::Beta => Prior::beta(grid, self.alpha, self.beta),
        }
    }
}

fn default_shape() -> f64 {
    1.0
}

/// Where the tosses come from. Sources are consulted in field order; when none is set
/// the bundled demonstration sample is used.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct InputConfig {
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub simulate_bias: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl InputConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(file) = self.file.as_ref() {
            if file.as_os_str().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: "input.file".to_string(),
                    message: "path must not be empty".to_string(),
                });
            }
        }
        if let Some(bias) = self.simulate_bias {
            if !(0.0..=1.0).contains(&bias) {
                return Err(ValidationError::InvalidField {
                    field: "input.simulate_bias".to_string(),
                    message: format!("bias must lie in [0, 1], got {bias}"),
                });
            }
        }
        Ok(())
    }

    /// Makes `observations` the only active source.
    pub fn set_inline(&mut self, text: String) {
        *self = Self {
            observations: Some(text),
            seed: self.seed,
            ..Self::default()
        };
    }

    pub fn set_file(&mut self, path: PathBuf) {
        *self = Self {
            file: Some(path),
            seed: self.seed,
            ..Self::default()
        };
    }

    pub fn set_simulated(&mut self, bias: f64) {
        *self = Self {
            simulate_bias: Some(bias),
            seed: self.seed,
            ..Self::default()
        };
    }
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    #[serde(default = "default_trace_jsonl")]
    pub trace_jsonl: String,
    #[serde(default = "default_summary_md")]
    pub summary_md: String,
    #[serde(default = "default_plots_dir")]
    pub plots_dir: String,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            trace_jsonl: default_trace_jsonl(),
            summary_md: default_summary_md(),
            plots_dir: default_plots_dir(),
        }
    }
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.trace_jsonl", &self.trace_jsonl),
            ("outputs.summary_md", &self.summary_md),
            ("outputs.plots_dir", &self.plots_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn default_trace_jsonl() -> String {
    "out/{run_id}/trace.jsonl".to_string()
}

fn default_summary_md() -> String {
    "out/{run_id}/summary.md".to_string()
}

fn default_plots_dir() -> String {
    "out/{run_id}/plots".to_string()
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub trace_jsonl: PathBuf,
    pub summary_md: PathBuf,
    pub plots_dir: PathBuf,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
