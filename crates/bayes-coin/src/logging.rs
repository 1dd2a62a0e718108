//! JSON telemetry for inference runs.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LoggingConfig, ResolvedOutputs};

const TELEMETRY_FILE: &str = "telemetry.jsonl";

/// Keeps the background writer alive; telemetry is flushed when this drops.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    pub telemetry_path: PathBuf,
}

/// `telemetry.jsonl` in the directory holding the summary document.
pub fn telemetry_path(outputs: &ResolvedOutputs) -> PathBuf {
    outputs
        .summary_md
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(TELEMETRY_FILE)
}

/// `RUST_LOG` wins when set. Otherwise only this workspace's targets are kept,
/// at the configured level.
fn run_filter(logging: &LoggingConfig) -> EnvFilter {
    let level = logging.level().unwrap_or(Level::INFO);
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bayes_coin={}", level.as_str())))
}

/// Installs a JSON subscriber for the run. Returns `None` when structured
/// logging is disabled, in which case nothing is created on disk.
pub fn init_logging(
    logging: &LoggingConfig,
    outputs: &ResolvedOutputs,
    run_id: &str,
) -> Result<Option<LoggingGuard>> {
    if !logging.enable_structured {
        return Ok(None);
    }

    let telemetry_path = telemetry_path(outputs);
    if let Some(dir) = telemetry_path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating telemetry directory at {}", dir.display()))?;
    }
    let file = File::create(&telemetry_path)
        .with_context(|| format!("creating telemetry file at {}", telemetry_path.display()))?;

    let (writer, guard) = non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .finish(file);

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(run_filter(logging))
        .json()
        .with_current_span(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(writer)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!(run_id, "global subscriber already installed, keeping it");
    }
    tracing::info!(
        target: "bayes_coin::logging",
        run_id,
        level = %logging.tracing_level,
        path = %telemetry_path.display(),
        "structured logging enabled"
    );

    Ok(Some(LoggingGuard {
        _guard: guard,
        telemetry_path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs_with_summary(summary: &str) -> ResolvedOutputs {
        ResolvedOutputs {
            trace_jsonl: PathBuf::from("trace.jsonl"),
            summary_md: PathBuf::from(summary),
            plots_dir: PathBuf::from("plots"),
        }
    }

    #[test]
    fn telemetry_sits_next_to_summary() {
        let outputs = outputs_with_summary("out/run/summary.md");
        assert_eq!(
            telemetry_path(&outputs),
            PathBuf::from("out/run/telemetry.jsonl")
        );
        let bare = outputs_with_summary("summary.md");
        assert_eq!(telemetry_path(&bare), PathBuf::from("./telemetry.jsonl"));
    }

    #[test]
    fn disabled_logging_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("nested/summary.md");
        let outputs = outputs_with_summary(summary.to_str().unwrap());
        let guard = init_logging(&LoggingConfig::default(), &outputs, "quiet").unwrap();
        assert!(guard.is_none());
        assert!(!dir.path().join("nested").exists());
    }
}
