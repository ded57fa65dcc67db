//! Command implementations for the Crucible CLI.

pub mod dashboard;
pub mod runs;
pub mod train;

use crucible_orchestrator::PipelineConfig;
use std::path::PathBuf;

/// `--output-dir` when given, otherwise the configured artifact root.
pub(crate) fn output_dir(flag: Option<PathBuf>, config: &PipelineConfig) -> PathBuf {
    flag.unwrap_or_else(|| config.output_dir())
}

/// `--dashboard-path` when given, otherwise the configured location.
pub(crate) fn dashboard_path(flag: Option<PathBuf>, config: &PipelineConfig) -> PathBuf {
    flag.unwrap_or_else(|| config.dashboard_path())
}
