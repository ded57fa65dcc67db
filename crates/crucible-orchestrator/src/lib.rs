//! Crucible Orchestrator
//!
//! Sequences dataset acquisition, validation, training, evaluation and
//! artifact persistence into one tracked run.

pub mod config;
pub mod orchestrator;
pub mod tracker;

pub use config::{ConfigError, ConfigResult, PipelineConfig, ValidationConfig};
pub use orchestrator::{PipelineSettings, RunRequest, TrainingOrchestrator};
pub use tracker::RunTracker;
