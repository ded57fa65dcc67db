//! Crucible Training
//!
//! Pipeline primitives shared by the orchestrator and the CLI:
//! - Datasets, the built-in provider and data validation
//! - Run identity, stage records and progress events
//! - Artifact layout, the on-disk artifact store and its registry
//! - Dashboard snapshots built from persisted runs

pub mod artifacts;
pub mod builtin;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod layout;
pub mod progress;
pub mod registry;
pub mod run;
pub mod validation;

pub use artifacts::{ArtifactManifest, ArtifactMetadata, ArtifactReference, ArtifactStore};
pub use builtin::{BuiltinDatasets, BuiltinOptions, DatasetProvider};
pub use dashboard::{DashboardSnapshot, MetricSummary, MetricsReporter, RunSummary};
pub use dataset::{compute_dataset_id, Column, ColumnKind, Dataset, DatasetId, DatasetKind};
pub use error::{TrainingError, TrainingResult};
pub use layout::ArtifactLayout;
pub use progress::{
    NullProgressSink, ProgressEvent, ProgressSink, RecordingProgressSink, TracingProgressSink,
};
pub use registry::{discover_run_dirs, load_run, resolve_artifact, verify_artifact, RunEntry};
pub use run::{
    ErrorDetail, Run, RunId, RunPayload, RunResult, RunSpec, RunStatus, StageName, StageOutcome,
    StageRecord,
};
pub use validation::{DataValidator, Issue, Severity, ValidationReport, ValidationRules, Validator};
