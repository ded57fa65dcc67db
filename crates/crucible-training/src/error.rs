use crate::run::RunStatus;
use crate::validation::ValidationReport;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// Unsupported dataset/model identifier or hyperparameter. Raised before a run exists.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("validation failed: {}", .0.summary())]
    ValidationFailure(ValidationReport),

    #[error("training failed: {0}")]
    Training(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A run tracker invariant was violated. Always a defect in the caller.
    #[error("invalid transition for run {run_id}: {from} -> {to}")]
    InvalidTransition { run_id: String, from: RunStatus, to: RunStatus },

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    /// Stable snake_case tag recorded in stage error details.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::MalformedDataset(_) => "malformed_dataset",
            Self::ValidationFailure(_) => "validation_failure",
            Self::Training(_) => "training_failure",
            Self::Persistence(_) => "persistence_failure",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::RunNotFound(_) => "run_not_found",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Other(_) => "other",
        }
    }

    /// Whether the error signals a programming defect rather than a stage failure.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::RunNotFound(_))
    }

    pub(crate) fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Persistence(format!("{context}: {err}"))
    }
}
