use crate::artifacts::ArtifactReference;
use crate::error::TrainingError;
use crate::validation::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier for a training run: `YYYYMMDD_HHMMSS_<8 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    #[must_use]
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", timestamp.format("%Y%m%d_%H%M%S"), &suffix[..8]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// `pending -> running -> {completed, failed}`; terminal states are final.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running) | (Self::Running, Self::Completed | Self::Failed)
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    FetchDataset,
    Validate,
    Train,
    Evaluate,
    Persist,
}

impl StageName {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchDataset => "fetch_dataset",
            Self::Validate => "validate",
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::Persist => "persist",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Ok,
    Skipped,
    Failed,
}

/// Structured failure attached to a stage record and to the run result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable tag from [`TrainingError::kind`].
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_report: Option<ValidationReport>,
}

impl ErrorDetail {
    #[must_use]
    pub fn from_error(stage: StageName, err: &TrainingError) -> Self {
        let validation_report = match err {
            TrainingError::ValidationFailure(report) => Some(report.clone()),
            _ => None,
        };
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            stage: Some(stage),
            validation_report,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub outcome: StageOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl StageRecord {
    #[must_use]
    pub fn ok(stage: StageName, started_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self { stage, outcome: StageOutcome::Ok, started_at, duration_ms, error: None }
    }

    #[must_use]
    pub fn skipped(stage: StageName) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            started_at: Utc::now(),
            duration_ms: 0,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(
        stage: StageName,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        error: ErrorDetail,
    ) -> Self {
        Self { stage, outcome: StageOutcome::Failed, started_at, duration_ms, error: Some(error) }
    }
}

/// Request labels carried on every run so persisted records are self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub dataset_type: String,
    pub model_type: String,
    pub run_validation: bool,
}

/// Final payload attached when a run reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_reference: Option<ArtifactReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(flatten)]
    pub spec: RunSpec,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
    #[serde(default)]
    pub result: Option<RunPayload>,
}

impl Run {
    #[must_use]
    pub fn new(run_id: RunId, spec: RunSpec) -> Self {
        Self {
            run_id,
            status: RunStatus::Pending,
            spec,
            started_at: Utc::now(),
            ended_at: None,
            stages: Vec::new(),
            result: None,
        }
    }

    /// The first failed stage, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.outcome == StageOutcome::Failed)
    }

    #[must_use]
    pub fn to_result(&self) -> RunResult {
        let payload = self.result.clone().unwrap_or_default();
        RunResult {
            run_id: self.run_id.clone(),
            status: self.status,
            metrics: payload.metrics,
            artifact_reference: payload.artifact_reference,
            error: payload.error,
        }
    }
}

/// What a caller receives from one pipeline invocation. Branch on `status` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_reference: Option<ArtifactReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl RunResult {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
