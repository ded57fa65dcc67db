//! Dashboard snapshots built from persisted run records.
//!
//! The reporter is a read-only consumer of an output directory. It never
//! takes locks, so a snapshot may miss runs that are still being written.

use crate::artifacts::{write_atomic, ArtifactReference, ArtifactStore};
use crate::error::TrainingResult;
use crate::registry::{discover_run_dirs, read_run_record};
use crate::run::{ErrorDetail, Run, RunId, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub version: String,
}

impl Default for ProjectInfo {
    fn default() -> Self {
        Self { name: "crucible".to_string(), version: env!("CARGO_PKG_VERSION").to_string() }
    }
}

/// One terminal run as seen by the reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    pub dataset_type: String,
    pub model_type: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_reference: Option<ArtifactReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        let result = run.to_result();
        Self {
            run_id: run.run_id.clone(),
            status: run.status,
            dataset_type: run.spec.dataset_type.clone(),
            model_type: run.spec.model_type.clone(),
            started_at: run.started_at,
            ended_at: run.ended_at,
            metrics: result.metrics.unwrap_or_default(),
            artifact_reference: result.artifact_reference,
            error: result.error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Option<Self> {
        let min = values.iter().copied().reduce(f64::min)?;
        let max = values.iter().copied().reduce(f64::max)?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { min, max, mean, count: values.len() })
    }
}

/// The most recent run, flattened the way the dashboard page reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestRun {
    pub run_id: RunId,
    pub status: RunStatus,
    pub dataset_type: String,
    pub model_type: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    #[serde(default)]
    pub latest_run: Option<LatestRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub project: ProjectInfo,
    /// Newest `ended_at` across the runs, so regeneration is reproducible.
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    pub pipeline: PipelineSummary,
    pub runs: BTreeMap<RunId, RunSummary>,
    /// Per-metric statistics over completed runs.
    pub metrics: BTreeMap<String, MetricSummary>,
}

#[derive(Debug, Clone)]
pub struct MetricsReporter {
    store: ArtifactStore,
    project: ProjectInfo,
}

impl MetricsReporter {
    pub fn new(output_dir: impl Into<std::path::PathBuf>) -> Self {
        Self { store: ArtifactStore::new(output_dir), project: ProjectInfo::default() }
    }

    #[must_use]
    pub fn with_project(mut self, project: ProjectInfo) -> Self {
        self.project = project;
        self
    }

    /// Read every terminal run record under the output directory, ordered by run id.
    ///
    /// Unreadable records, runs still in flight, and completed runs without a
    /// manifest are skipped with a warning.
    pub fn collect(&self) -> TrainingResult<Vec<RunSummary>> {
        let layout = self.store.layout();
        let mut out = Vec::new();

        for run_id in discover_run_dirs(layout.root())? {
            let record_path = layout.run_record_path(&run_id);
            if !record_path.exists() {
                warn!(run_id = %run_id, "Skipping run directory without a run record");
                continue;
            }
            let run = match read_run_record(&record_path) {
                Ok(run) => run,
                Err(err) => {
                    warn!(run_id = %run_id, error = %err, "Skipping unreadable run record");
                    continue;
                }
            };
            if !run.status.is_terminal() {
                warn!(run_id = %run_id, status = %run.status, "Skipping non-terminal run");
                continue;
            }
            if run.status == RunStatus::Completed && !layout.manifest_path(&run_id).exists() {
                warn!(run_id = %run_id, "Skipping completed run with missing artifact manifest");
                continue;
            }
            out.push(RunSummary::from(&run));
        }

        debug!(root = %layout.root().display(), runs = out.len(), "Collected run records");
        Ok(out)
    }

    #[must_use]
    pub fn aggregate(&self, records: &[RunSummary]) -> DashboardSnapshot {
        let completed: Vec<&RunSummary> =
            records.iter().filter(|r| r.status == RunStatus::Completed).collect();

        let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in &completed {
            for (name, value) in &record.metrics {
                values.entry(name.clone()).or_default().push(*value);
            }
        }
        let metrics = values
            .into_iter()
            .filter_map(|(name, v)| MetricSummary::from_values(&v).map(|s| (name, s)))
            .collect();

        let latest_run = records
            .iter()
            .max_by(|a, b| (a.ended_at, &a.run_id).cmp(&(b.ended_at, &b.run_id)))
            .map(|r| LatestRun {
                run_id: r.run_id.clone(),
                status: r.status,
                dataset_type: r.dataset_type.clone(),
                model_type: r.model_type.clone(),
                timestamp: r.ended_at,
                metrics: r.metrics.clone(),
            });

        DashboardSnapshot {
            project: self.project.clone(),
            generated_at: records.iter().filter_map(|r| r.ended_at).max(),
            pipeline: PipelineSummary {
                total_runs: records.len(),
                completed_runs: completed.len(),
                failed_runs: records.iter().filter(|r| r.status == RunStatus::Failed).count(),
                latest_run,
            },
            runs: records.iter().map(|r| (r.run_id.clone(), r.clone())).collect(),
            metrics,
        }
    }

    pub fn save(&self, snapshot: &DashboardSnapshot, path: &Path) -> TrainingResult<()> {
        let mut json = serde_json::to_vec_pretty(snapshot)?;
        json.push(b'\n');
        write_atomic(path, &json)?;
        debug!(path = %path.display(), runs = snapshot.runs.len(), "Saved dashboard snapshot");
        Ok(())
    }

    /// `collect` + `aggregate` + `save` in one call.
    pub fn refresh(&self, path: &Path) -> TrainingResult<DashboardSnapshot> {
        let records = self.collect()?;
        let snapshot = self.aggregate(&records);
        self.save(&snapshot, path)?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactMetadata;
    use crate::dataset::DatasetId;
    use crate::run::{RunPayload, RunSpec};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn terminal_run(store: &ArtifactStore, status: RunStatus, accuracy: f64, minute: i64) -> RunId {
        let run_id = RunId::new();
        let mut run = Run::new(
            run_id.clone(),
            RunSpec { dataset_type: "iris".into(), model_type: "svm".into(), run_validation: true },
        );
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        run.status = status;
        run.started_at = base;
        run.ended_at = Some(base + Duration::minutes(minute));

        let mut payload = RunPayload::default();
        if status == RunStatus::Completed {
            let metrics = BTreeMap::from([("accuracy".to_string(), accuracy)]);
            let metadata = ArtifactMetadata {
                dataset_type: "iris".into(),
                model_type: "svm".into(),
                dataset_id: DatasetId("d".into()),
                hyperparameters: BTreeMap::new(),
                metrics: metrics.clone(),
                feature_names: Vec::new(),
                class_names: Vec::new(),
            };
            payload.artifact_reference = Some(store.persist(&run_id, &accuracy, metadata).unwrap());
            payload.metrics = Some(metrics);
        }
        run.result = Some(payload);
        store.record_run(&run).unwrap();
        run_id
    }

    #[test]
    fn test_aggregate_statistics() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        terminal_run(&store, RunStatus::Completed, 0.8, 1);
        let newest = terminal_run(&store, RunStatus::Completed, 1.0, 5);
        terminal_run(&store, RunStatus::Failed, 0.0, 3);

        let reporter = MetricsReporter::new(temp.path());
        let snapshot = reporter.aggregate(&reporter.collect().unwrap());

        assert_eq!(snapshot.pipeline.total_runs, 3);
        assert_eq!(snapshot.pipeline.completed_runs, 2);
        assert_eq!(snapshot.pipeline.failed_runs, 1);
        assert_eq!(snapshot.pipeline.latest_run.as_ref().unwrap().run_id, newest);

        let accuracy = snapshot.metrics["accuracy"];
        assert!((accuracy.min - 0.8).abs() < 1e-12);
        assert!((accuracy.max - 1.0).abs() < 1e-12);
        assert!((accuracy.mean - 0.9).abs() < 1e-12);
        assert_eq!(accuracy.count, 2);
    }

    #[test]
    fn test_collect_skips_broken_directories() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let good = terminal_run(&store, RunStatus::Completed, 0.9, 1);
        let orphan = terminal_run(&store, RunStatus::Completed, 0.7, 2);
        std::fs::remove_file(store.layout().manifest_path(&orphan)).unwrap();

        std::fs::create_dir_all(temp.path().join("empty_dir")).unwrap();
        let corrupt = temp.path().join("20240101_000000_00000000");
        std::fs::create_dir_all(&corrupt).unwrap();
        std::fs::write(corrupt.join("run.json"), b"{not json").unwrap();

        let records = MetricsReporter::new(temp.path()).collect().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run_id, good);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("artifacts"));
        terminal_run(&store, RunStatus::Completed, 0.95, 1);
        terminal_run(&store, RunStatus::Failed, 0.0, 2);

        let reporter = MetricsReporter::new(temp.path().join("artifacts"));
        let path = temp.path().join("docs/dashboard_data.json");
        reporter.refresh(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        reporter.refresh(&path).unwrap();
        assert_eq!(first, std::fs::read(&path).unwrap());
    }

    #[test]
    fn test_empty_directory_snapshot() {
        let temp = TempDir::new().unwrap();
        let reporter = MetricsReporter::new(temp.path().join("none"));
        let snapshot = reporter.aggregate(&reporter.collect().unwrap());
        assert_eq!(snapshot.pipeline.total_runs, 0);
        assert!(snapshot.generated_at.is_none());
        assert!(snapshot.pipeline.latest_run.is_none());
    }
}
