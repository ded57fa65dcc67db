//! End-to-end pipeline scenarios against a temporary output directory.

use async_trait::async_trait;
use crucible_models::{Hyperparameters, ModelType, TrainedState};
use crucible_orchestrator::{RunRequest, RunTracker, TrainingOrchestrator};
use crucible_training::{
    ArtifactStore, BuiltinDatasets, Dataset, DatasetKind, DatasetProvider, Issue, MetricsReporter,
    ProgressEvent, RecordingProgressSink, RunStatus, Severity, StageName, StageOutcome,
    TrainingError, TrainingResult, ValidationReport, Validator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Default)]
struct SpyValidator {
    calls: AtomicUsize,
}

impl Validator for SpyValidator {
    fn validate(&self, _dataset: &Dataset) -> TrainingResult<ValidationReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ValidationReport::from_issues(Vec::new()))
    }
}

struct RejectingValidator;

impl Validator for RejectingValidator {
    fn validate(&self, _dataset: &Dataset) -> TrainingResult<ValidationReport> {
        Ok(ValidationReport::from_issues(vec![Issue::new(
            Severity::Error,
            "labels",
            "synthetic rejection",
        )]))
    }
}

/// Features and labels disagree on row count.
struct MismatchedProvider;

#[async_trait]
impl DatasetProvider for MismatchedProvider {
    fn id(&self) -> &'static str {
        "mismatched"
    }

    async fn fetch(&self, _kind: DatasetKind) -> TrainingResult<Dataset> {
        Ok(Dataset::new("broken", vec![vec![1.0, 2.0]; 10], vec![0, 1, 0]))
    }
}

/// Iris with a column of missing measurements.
struct NonFiniteProvider;

#[async_trait]
impl DatasetProvider for NonFiniteProvider {
    fn id(&self) -> &'static str {
        "non_finite"
    }

    async fn fetch(&self, kind: DatasetKind) -> TrainingResult<Dataset> {
        let mut dataset = BuiltinDatasets::default().load(kind)?;
        for row in &mut dataset.features {
            row[0] = f64::NAN;
        }
        Ok(dataset)
    }
}

fn orchestrator() -> (Arc<RunTracker>, TrainingOrchestrator) {
    let tracker = Arc::new(RunTracker::new());
    (tracker.clone(), TrainingOrchestrator::new(tracker))
}

fn small_forest() -> Hyperparameters {
    Hyperparameters::from([("n_estimators".to_string(), 10.0)])
}

#[tokio::test]
async fn test_iris_logistic_regression_completes() {
    let temp = TempDir::new().unwrap();
    let (tracker, orchestrator) = orchestrator();

    let result = orchestrator
        .run(RunRequest::new("iris", "logistic_regression", temp.path()))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.error.is_none());
    let metrics = result.metrics.as_ref().unwrap();
    assert!((0.0..=1.0).contains(&metrics["accuracy"]));
    assert!(metrics["accuracy"] > 0.8);

    let reference = result.artifact_reference.as_ref().unwrap();
    let store = ArtifactStore::new(temp.path());
    let state: TrainedState = store.load(reference).unwrap();
    assert_eq!(state.model_type, ModelType::LogisticRegression);
    assert_eq!(state.n_features, 4);

    let manifest = store.read_manifest(&result.run_id).unwrap();
    assert_eq!(manifest.metadata.metrics, *metrics);
    assert_eq!(manifest.metadata.class_names, vec!["setosa", "versicolor", "virginica"]);

    let run = tracker.get(&result.run_id).await.unwrap();
    assert!(run.ended_at.is_some());
    let stages: Vec<StageName> = run.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            StageName::FetchDataset,
            StageName::Validate,
            StageName::Train,
            StageName::Evaluate,
            StageName::Persist,
        ]
    );
    assert!(run.stages.iter().all(|s| s.outcome == StageOutcome::Ok));
    assert!(store.layout().run_record_path(&result.run_id).exists());
}

#[tokio::test]
async fn test_unsupported_model_creates_no_run_and_no_artifact() {
    let temp = TempDir::new().unwrap();
    let (tracker, orchestrator) = orchestrator();

    let err = orchestrator
        .run(RunRequest::new("iris", "unsupported_model", temp.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, TrainingError::Configuration(_)));
    assert!(tracker.is_empty().await);
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_hyperparameter_creates_no_run() {
    let temp = TempDir::new().unwrap();
    let (tracker, orchestrator) = orchestrator();

    let request = RunRequest::new("wine", "svm", temp.path())
        .with_hyperparameters(Hyperparameters::from([("max_depth".to_string(), 3.0)]));
    let err = orchestrator.run(request).await.unwrap_err();

    assert!(matches!(err, TrainingError::Configuration(_)));
    assert!(tracker.is_empty().await);
}

#[tokio::test]
async fn test_failed_validation_fails_run_without_artifact() {
    let temp = TempDir::new().unwrap();
    let (tracker, orchestrator) = orchestrator();
    let orchestrator = orchestrator.with_validator(Arc::new(RejectingValidator));

    let result = orchestrator.run(RunRequest::new("iris", "svm", temp.path())).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.artifact_reference.is_none());
    assert!(result.metrics.is_none());
    let error = result.error.unwrap();
    assert_eq!(error.kind, "validation_failure");
    assert_eq!(error.stage, Some(StageName::Validate));
    assert!(!error.validation_report.unwrap().passed);

    let store = ArtifactStore::new(temp.path());
    assert!(!store.layout().model_path(&result.run_id).exists());
    assert!(!store.layout().manifest_path(&result.run_id).exists());

    let run = tracker.get(&result.run_id).await.unwrap();
    assert_eq!(run.stages.len(), 2);
    assert_eq!(run.failed_stage().unwrap().stage, StageName::Validate);
}

#[tokio::test]
async fn test_validator_not_invoked_when_disabled() {
    let temp = TempDir::new().unwrap();
    let spy = Arc::new(SpyValidator::default());
    let (_, orchestrator) = orchestrator();
    let orchestrator = orchestrator.with_validator(spy.clone());

    let result = orchestrator
        .run(RunRequest::new("iris", "logistic_regression", temp.path()).with_validation(false))
        .await
        .unwrap();
    assert!(result.is_completed());
    assert_eq!(spy.calls.load(Ordering::SeqCst), 0);

    orchestrator.run(RunRequest::new("iris", "logistic_regression", temp.path())).await.unwrap();
    assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_row_mismatch_fails_at_fetch_stage() {
    let temp = TempDir::new().unwrap();
    let (tracker, orchestrator) = orchestrator();
    let orchestrator = orchestrator.with_provider(Arc::new(MismatchedProvider));

    let result = orchestrator.run(RunRequest::new("iris", "svm", temp.path())).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.kind, "malformed_dataset");
    assert_eq!(error.stage, Some(StageName::FetchDataset));

    let run = tracker.get(&result.run_id).await.unwrap();
    assert_eq!(run.stages.len(), 1);
    assert!(!run.stages.iter().any(|s| s.stage == StageName::Train));
}

#[tokio::test]
async fn test_identical_requests_produce_distinct_runs() {
    let temp = TempDir::new().unwrap();
    let (tracker, orchestrator) = orchestrator();
    let request =
        RunRequest::new("wine", "random_forest", temp.path()).with_hyperparameters(small_forest());

    let first = orchestrator.run(request.clone()).await.unwrap();
    let second = orchestrator.run(request).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_ne!(first.artifact_reference.unwrap().path, second.artifact_reference.unwrap().path);
    assert_eq!(tracker.len().await, 2);
}

#[tokio::test]
async fn test_concurrent_runs_share_output_directory() {
    let temp = TempDir::new().unwrap();
    let tracker = Arc::new(RunTracker::new());
    let orchestrator = Arc::new(TrainingOrchestrator::new(tracker.clone()));

    let mut handles = Vec::new();
    for (dataset, model) in [
        ("iris", "logistic_regression"),
        ("wine", "svm"),
        ("iris", "random_forest"),
        ("classification", "gradient_boosting"),
    ] {
        let orchestrator = orchestrator.clone();
        let mut params = Hyperparameters::new();
        if model == "random_forest" || model == "gradient_boosting" {
            params.insert("n_estimators".to_string(), 5.0);
        }
        let request = RunRequest::new(dataset, model, temp.path()).with_hyperparameters(params);
        handles.push(tokio::spawn(async move { orchestrator.run(request).await }));
    }

    let mut run_ids = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.is_completed(), "{result:?}");
        run_ids.push(result.run_id);
    }
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 4);
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 4);
    assert_eq!(tracker.len().await, 4);
}

#[tokio::test]
async fn test_tampered_artifact_fails_load() {
    let temp = TempDir::new().unwrap();
    let (_, orchestrator) = orchestrator();
    let result = orchestrator.run(RunRequest::new("iris", "svm", temp.path())).await.unwrap();
    let reference = result.artifact_reference.unwrap();

    let store = ArtifactStore::new(temp.path());
    let path = temp.path().join(&reference.path);
    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push(' ');
    std::fs::write(&path, text).unwrap();

    let err = store.load::<TrainedState>(&reference).unwrap_err();
    assert!(matches!(err, TrainingError::Persistence(_)));
}

#[tokio::test]
async fn test_reloaded_state_is_stable_and_accurate() {
    let temp = TempDir::new().unwrap();
    let (_, orchestrator) = orchestrator();
    let request = RunRequest::new("wine", "gradient_boosting", temp.path())
        .with_hyperparameters(Hyperparameters::from([("n_estimators".to_string(), 10.0)]));
    let result = orchestrator.run(request).await.unwrap();

    let store = ArtifactStore::new(temp.path());
    let state: TrainedState = store.load(result.artifact_reference.as_ref().unwrap()).unwrap();
    let again: TrainedState = store.load(result.artifact_reference.as_ref().unwrap()).unwrap();
    assert_eq!(state, again);

    let wine = BuiltinDatasets::default().load(DatasetKind::Wine).unwrap();
    let accuracy = state.score(&wine).unwrap();
    assert!(accuracy > 0.8);
}

#[tokio::test]
async fn test_progress_events_bracket_the_run() {
    let temp = TempDir::new().unwrap();
    let sink = Arc::new(RecordingProgressSink::default());
    let (_, orchestrator) = orchestrator();
    let orchestrator = orchestrator.with_progress(sink.clone());

    orchestrator
        .run(RunRequest::new("iris", "logistic_regression", temp.path()).with_validation(false))
        .await
        .unwrap();

    let events = sink.events();
    assert!(matches!(events.first(), Some(ProgressEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::RunFinished { status: RunStatus::Completed, .. })
    ));
    let finished =
        events.iter().filter(|e| matches!(e, ProgressEvent::StageFinished { .. })).count();
    assert_eq!(finished, 5);
}

#[tokio::test]
async fn test_reporter_sees_completed_and_failed_runs() {
    let temp = TempDir::new().unwrap();
    let (_, orchestrator) = orchestrator();
    orchestrator.run(RunRequest::new("iris", "logistic_regression", temp.path())).await.unwrap();
    let failing = orchestrator.with_validator(Arc::new(RejectingValidator));
    failing.run(RunRequest::new("iris", "svm", temp.path())).await.unwrap();

    let reporter = MetricsReporter::new(temp.path());
    let dashboard = temp.path().join("dashboard.json");
    let snapshot = reporter.refresh(&dashboard).unwrap();
    assert_eq!(snapshot.pipeline.total_runs, 2);
    assert_eq!(snapshot.pipeline.completed_runs, 1);
    assert_eq!(snapshot.pipeline.failed_runs, 1);
    assert!(snapshot.metrics.contains_key("accuracy"));

    let first = std::fs::read(&dashboard).unwrap();
    reporter.refresh(&dashboard).unwrap();
    assert_eq!(first, std::fs::read(&dashboard).unwrap());
}

#[tokio::test]
async fn test_unwritable_output_dir_fails_at_persist_stage() {
    let temp = TempDir::new().unwrap();
    let occupied = temp.path().join("occupied");
    std::fs::write(&occupied, "not a directory").unwrap();
    let (tracker, orchestrator) = orchestrator();

    let result =
        orchestrator.run(RunRequest::new("iris", "logistic_regression", &occupied)).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.artifact_reference.is_none());
    let error = result.error.unwrap();
    assert_eq!(error.kind, "persistence_failure");
    assert_eq!(error.stage, Some(StageName::Persist));
    assert!(occupied.is_file());

    let run = tracker.get(&result.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.stages.len(), 5);
    assert_eq!(run.failed_stage().unwrap().stage, StageName::Persist);
}

#[tokio::test]
async fn test_non_finite_features_fail_at_train_stage() {
    let temp = TempDir::new().unwrap();
    let (tracker, orchestrator) = orchestrator();
    let orchestrator = orchestrator.with_provider(Arc::new(NonFiniteProvider));

    let request =
        RunRequest::new("iris", "logistic_regression", temp.path()).with_validation(false);
    let result = orchestrator.run(request).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.metrics.is_none());
    let error = result.error.unwrap();
    assert_eq!(error.kind, "training_failure");
    assert_eq!(error.stage, Some(StageName::Train));

    let store = ArtifactStore::new(temp.path());
    assert!(!store.layout().manifest_path(&result.run_id).exists());
    assert!(store.layout().run_record_path(&result.run_id).exists());

    let run = tracker.get(&result.run_id).await.unwrap();
    let outcomes: Vec<(StageName, StageOutcome)> =
        run.stages.iter().map(|s| (s.stage, s.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            (StageName::FetchDataset, StageOutcome::Ok),
            (StageName::Validate, StageOutcome::Skipped),
            (StageName::Train, StageOutcome::Failed),
        ]
    );
}
