//! The training pipeline: fetch, validate, train, evaluate, persist.
//!
//! A stage failure is recorded on the run and ends it as `failed`; the
//! caller gets a [`RunResult`] either way. Only configuration errors (raised
//! before a run exists) and tracker defects come back as `Err`.

use crate::tracker::RunTracker;
use chrono::Utc;
use crucible_models::{
    Estimator, Hyperparameters, ModelFactory, ModelType, TrainedModel, TrainedState,
};
use crucible_training::{
    compute_dataset_id, ArtifactMetadata, ArtifactStore, BuiltinDatasets, DataValidator, Dataset,
    DatasetKind, DatasetProvider, ErrorDetail, ProgressEvent, ProgressSink, RunId, RunPayload,
    RunResult, RunSpec, RunStatus, StageName, StageOutcome, StageRecord, TracingProgressSink,
    TrainingError, TrainingResult, Validator,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub dataset_type: String,
    pub model_type: String,
    pub output_dir: PathBuf,
    pub run_validation: bool,
    pub hyperparameters: Hyperparameters,
}

impl RunRequest {
    pub fn new(
        dataset_type: impl Into<String>,
        model_type: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            model_type: model_type.into(),
            output_dir: output_dir.into(),
            run_validation: true,
            hyperparameters: Hyperparameters::new(),
        }
    }

    #[must_use]
    pub fn with_validation(mut self, run_validation: bool) -> Self {
        self.run_validation = run_validation;
        self
    }

    #[must_use]
    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Fraction of rows held out for evaluation.
    pub test_fraction: f64,
    pub split_seed: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { test_fraction: 0.2, split_seed: 42 }
    }
}

/// Stage outcome: the outer error is a tracker defect, the inner one a
/// recorded stage failure.
type StageResult<T> = TrainingResult<Result<T, ErrorDetail>>;

pub struct TrainingOrchestrator {
    tracker: Arc<RunTracker>,
    provider: Arc<dyn DatasetProvider>,
    validator: Arc<dyn Validator>,
    progress: Arc<dyn ProgressSink>,
    settings: PipelineSettings,
}

impl std::fmt::Debug for TrainingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingOrchestrator")
            .field("provider", &self.provider.id())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TrainingOrchestrator {
    /// Built-in datasets, the default validator, and tracing progress output.
    #[must_use]
    pub fn new(tracker: Arc<RunTracker>) -> Self {
        Self {
            tracker,
            provider: Arc::new(BuiltinDatasets::default()),
            validator: Arc::new(DataValidator::default()),
            progress: Arc::new(TracingProgressSink),
            settings: PipelineSettings::default(),
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn DatasetProvider>) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<RunTracker> {
        &self.tracker
    }

    /// Run the full pipeline once.
    ///
    /// Unsupported dataset or model identifiers, invalid hyperparameters and
    /// invalid settings fail with [`TrainingError::Configuration`] and no run
    /// is recorded.
    pub async fn run(&self, request: RunRequest) -> TrainingResult<RunResult> {
        let dataset_kind: DatasetKind = request.dataset_type.parse()?;
        let model_type: ModelType = request.model_type.parse()?;
        let estimator = ModelFactory::create(model_type, &request.hyperparameters)?;
        let test_fraction = self.settings.test_fraction;
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(TrainingError::Configuration(format!(
                "test_fraction must be in (0, 1), got {test_fraction}"
            )));
        }

        let spec = RunSpec {
            dataset_type: dataset_kind.to_string(),
            model_type: model_type.to_string(),
            run_validation: request.run_validation,
        };
        let run_id = self.tracker.start(spec).await?;
        info!(
            run_id = %run_id,
            dataset = %dataset_kind,
            model = %model_type,
            validation = request.run_validation,
            "Starting training run"
        );
        self.progress.on_event(ProgressEvent::RunStarted {
            run_id: run_id.clone(),
            dataset_type: dataset_kind.to_string(),
            model_type: model_type.to_string(),
        });

        let store = ArtifactStore::new(&request.output_dir);
        let executed = self
            .execute(&run_id, dataset_kind, &estimator, &store, request.run_validation)
            .await?;
        let (status, payload) = match executed {
            Ok(payload) => (RunStatus::Completed, payload),
            Err(detail) => {
                (RunStatus::Failed, RunPayload { error: Some(detail), ..RunPayload::default() })
            }
        };

        let run = self.tracker.finalize(&run_id, status, payload).await?;
        if let Err(err) = store.record_run(&run) {
            warn!(run_id = %run_id, error = %err, "Failed to write run record");
        }

        match run.failed_stage() {
            Some(stage) => info!(
                run_id = %run_id,
                status = %run.status,
                stage = %stage.stage,
                "Training run finished"
            ),
            None => info!(run_id = %run_id, status = %run.status, "Training run finished"),
        }
        self.progress.on_event(ProgressEvent::RunFinished { run_id, status: run.status });
        Ok(run.to_result())
    }

    async fn execute(
        &self,
        run_id: &RunId,
        dataset_kind: DatasetKind,
        estimator: &Estimator,
        store: &ArtifactStore,
        run_validation: bool,
    ) -> StageResult<RunPayload> {
        let fetched = self
            .stage(run_id, StageName::FetchDataset, async {
                let dataset = self.provider.fetch(dataset_kind).await?;
                dataset.check_shape()?;
                Ok(dataset)
            })
            .await?;
        let dataset = match fetched {
            Ok(dataset) => dataset,
            Err(detail) => return Ok(Err(detail)),
        };

        if run_validation {
            let validated = self
                .stage(run_id, StageName::Validate, async {
                    let report = self.validator.validate(&dataset)?;
                    if !report.passed {
                        return Err(TrainingError::ValidationFailure(report));
                    }
                    for issue in report.warnings() {
                        warn!(run_id = %run_id, field = %issue.field, "{}", issue.message);
                    }
                    Ok(())
                })
                .await?;
            if let Err(detail) = validated {
                return Ok(Err(detail));
            }
        } else {
            self.skip(run_id, StageName::Validate).await?;
        }

        let trained = self.stage(run_id, StageName::Train, self.train(estimator, &dataset)).await?;
        let (state, test) = match trained {
            Ok(trained) => trained,
            Err(detail) => return Ok(Err(detail)),
        };

        let evaluated = self
            .stage(run_id, StageName::Evaluate, async {
                let metrics = estimator.evaluate(&state, &test)?;
                metrics.check()?;
                Ok(metrics)
            })
            .await?;
        let metrics = match evaluated {
            Ok(metrics) => metrics,
            Err(detail) => return Ok(Err(detail)),
        };

        let trained = TrainedModel {
            model_type: estimator.model_type(),
            hyperparameters: estimator.hyperparameters(),
            state,
            metrics,
        };
        let persisted = self
            .stage(run_id, StageName::Persist, async {
                let metadata = ArtifactMetadata {
                    dataset_type: dataset_kind.to_string(),
                    model_type: trained.model_type.to_string(),
                    dataset_id: compute_dataset_id(&dataset),
                    hyperparameters: trained.hyperparameters.clone(),
                    metrics: trained.metrics.to_map(),
                    feature_names: (0..dataset.n_features())
                        .map(|i| dataset.column_name(i))
                        .collect(),
                    class_names: dataset.class_names.clone(),
                };
                store.persist(run_id, &trained.state, metadata)
            })
            .await?;

        Ok(persisted.map(|reference| RunPayload {
            metrics: Some(trained.metrics.to_map()),
            artifact_reference: Some(reference),
            error: None,
        }))
    }

    /// Stratified split, then fit on a blocking worker. A panic in the
    /// estimator becomes a training failure.
    async fn train(
        &self,
        estimator: &Estimator,
        dataset: &Dataset,
    ) -> TrainingResult<(TrainedState, Dataset)> {
        let (train, test) =
            dataset.stratified_split(self.settings.test_fraction, self.settings.split_seed)?;
        debug!(train_rows = train.n_rows(), test_rows = test.n_rows(), "Split dataset");

        let estimator = estimator.clone();
        let state = tokio::task::spawn_blocking(move || estimator.fit(&train))
            .await
            .map_err(|e| TrainingError::Training(format!("estimator fit aborted: {e}")))??;
        Ok((state, test))
    }

    async fn stage<T>(
        &self,
        run_id: &RunId,
        stage: StageName,
        work: impl Future<Output = TrainingResult<T>>,
    ) -> StageResult<T> {
        self.progress.on_event(ProgressEvent::StageStarted { run_id: run_id.clone(), stage });
        debug!(run_id = %run_id, stage = %stage, "Stage started");

        let started_at = Utc::now();
        let clock = Instant::now();
        let outcome = work.await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        let (record, result) = match outcome {
            Ok(value) => (StageRecord::ok(stage, started_at, duration_ms), Ok(value)),
            Err(err) if err.is_defect() => return Err(err),
            Err(err) => {
                warn!(
                    run_id = %run_id,
                    stage = %stage,
                    kind = err.kind(),
                    error = %err,
                    "Stage failed"
                );
                let detail = ErrorDetail::from_error(stage, &err);
                (StageRecord::failed(stage, started_at, duration_ms, detail.clone()), Err(detail))
            }
        };

        let outcome = record.outcome;
        self.tracker.record_stage(run_id, record).await?;
        self.progress.on_event(ProgressEvent::StageFinished {
            run_id: run_id.clone(),
            stage,
            outcome,
            duration_ms,
        });
        Ok(result)
    }

    async fn skip(&self, run_id: &RunId, stage: StageName) -> TrainingResult<()> {
        debug!(run_id = %run_id, stage = %stage, "Stage skipped");
        self.tracker.record_stage(run_id, StageRecord::skipped(stage)).await?;
        self.progress.on_event(ProgressEvent::StageFinished {
            run_id: run_id.clone(),
            stage,
            outcome: StageOutcome::Skipped,
            duration_ms: 0,
        });
        Ok(())
    }
}
