use crate::boosting::GradientBoostingModel;
use crate::factory::ModelType;
use crate::forest::RandomForestModel;
use crate::hyperparams::{
    GradientBoostingParams, Hyperparameters, LogisticRegressionParams, RandomForestParams,
    SvmParams,
};
use crate::linear::{fit_logistic, fit_svm};
use crate::metrics::EvaluationMetrics;
use crate::state::{FittedModel, TrainedState};
use crucible_training::{Dataset, TrainingError, TrainingResult};
use std::time::Instant;
use tracing::debug;

/// An untrained estimator with validated hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimator {
    RandomForest(RandomForestParams),
    GradientBoosting(GradientBoostingParams),
    LogisticRegression(LogisticRegressionParams),
    Svm(SvmParams),
}

impl Estimator {
    #[must_use]
    pub fn model_type(&self) -> ModelType {
        match self {
            Self::RandomForest(_) => ModelType::RandomForest,
            Self::GradientBoosting(_) => ModelType::GradientBoosting,
            Self::LogisticRegression(_) => ModelType::LogisticRegression,
            Self::Svm(_) => ModelType::Svm,
        }
    }

    /// Resolved hyperparameters, defaults included.
    #[must_use]
    pub fn hyperparameters(&self) -> Hyperparameters {
        match self {
            Self::RandomForest(p) => p.to_map(),
            Self::GradientBoosting(p) => p.to_map(),
            Self::LogisticRegression(p) => p.to_map(),
            Self::Svm(p) => p.to_map(),
        }
    }

    /// Fit on every row of `dataset`. Synchronous and CPU bound.
    pub fn fit(&self, dataset: &Dataset) -> TrainingResult<TrainedState> {
        dataset.check_shape()?;
        if dataset.n_rows() == 0 || dataset.n_features() == 0 {
            return Err(TrainingError::Training("cannot fit on an empty dataset".to_string()));
        }
        let present = dataset.class_counts().iter().filter(|c| **c > 0).count();
        if present < 2 {
            return Err(TrainingError::Training(format!(
                "need at least two classes to fit, found {present}"
            )));
        }

        let n_classes = dataset.n_classes();
        let rows = &dataset.features;
        let labels = &dataset.labels;
        let started = Instant::now();

        let model = match self {
            Self::RandomForest(p) => {
                FittedModel::RandomForest(RandomForestModel::fit(rows, labels, n_classes, p))
            }
            Self::GradientBoosting(p) => FittedModel::GradientBoosting(GradientBoostingModel::fit(
                rows, labels, n_classes, p,
            )),
            Self::LogisticRegression(p) => {
                FittedModel::LogisticRegression(fit_logistic(rows, labels, n_classes, p))
            }
            Self::Svm(p) => FittedModel::Svm(fit_svm(rows, labels, n_classes, p)),
        };

        let state = TrainedState {
            model_type: self.model_type(),
            n_features: dataset.n_features(),
            n_classes,
            model,
        };
        state.check()?;

        debug!(
            model_type = %self.model_type(),
            rows = dataset.n_rows(),
            classes = n_classes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fitted estimator"
        );
        Ok(state)
    }

    pub fn evaluate(
        &self,
        state: &TrainedState,
        dataset: &Dataset,
    ) -> TrainingResult<EvaluationMetrics> {
        if state.model_type != self.model_type() {
            return Err(TrainingError::Training(format!(
                "cannot evaluate a {} state with a {} estimator",
                state.model_type,
                self.model_type()
            )));
        }
        state.evaluate(dataset)
    }
}
