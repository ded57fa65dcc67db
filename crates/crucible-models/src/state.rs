use crate::boosting::GradientBoostingModel;
use crate::factory::ModelType;
use crate::forest::RandomForestModel;
use crate::hyperparams::Hyperparameters;
use crate::linear::LinearModel;
use crate::metrics::EvaluationMetrics;
use crucible_training::{Dataset, TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};

/// Fitted parameters of one estimator family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    RandomForest(RandomForestModel),
    GradientBoosting(GradientBoostingModel),
    LogisticRegression(LinearModel),
    Svm(LinearModel),
}

/// Everything needed to predict with a trained estimator. This is what the
/// artifact store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedState {
    pub model_type: ModelType,
    pub n_features: usize,
    pub n_classes: usize,
    pub model: FittedModel,
}

impl TrainedState {
    /// Per-class ranking scores: probabilities, or margins for the SVM.
    #[must_use]
    pub fn decision_scores(&self, row: &[f64]) -> Vec<f64> {
        match &self.model {
            FittedModel::RandomForest(m) => m.predict_proba(row, self.n_classes),
            FittedModel::GradientBoosting(m) => m.predict_proba(row),
            FittedModel::LogisticRegression(m) => {
                crate::boosting::softmax(&m.decision_function(row))
            }
            FittedModel::Svm(m) => m.decision_function(row),
        }
    }

    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> usize {
        argmax(&self.decision_scores(row))
    }

    #[must_use]
    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<usize> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }

    /// Mean accuracy on `dataset`.
    pub fn score(&self, dataset: &Dataset) -> TrainingResult<f64> {
        Ok(self.evaluate(dataset)?.accuracy)
    }

    pub fn evaluate(&self, dataset: &Dataset) -> TrainingResult<EvaluationMetrics> {
        if dataset.n_rows() == 0 {
            return Err(TrainingError::Training("cannot evaluate on an empty dataset".to_string()));
        }
        if dataset.n_features() != self.n_features {
            return Err(TrainingError::Training(format!(
                "dataset has {} features, model was fitted on {}",
                dataset.n_features(),
                self.n_features
            )));
        }

        let scores: Vec<Vec<f64>> =
            dataset.features.iter().map(|r| self.decision_scores(r)).collect();
        let predictions: Vec<usize> = scores.iter().map(|s| argmax(s)).collect();
        Ok(EvaluationMetrics::compute(&dataset.labels, &predictions, &scores, self.n_classes))
    }

    /// Shape and finiteness of every fitted parameter.
    pub fn check(&self) -> TrainingResult<()> {
        let ok = match &self.model {
            FittedModel::RandomForest(m) => m.is_well_formed(self.n_features, self.n_classes),
            FittedModel::GradientBoosting(m) => m.is_well_formed(self.n_features, self.n_classes),
            FittedModel::LogisticRegression(m) | FittedModel::Svm(m) => {
                m.is_well_formed(self.n_features, self.n_classes)
            }
        };
        if ok {
            Ok(())
        } else {
            Err(TrainingError::Training(format!(
                "{} produced non-finite or malformed parameters",
                self.model_type
            )))
        }
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(&a.0)))
        .map_or(0, |(k, _)| k)
}

/// A fitted estimator with its resolved hyperparameters and held-out metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model_type: ModelType,
    pub hyperparameters: Hyperparameters,
    pub state: TrainedState,
    pub metrics: EvaluationMetrics,
}
