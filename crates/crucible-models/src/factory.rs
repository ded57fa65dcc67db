//! Model factory for creating untrained estimators from configuration.

use crate::estimator::Estimator;
use crate::hyperparams::{
    GradientBoostingParams, Hyperparameters, LogisticRegressionParams, RandomForestParams,
    SvmParams,
};
use crucible_training::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, error};

/// Supported estimator families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Bagged CART classifiers.
    RandomForest,
    /// Softmax gradient boosting over regression trees.
    GradientBoosting,
    /// Multinomial logistic regression.
    LogisticRegression,
    /// One-vs-rest linear SVM.
    Svm,
}

impl ModelType {
    pub const ALL: [Self; 4] =
        [Self::RandomForest, Self::GradientBoosting, Self::LogisticRegression, Self::Svm];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::GradientBoosting => "gradient_boosting",
            Self::LogisticRegression => "logistic_regression",
            Self::Svm => "svm",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|m| m.as_str() == s.trim()).ok_or_else(|| {
            let expected: Vec<&str> = Self::ALL.iter().map(Self::as_str).collect();
            TrainingError::Configuration(format!(
                "unsupported model_type '{s}' (expected one of: {})",
                expected.join(", ")
            ))
        })
    }
}

/// Factory for creating estimator instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates an untrained estimator, validating `hyperparameters` against the model family.
    pub fn create(
        model_type: ModelType,
        hyperparameters: &Hyperparameters,
    ) -> TrainingResult<Estimator> {
        debug!(model_type = %model_type, overrides = hyperparameters.len(), "Creating estimator");

        let estimator = match model_type {
            ModelType::RandomForest => {
                Estimator::RandomForest(RandomForestParams::from_map(hyperparameters)?)
            }
            ModelType::GradientBoosting => {
                Estimator::GradientBoosting(GradientBoostingParams::from_map(hyperparameters)?)
            }
            ModelType::LogisticRegression => {
                Estimator::LogisticRegression(LogisticRegressionParams::from_map(hyperparameters)?)
            }
            ModelType::Svm => Estimator::Svm(SvmParams::from_map(hyperparameters)?),
        };
        Ok(estimator)
    }

    /// Creates an estimator from a model type string.
    pub fn create_from_str(
        model_type_str: &str,
        hyperparameters: Option<&Hyperparameters>,
    ) -> TrainingResult<Estimator> {
        let model_type = ModelType::from_str(model_type_str).inspect_err(|_| {
            error!(model_type = %model_type_str, "Unrecognized model type");
        })?;
        let empty = Hyperparameters::new();
        Self::create(model_type, hyperparameters.unwrap_or(&empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_from_str() {
        assert_eq!(ModelType::from_str("random_forest").unwrap(), ModelType::RandomForest);
        assert_eq!(ModelType::from_str("gradient_boosting").unwrap(), ModelType::GradientBoosting);
        assert_eq!(
            ModelType::from_str("logistic_regression").unwrap(),
            ModelType::LogisticRegression
        );
        assert_eq!(ModelType::from_str("svm").unwrap(), ModelType::Svm);
        assert!(ModelType::from_str("unsupported_model").is_err());
        assert!(ModelType::from_str("SVM").is_err());
    }

    #[test]
    fn test_create_every_family() {
        for model_type in ModelType::ALL {
            let estimator = ModelFactory::create(model_type, &Hyperparameters::new()).unwrap();
            assert_eq!(estimator.model_type(), model_type);
        }
    }

    #[test]
    fn test_create_from_str_unsupported() {
        let err = ModelFactory::create_from_str("unsupported_model", None).unwrap_err();
        assert!(matches!(err, TrainingError::Configuration(_)));
        assert!(err
            .to_string()
            .contains("random_forest, gradient_boosting, logistic_regression, svm"));
    }

    #[test]
    fn test_create_rejects_foreign_hyperparameter() {
        let params = Hyperparameters::from([("max_depth".to_string(), 4.0)]);
        assert!(ModelFactory::create(ModelType::Svm, &params).is_err());
        assert!(ModelFactory::create(ModelType::RandomForest, &params).is_ok());
    }
}
