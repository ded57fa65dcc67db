//! Estimators for Crucible.
//!
//! This crate provides the closed set of model families the pipeline can
//! train, implemented natively over `f64` rows.
//!
//! # Supported Families
//!
//! - **random_forest**: bagged gini trees
//! - **gradient_boosting**: softmax boosting over regression trees
//! - **logistic_regression**: multinomial, L2-regularized
//! - **svm**: one-vs-rest linear hinge loss

pub mod boosting;
pub mod estimator;
pub mod factory;
pub mod forest;
pub mod hyperparams;
pub mod linear;
pub mod metrics;
pub mod scaler;
pub mod state;
pub mod tree;

pub use estimator::Estimator;
pub use factory::{ModelFactory, ModelType};
pub use hyperparams::{
    GradientBoostingParams, Hyperparameters, LogisticRegressionParams, RandomForestParams,
    SvmParams,
};
pub use metrics::EvaluationMetrics;
pub use state::{FittedModel, TrainedModel, TrainedState};
