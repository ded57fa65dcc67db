//! Every estimator family against every built-in dataset on a held-out split.

use crucible_models::{Hyperparameters, ModelFactory, ModelType};
use crucible_training::{BuiltinDatasets, DatasetKind};

fn held_out_accuracy(kind: DatasetKind, model_type: ModelType) -> f64 {
    let dataset = BuiltinDatasets::default().load(kind).unwrap();
    let (train, test) = dataset.stratified_split(0.2, 42).unwrap();

    let estimator = ModelFactory::create(model_type, &Hyperparameters::new()).unwrap();
    let state = estimator.fit(&train).unwrap();
    let metrics = estimator.evaluate(&state, &test).unwrap();
    metrics.check().unwrap();
    metrics.accuracy
}

#[test]
fn test_iris_all_families() {
    for model_type in ModelType::ALL {
        let accuracy = held_out_accuracy(DatasetKind::Iris, model_type);
        assert!(accuracy >= 0.7, "iris/{model_type}: accuracy {accuracy}");
    }
}

#[test]
fn test_wine_all_families() {
    for model_type in ModelType::ALL {
        let accuracy = held_out_accuracy(DatasetKind::Wine, model_type);
        assert!(accuracy >= 0.8, "wine/{model_type}: accuracy {accuracy}");
    }
}

#[test]
fn test_classification_all_families() {
    for model_type in ModelType::ALL {
        let accuracy = held_out_accuracy(DatasetKind::Classification, model_type);
        assert!(accuracy >= 0.7, "classification/{model_type}: accuracy {accuracy}");
    }
}

#[test]
fn test_logistic_regression_on_iris_reports_all_metrics() {
    let dataset = BuiltinDatasets::default().load(DatasetKind::Iris).unwrap();
    let (train, test) = dataset.stratified_split(0.2, 42).unwrap();
    let estimator =
        ModelFactory::create(ModelType::LogisticRegression, &Hyperparameters::new()).unwrap();
    let state = estimator.fit(&train).unwrap();

    let metrics = estimator.evaluate(&state, &test).unwrap().to_map();
    for key in ["accuracy", "precision", "recall", "f1_score", "roc_auc"] {
        let value = metrics[key];
        assert!((0.0..=1.0).contains(&value), "{key} = {value}");
    }
    assert!((state.score(&test).unwrap() - metrics["accuracy"]).abs() < 1e-12);
}
