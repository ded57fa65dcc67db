//! Hyperparameter maps and their typed, validated forms.

use crate::factory::ModelType;
use crucible_training::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name → value overrides supplied by the caller.
pub type Hyperparameters = BTreeMap<String, f64>;

/// Consumes a [`Hyperparameters`] map field by field, rejecting unknown
/// names and out-of-range values.
struct ParamReader<'a> {
    model: ModelType,
    values: &'a Hyperparameters,
    known: BTreeSet<&'static str>,
}

impl<'a> ParamReader<'a> {
    fn new(model: ModelType, values: &'a Hyperparameters) -> Self {
        Self { model, values, known: BTreeSet::new() }
    }

    fn invalid(&self, name: &str, value: f64, expected: &str) -> TrainingError {
        TrainingError::Configuration(format!(
            "invalid value {value} for {} hyperparameter '{name}': expected {expected}",
            self.model
        ))
    }

    fn raw(&mut self, name: &'static str) -> Option<f64> {
        self.known.insert(name);
        self.values.get(name).copied()
    }

    fn count(&mut self, name: &'static str, default: usize, min: usize) -> TrainingResult<usize> {
        let Some(value) = self.raw(name) else {
            return Ok(default);
        };
        if !value.is_finite()
            || value.fract() != 0.0
            || value < min as f64
            || value > u32::MAX as f64
        {
            return Err(self.invalid(name, value, &format!("an integer >= {min}")));
        }
        Ok(value as usize)
    }

    fn seed(&mut self, name: &'static str, default: u64) -> TrainingResult<u64> {
        let Some(value) = self.raw(name) else {
            return Ok(default);
        };
        if !value.is_finite() || value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
            return Err(self.invalid(name, value, "a non-negative integer"));
        }
        Ok(value as u64)
    }

    fn positive(&mut self, name: &'static str, default: f64) -> TrainingResult<f64> {
        let Some(value) = self.raw(name) else {
            return Ok(default);
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(self.invalid(name, value, "a finite number > 0"));
        }
        Ok(value)
    }

    fn fraction(&mut self, name: &'static str, default: f64) -> TrainingResult<f64> {
        let Some(value) = self.raw(name) else {
            return Ok(default);
        };
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            return Err(self.invalid(name, value, "a number in (0, 1]"));
        }
        Ok(value)
    }

    fn finish(self) -> TrainingResult<()> {
        if let Some(unknown) = self.values.keys().find(|k| !self.known.contains(k.as_str())) {
            let expected: Vec<&str> = self.known.iter().copied().collect();
            return Err(TrainingError::Configuration(format!(
                "unknown hyperparameter '{unknown}' for {} (expected one of: {})",
                self.model,
                expected.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self { n_estimators: 100, max_depth: 10, min_samples_split: 2, seed: 42 }
    }
}

impl RandomForestParams {
    pub fn from_map(values: &Hyperparameters) -> TrainingResult<Self> {
        let d = Self::default();
        let mut r = ParamReader::new(ModelType::RandomForest, values);
        let params = Self {
            n_estimators: r.count("n_estimators", d.n_estimators, 1)?,
            max_depth: r.count("max_depth", d.max_depth, 1)?,
            min_samples_split: r.count("min_samples_split", d.min_samples_split, 2)?,
            seed: r.seed("seed", d.seed)?,
        };
        r.finish()?;
        Ok(params)
    }

    #[must_use]
    pub fn to_map(&self) -> Hyperparameters {
        BTreeMap::from([
            ("n_estimators".to_string(), self.n_estimators as f64),
            ("max_depth".to_string(), self.max_depth as f64),
            ("min_samples_split".to_string(), self.min_samples_split as f64),
            ("seed".to_string(), self.seed as f64),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows sampled for each boosting round.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self { n_estimators: 100, learning_rate: 0.1, max_depth: 3, subsample: 1.0, seed: 42 }
    }
}

impl GradientBoostingParams {
    pub fn from_map(values: &Hyperparameters) -> TrainingResult<Self> {
        let d = Self::default();
        let mut r = ParamReader::new(ModelType::GradientBoosting, values);
        let params = Self {
            n_estimators: r.count("n_estimators", d.n_estimators, 1)?,
            learning_rate: r.fraction("learning_rate", d.learning_rate)?,
            max_depth: r.count("max_depth", d.max_depth, 1)?,
            subsample: r.fraction("subsample", d.subsample)?,
            seed: r.seed("seed", d.seed)?,
        };
        r.finish()?;
        Ok(params)
    }

    #[must_use]
    pub fn to_map(&self) -> Hyperparameters {
        BTreeMap::from([
            ("n_estimators".to_string(), self.n_estimators as f64),
            ("learning_rate".to_string(), self.learning_rate),
            ("max_depth".to_string(), self.max_depth as f64),
            ("subsample".to_string(), self.subsample),
            ("seed".to_string(), self.seed as f64),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionParams {
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Inverse L2 regularization strength.
    pub c: f64,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        Self { max_iter: 500, learning_rate: 0.5, c: 1.0 }
    }
}

impl LogisticRegressionParams {
    pub fn from_map(values: &Hyperparameters) -> TrainingResult<Self> {
        let d = Self::default();
        let mut r = ParamReader::new(ModelType::LogisticRegression, values);
        let params = Self {
            max_iter: r.count("max_iter", d.max_iter, 1)?,
            learning_rate: r.positive("learning_rate", d.learning_rate)?,
            c: r.positive("c", d.c)?,
        };
        r.finish()?;
        Ok(params)
    }

    #[must_use]
    pub fn to_map(&self) -> Hyperparameters {
        BTreeMap::from([
            ("max_iter".to_string(), self.max_iter as f64),
            ("learning_rate".to_string(), self.learning_rate),
            ("c".to_string(), self.c),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    /// Passes over the training set.
    pub max_iter: usize,
    pub learning_rate: f64,
    pub c: f64,
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self { max_iter: 200, learning_rate: 0.01, c: 1.0, seed: 42 }
    }
}

impl SvmParams {
    pub fn from_map(values: &Hyperparameters) -> TrainingResult<Self> {
        let d = Self::default();
        let mut r = ParamReader::new(ModelType::Svm, values);
        let params = Self {
            max_iter: r.count("max_iter", d.max_iter, 1)?,
            learning_rate: r.positive("learning_rate", d.learning_rate)?,
            c: r.positive("c", d.c)?,
            seed: r.seed("seed", d.seed)?,
        };
        r.finish()?;
        Ok(params)
    }

    #[must_use]
    pub fn to_map(&self) -> Hyperparameters {
        BTreeMap::from([
            ("max_iter".to_string(), self.max_iter as f64),
            ("learning_rate".to_string(), self.learning_rate),
            ("c".to_string(), self.c),
            ("seed".to_string(), self.seed as f64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f64)]) -> Hyperparameters {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_defaults_from_empty_map() {
        assert_eq!(
            RandomForestParams::from_map(&Hyperparameters::new()).unwrap(),
            RandomForestParams::default()
        );
        assert_eq!(SvmParams::from_map(&Hyperparameters::new()).unwrap(), SvmParams::default());
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = map(&[("n_estimators", 7.0), ("max_depth", 3.0)]);
        let params = RandomForestParams::from_map(&overrides).unwrap();
        assert_eq!(params.n_estimators, 7);
        assert_eq!(params.max_depth, 3);
        assert_eq!(params.min_samples_split, 2);
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = LogisticRegressionParams::from_map(&map(&[("n_estimators", 10.0)])).unwrap_err();
        assert!(matches!(err, TrainingError::Configuration(_)));
        assert!(err.to_string().contains("unknown hyperparameter 'n_estimators'"));
        assert!(err.to_string().contains("c, learning_rate, max_iter"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RandomForestParams::from_map(&map(&[("n_estimators", 2.5)])).is_err());
        assert!(RandomForestParams::from_map(&map(&[("min_samples_split", 1.0)])).is_err());
        assert!(GradientBoostingParams::from_map(&map(&[("learning_rate", 0.0)])).is_err());
        assert!(GradientBoostingParams::from_map(&map(&[("subsample", 1.5)])).is_err());
        assert!(SvmParams::from_map(&map(&[("c", f64::NAN)])).is_err());
        assert!(SvmParams::from_map(&map(&[("seed", -1.0)])).is_err());
    }

    #[test]
    fn test_to_map_round_trips() {
        let params =
            GradientBoostingParams { n_estimators: 5, learning_rate: 0.3, ..Default::default() };
        assert_eq!(GradientBoostingParams::from_map(&params.to_map()).unwrap(), params);
    }
}
