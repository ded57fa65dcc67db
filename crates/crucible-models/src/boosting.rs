use crate::hyperparams::GradientBoostingParams;
use crate::tree::{grow, DecisionTree, Newton, TreeParams};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// L2 penalty on leaf weights.
const LEAF_L2: f64 = 1.0;
const MIN_HESSIAN: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingModel {
    /// Log class priors the boosting starts from.
    pub init: Vec<f64>,
    pub learning_rate: f64,
    /// One tree per class per round.
    pub rounds: Vec<Vec<DecisionTree>>,
}

pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.iter().map(|e| e / sum).collect()
}

impl GradientBoostingModel {
    pub(crate) fn fit(
        rows: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: &GradientBoostingParams,
    ) -> Self {
        let n = rows.len();
        let mut counts = vec![0.0; n_classes];
        for &label in labels {
            counts[label] += 1.0;
        }
        let init: Vec<f64> = counts.iter().map(|c| (c / n as f64).max(1e-12).ln()).collect();

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2,
            max_features: None,
        };
        let sample_size = ((n as f64 * params.subsample).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut raw: Vec<Vec<f64>> = vec![init.clone(); n];
        let mut rounds = Vec::with_capacity(params.n_estimators);
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];

        for round in 0..params.n_estimators {
            let proba: Vec<Vec<f64>> = raw.iter().map(|r| softmax(r)).collect();
            let sample: Vec<usize> = if sample_size < n {
                index::sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };

            let mut trees = Vec::with_capacity(n_classes);
            for class in 0..n_classes {
                for i in 0..n {
                    let p = proba[i][class];
                    let y = if labels[i] == class { 1.0 } else { 0.0 };
                    grad[i] = p - y;
                    hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
                }
                let criterion = Newton { grad: &grad, hess: &hess, l2: LEAF_L2 };
                let mut indices = sample.clone();
                let tree = grow(rows, &mut indices, &criterion, tree_params, &mut rng);

                for (i, row) in rows.iter().enumerate() {
                    let step = tree.predict(row).first().copied().unwrap_or(0.0);
                    raw[i][class] += params.learning_rate * step;
                }
                trees.push(tree);
            }
            rounds.push(trees);
            trace!(round, "Boosting round complete");
        }

        Self { init, learning_rate: params.learning_rate, rounds }
    }

    pub fn raw_scores(&self, row: &[f64]) -> Vec<f64> {
        let mut scores = self.init.clone();
        for trees in &self.rounds {
            for (score, tree) in scores.iter_mut().zip(trees) {
                *score += self.learning_rate * tree.predict(row).first().copied().unwrap_or(0.0);
            }
        }
        scores
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        softmax(&self.raw_scores(row))
    }

    pub(crate) fn is_well_formed(&self, n_features: usize, n_classes: usize) -> bool {
        self.init.len() == n_classes
            && self.init.iter().all(|v| v.is_finite())
            && self.learning_rate.is_finite()
            && self.rounds.iter().all(|trees| {
                trees.len() == n_classes && trees.iter().all(|t| t.is_well_formed(n_features, 1))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 1000.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[2] > 0.99);
    }

    #[test]
    fn test_boosting_learns_threshold() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i)]).collect();
        let labels: Vec<usize> = (0..40).map(|i| usize::from(i >= 20)).collect();
        let params = GradientBoostingParams { n_estimators: 20, ..Default::default() };

        let model = GradientBoostingModel::fit(&rows, &labels, 2, &params);
        assert!(model.is_well_formed(1, 2));
        assert!(model.predict_proba(&[3.0])[0] > 0.5);
        assert!(model.predict_proba(&[35.0])[1] > 0.5);
    }
}
