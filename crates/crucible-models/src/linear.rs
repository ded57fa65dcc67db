//! Linear classifiers over standardized features.

use crate::boosting::softmax;
use crate::hyperparams::{LogisticRegressionParams, SvmParams};
use crate::scaler::StandardScaler;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Per-class weight rows and intercepts applied after scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub scaler: StandardScaler,
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl LinearModel {
    fn zeros(scaler: StandardScaler, n_classes: usize, n_features: usize) -> Self {
        Self { scaler, weights: vec![vec![0.0; n_features]; n_classes], bias: vec![0.0; n_classes] }
    }

    fn margins_scaled(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| w.iter().zip(x).map(|(wi, xi)| wi * xi).sum::<f64>() + b)
            .collect()
    }

    /// Raw per-class decision values for an unscaled row.
    pub fn decision_function(&self, row: &[f64]) -> Vec<f64> {
        self.margins_scaled(&self.scaler.transform_row(row))
    }

    pub(crate) fn is_well_formed(&self, n_features: usize, n_classes: usize) -> bool {
        self.scaler.is_finite()
            && self.scaler.mean.len() == n_features
            && self.weights.len() == n_classes
            && self.bias.len() == n_classes
            && self.weights.iter().all(|w| w.len() == n_features && w.iter().all(|v| v.is_finite()))
            && self.bias.iter().all(|v| v.is_finite())
    }
}

/// Multinomial logistic regression fitted by full-batch gradient descent
/// with an L2 penalty of `1 / (c * n)`.
pub(crate) fn fit_logistic(
    rows: &[Vec<f64>],
    labels: &[usize],
    n_classes: usize,
    params: &LogisticRegressionParams,
) -> LinearModel {
    let scaler = StandardScaler::fit(rows);
    let x = scaler.transform(rows);
    let n = x.len() as f64;
    let n_features = scaler.mean.len();
    let lambda = 1.0 / (params.c * n);
    let mut model = LinearModel::zeros(scaler, n_classes, n_features);

    for _ in 0..params.max_iter {
        let mut grad_w = vec![vec![0.0; n_features]; n_classes];
        let mut grad_b = vec![0.0; n_classes];

        for (xi, &yi) in x.iter().zip(labels) {
            let proba = softmax(&model.margins_scaled(xi));
            for (k, p) in proba.iter().enumerate() {
                let err = p - if k == yi { 1.0 } else { 0.0 };
                for (g, v) in grad_w[k].iter_mut().zip(xi) {
                    *g += err * v;
                }
                grad_b[k] += err;
            }
        }

        for k in 0..n_classes {
            for (w, g) in model.weights[k].iter_mut().zip(&grad_w[k]) {
                *w -= params.learning_rate * (g / n + lambda * *w);
            }
            model.bias[k] -= params.learning_rate * grad_b[k] / n;
        }
    }

    model
}

/// One-vs-rest linear SVM: hinge loss, SGD over shuffled epochs, L2 penalty
/// of `1 / (c * n)`.
pub(crate) fn fit_svm(
    rows: &[Vec<f64>],
    labels: &[usize],
    n_classes: usize,
    params: &SvmParams,
) -> LinearModel {
    let scaler = StandardScaler::fit(rows);
    let x = scaler.transform(rows);
    let n_features = scaler.mean.len();
    let lambda = 1.0 / (params.c * x.len() as f64);
    let mut model = LinearModel::zeros(scaler, n_classes, n_features);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut order: Vec<usize> = (0..x.len()).collect();

    for class in 0..n_classes {
        let w = &mut model.weights[class];
        let mut b = 0.0;
        for _ in 0..params.max_iter {
            order.shuffle(&mut rng);
            for &i in &order {
                let y = if labels[i] == class { 1.0 } else { -1.0 };
                let margin = y * (w.iter().zip(&x[i]).map(|(wi, xi)| wi * xi).sum::<f64>() + b);
                for (wj, xj) in w.iter_mut().zip(&x[i]) {
                    let hinge = if margin < 1.0 { y * xj } else { 0.0 };
                    *wj -= params.learning_rate * (lambda * *wj - hinge);
                }
                if margin < 1.0 {
                    b += params.learning_rate * y;
                }
            }
        }
        model.bias[class] = b;
    }

    model
}
