use crate::hyperparams::RandomForestParams;
use crate::tree::{grow, DecisionTree, Gini, TreeParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub trees: Vec<DecisionTree>,
}

impl RandomForestModel {
    /// Bootstrap-aggregated gini trees, each split drawing from √features.
    pub(crate) fn fit(
        rows: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: &RandomForestParams,
    ) -> Self {
        let n = rows.len();
        let n_features = rows.first().map_or(0, Vec::len);
        let max_features = ((n_features as f64).sqrt().round() as usize).max(1);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            max_features: Some(max_features),
        };
        let criterion = Gini { labels, n_classes };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                grow(rows, &mut sample, &criterion, tree_params, &mut rng)
            })
            .collect();

        Self { trees }
    }

    /// Mean of the per-tree leaf class distributions.
    pub fn predict_proba(&self, row: &[f64], n_classes: usize) -> Vec<f64> {
        let mut proba = vec![0.0; n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict(row)) {
                *p += v;
            }
        }
        let count = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= count);
        proba
    }

    pub(crate) fn is_well_formed(&self, n_features: usize, n_classes: usize) -> bool {
        !self.trees.is_empty() && self.trees.iter().all(|t| t.is_well_formed(n_features, n_classes))
    }
}
