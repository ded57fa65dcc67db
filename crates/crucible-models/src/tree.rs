//! Binary decision trees stored as a flat node arena.
//!
//! Node 0 is the root. Children are always pushed after their parent, so
//! every split points strictly forward and a well-formed tree has no cycles.

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Rows with `row[feature] <= threshold` go left.
    Split { feature: usize, threshold: f64, left: usize, right: usize },
    Leaf { value: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    /// Leaf value reached by `row`. Empty for a malformed tree.
    #[must_use]
    pub fn predict(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        while let Some(node) = self.nodes.get(idx) {
            match node {
                Node::Split { feature, threshold, left, right } => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    let next = if value <= *threshold { *left } else { *right };
                    if next <= idx {
                        break;
                    }
                    idx = next;
                }
                Node::Leaf { value } => return value,
            }
        }
        &[]
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) if *left > idx && *right > idx => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Structure and numeric sanity: forward links, finite thresholds, and
    /// leaves of the given width with finite values.
    #[must_use]
    pub fn is_well_formed(&self, n_features: usize, leaf_width: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(idx, node)| match node {
                Node::Split { feature, threshold, left, right } => {
                    *feature < n_features
                        && threshold.is_finite()
                        && *left > idx
                        && *right > idx
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
                Node::Leaf { value } => {
                    value.len() == leaf_width && value.iter().all(|v| v.is_finite())
                }
            })
    }
}

/// Split quality measure. A node's statistics are a fixed-width vector
/// accumulated over its samples; the best split maximizes the summed child
/// scores.
pub(crate) trait Criterion {
    fn width(&self) -> usize;
    fn accumulate(&self, stats: &mut [f64], sample: usize, sign: f64);
    fn score(&self, stats: &[f64]) -> f64;
    fn leaf_value(&self, stats: &[f64]) -> Vec<f64>;
    fn is_pure(&self, stats: &[f64]) -> bool;
}

/// Gini impurity over class counts; leaves hold class probabilities.
pub(crate) struct Gini<'a> {
    pub labels: &'a [usize],
    pub n_classes: usize,
}

impl Criterion for Gini<'_> {
    fn width(&self) -> usize {
        self.n_classes
    }

    fn accumulate(&self, stats: &mut [f64], sample: usize, sign: f64) {
        stats[self.labels[sample]] += sign;
    }

    // n * (1 - gini) = sum(c^2) / n
    fn score(&self, stats: &[f64]) -> f64 {
        let n: f64 = stats.iter().sum();
        if n <= 0.0 {
            return 0.0;
        }
        stats.iter().map(|c| c * c).sum::<f64>() / n
    }

    fn leaf_value(&self, stats: &[f64]) -> Vec<f64> {
        let n: f64 = stats.iter().sum();
        if n <= 0.0 {
            return vec![1.0 / self.n_classes as f64; self.n_classes];
        }
        stats.iter().map(|c| c / n).collect()
    }

    fn is_pure(&self, stats: &[f64]) -> bool {
        stats.iter().filter(|c| **c > 0.0).count() <= 1
    }
}

/// Second-order gradient statistics `[G, H]`; leaves hold the Newton step.
pub(crate) struct Newton<'a> {
    pub grad: &'a [f64],
    pub hess: &'a [f64],
    pub l2: f64,
}

impl Criterion for Newton<'_> {
    fn width(&self) -> usize {
        2
    }

    fn accumulate(&self, stats: &mut [f64], sample: usize, sign: f64) {
        stats[0] += sign * self.grad[sample];
        stats[1] += sign * self.hess[sample];
    }

    fn score(&self, stats: &[f64]) -> f64 {
        stats[0] * stats[0] / (stats[1] + self.l2)
    }

    fn leaf_value(&self, stats: &[f64]) -> Vec<f64> {
        vec![-stats[0] / (stats[1] + self.l2)]
    }

    fn is_pure(&self, _stats: &[f64]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features considered per split; `None` for all of them.
    pub max_features: Option<usize>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

const MIN_GAIN: f64 = 1e-12;

struct TreeBuilder<'a, C: Criterion> {
    rows: &'a [Vec<f64>],
    criterion: &'a C,
    params: TreeParams,
    rng: &'a mut StdRng,
    n_features: usize,
    nodes: Vec<Node>,
}

impl<C: Criterion> TreeBuilder<'_, C> {
    fn stats(&self, indices: &[usize]) -> Vec<f64> {
        let mut stats = vec![0.0; self.criterion.width()];
        for &i in indices {
            self.criterion.accumulate(&mut stats, i, 1.0);
        }
        stats
    }

    fn build(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let stats = self.stats(indices);
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: self.criterion.leaf_value(&stats) });

        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || self.criterion.is_pure(&stats)
        {
            return node_id;
        }

        let Some(split) = self.best_split(indices, &stats) else {
            return node_id;
        };

        let mut mid = 0;
        for k in 0..indices.len() {
            if self.rows[indices[k]][split.feature] <= split.threshold {
                indices.swap(mid, k);
                mid += 1;
            }
        }
        let (left_idx, right_idx) = indices.split_at_mut(mid);
        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[node_id] =
            Node::Split { feature: split.feature, threshold: split.threshold, left, right };
        node_id
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.params.max_features {
            Some(m) if m < self.n_features => {
                index::sample(&mut *self.rng, self.n_features, m).into_vec()
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn best_split(&mut self, indices: &[usize], parent: &[f64]) -> Option<SplitCandidate> {
        let parent_score = self.criterion.score(parent);
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature in self.candidate_features() {
            let rows = self.rows;
            sorted.sort_by(|a, b| rows[*a][feature].total_cmp(&rows[*b][feature]));

            let mut left = vec![0.0; parent.len()];
            let mut right = parent.to_vec();
            for pos in 0..sorted.len() - 1 {
                let sample = sorted[pos];
                self.criterion.accumulate(&mut left, sample, 1.0);
                self.criterion.accumulate(&mut right, sample, -1.0);

                let here = rows[sample][feature];
                let next = rows[sorted[pos + 1]][feature];
                if here >= next {
                    continue;
                }

                let gain =
                    self.criterion.score(&left) + self.criterion.score(&right) - parent_score;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(SplitCandidate { feature, threshold, gain });
                }
            }
        }
        best
    }
}

/// Grow a tree over `indices` (which may repeat, as in a bootstrap sample).
pub(crate) fn grow<C: Criterion>(
    rows: &[Vec<f64>],
    indices: &mut [usize],
    criterion: &C,
    params: TreeParams,
    rng: &mut StdRng,
) -> DecisionTree {
    let n_features = rows.first().map_or(0, Vec::len);
    let mut builder = TreeBuilder { rows, criterion, params, rng, n_features, nodes: Vec::new() };
    if indices.is_empty() {
        let stats = vec![0.0; criterion.width()];
        builder.nodes.push(Node::Leaf { value: criterion.leaf_value(&stats) });
    } else {
        builder.build(indices, 0);
    }
    DecisionTree { nodes: builder.nodes }
}
