//! Classification metrics computed on a held-out split.

use crucible_training::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Undefined when the evaluation split lacks a positive or negative class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc_auc: Option<f64>,
}

impl EvaluationMetrics {
    /// Compute metrics. Binary problems score class 1 as positive;
    /// multiclass problems use macro averages and one-vs-rest AUC.
    ///
    /// `scores[i][k]` ranks row `i` for class `k` (probability or margin).
    #[must_use]
    pub fn compute(
        y_true: &[usize],
        y_pred: &[usize],
        scores: &[Vec<f64>],
        n_classes: usize,
    ) -> Self {
        let n = y_true.len();
        let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
        let accuracy = if n == 0 { f64::NAN } else { correct as f64 / n as f64 };

        let per_class: Vec<(f64, f64, f64)> =
            (0..n_classes).map(|k| precision_recall_f1(y_true, y_pred, k)).collect();

        let (precision, recall, f1_score, roc_auc) = if n_classes == 2 {
            let (p, r, f) = per_class[1];
            (p, r, f, binary_auc(y_true, scores, 1))
        } else {
            let m = n_classes.max(1) as f64;
            let aucs: Vec<f64> =
                (0..n_classes).filter_map(|k| binary_auc(y_true, scores, k)).collect();
            let auc = (!aucs.is_empty()).then(|| aucs.iter().sum::<f64>() / aucs.len() as f64);
            (
                per_class.iter().map(|c| c.0).sum::<f64>() / m,
                per_class.iter().map(|c| c.1).sum::<f64>() / m,
                per_class.iter().map(|c| c.2).sum::<f64>() / m,
                auc,
            )
        };

        Self { accuracy, precision, recall, f1_score, roc_auc }
    }

    /// Reject NaN/infinite values and an accuracy outside `[0, 1]`.
    pub fn check(&self) -> TrainingResult<()> {
        for (name, value) in self.to_map() {
            if !value.is_finite() {
                return Err(TrainingError::Training(format!(
                    "metric {name} is not finite ({value})"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(TrainingError::Training(format!(
                "accuracy {} outside [0, 1]",
                self.accuracy
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1_score".to_string(), self.f1_score),
        ]);
        if let Some(auc) = self.roc_auc {
            map.insert("roc_auc".to_string(), auc);
        }
        map
    }
}

/// Zero where a denominator is zero.
fn precision_recall_f1(y_true: &[usize], y_pred: &[usize], class: usize) -> (f64, f64, f64) {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == class, p == class) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    (precision, recall, f1)
}

/// Mann-Whitney AUC of `scores[..][class]` for `y == class`, with average
/// ranks for ties.
fn binary_auc(y_true: &[usize], scores: &[Vec<f64>], class: usize) -> Option<f64> {
    let mut ranked: Vec<(f64, bool)> = y_true
        .iter()
        .zip(scores)
        .map(|(&t, s)| (s.get(class).copied().unwrap_or(f64::NAN), t == class))
        .collect();
    let n_pos = ranked.iter().filter(|(_, pos)| *pos).count();
    let n_neg = ranked.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || ranked.iter().any(|(s, _)| !s.is_finite()) {
        return None;
    }

    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < ranked.len() {
        let mut end = start;
        while end + 1 < ranked.len() && ranked[end + 1].0 == ranked[start].0 {
            end += 1;
        }
        // ranks are 1-based
        let avg_rank = (start + end) as f64 / 2.0 + 1.0;
        rank_sum += avg_rank * ranked[start..=end].iter().filter(|(_, pos)| *pos).count() as f64;
        start = end + 1;
    }

    let n_pos_f = n_pos as f64;
    Some((rank_sum - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_binary() {
        let y = [0, 0, 1, 1];
        let scores = vec![vec![0.9, 0.1], vec![0.8, 0.2], vec![0.3, 0.7], vec![0.1, 0.9]];
        let m = EvaluationMetrics::compute(&y, &y, &scores, 2);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.roc_auc, Some(1.0));
        m.check().unwrap();
    }

    #[test]
    fn test_binary_positive_class_counts() {
        let y_true = [1, 1, 1, 0];
        let y_pred = [1, 0, 0, 1];
        let scores = vec![vec![0.0, 1.0]; 4];
        let m = EvaluationMetrics::compute(&y_true, &y_pred, &scores, 2);
        assert!((m.accuracy - 0.25).abs() < 1e-12);
        assert!((m.precision - 0.5).abs() < 1e-12);
        assert!((m.recall - 1.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 0.4).abs() < 1e-12);
        // all scores tied
        assert_eq!(m.roc_auc, Some(0.5));
    }

    #[test]
    fn test_auc_undefined_for_single_class() {
        let y = [1, 1];
        let m = EvaluationMetrics::compute(&y, &y, &[vec![0.2, 0.8], vec![0.4, 0.6]], 2);
        assert!(m.roc_auc.is_none());
        assert!(!m.to_map().contains_key("roc_auc"));
    }

    #[test]
    fn test_multiclass_macro_average() {
        let y_true = [0, 1, 2, 2];
        let y_pred = [0, 1, 2, 1];
        let scores = vec![
            vec![0.8, 0.1, 0.1],
            vec![0.1, 0.8, 0.1],
            vec![0.1, 0.1, 0.8],
            vec![0.1, 0.6, 0.3],
        ];
        let m = EvaluationMetrics::compute(&y_true, &y_pred, &scores, 3);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        // per-class precision 1, 0.5, 1
        assert!((m.precision - 2.5 / 3.0).abs() < 1e-12);
        // per-class recall 1, 1, 0.5
        assert!((m.recall - 2.5 / 3.0).abs() < 1e-12);
        assert!(m.roc_auc.unwrap() > 0.8);
    }

    #[test]
    fn test_check_rejects_nan() {
        let m = EvaluationMetrics {
            accuracy: f64::NAN,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            roc_auc: None,
        };
        assert!(matches!(m.check(), Err(TrainingError::Training(_))));
    }
}
