//! Data quality checks run before training.
//!
//! Quality problems are reported as [`Issue`]s; only structurally malformed
//! input is an error.

use crate::dataset::{ColumnKind, Dataset};
use crate::error::TrainingResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    /// Column name, `labels`, or `rows`.
    pub field: String,
    pub message: String,
}

impl Issue {
    pub fn new(severity: Severity, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity, field: field.into(), message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// Build a report; any error-severity issue fails it.
    #[must_use]
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let passed = !issues.iter().any(|i| i.severity == Severity::Error);
        Self { passed, issues }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let errors = self.errors().count();
        let warnings = self.warnings().count();
        format!(
            "{errors} error{}, {warnings} warning{}",
            if errors == 1 { "" } else { "s" },
            if warnings == 1 { "" } else { "s" }
        )
    }
}

/// Inspects a dataset without mutating it.
pub trait Validator: Send + Sync {
    fn validate(&self, dataset: &Dataset) -> TrainingResult<ValidationReport>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub min_samples: usize,
    /// Smallest acceptable minority/majority class size ratio before warning.
    pub min_class_ratio: f64,
    pub check_duplicates: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self { min_samples: 10, min_class_ratio: 0.1, check_duplicates: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataValidator {
    rules: ValidationRules,
}

impl DataValidator {
    #[must_use]
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    fn check_rows(&self, dataset: &Dataset, issues: &mut Vec<Issue>) {
        let rows = dataset.n_rows();
        if rows == 0 {
            issues.push(Issue::new(Severity::Error, "rows", "dataset has no rows"));
        } else if rows < self.rules.min_samples {
            issues.push(Issue::new(
                Severity::Error,
                "rows",
                format!("{rows} rows is below the minimum of {}", self.rules.min_samples),
            ));
        }

        if self.rules.check_duplicates && rows > 1 {
            let mut seen = HashSet::with_capacity(rows);
            let duplicates = dataset
                .features
                .iter()
                .zip(&dataset.labels)
                .filter(|(row, label)| {
                    let key: Vec<u64> = row.iter().map(|v| v.to_bits()).collect();
                    !seen.insert((key, **label))
                })
                .count();
            if duplicates > 0 {
                issues.push(Issue::new(
                    Severity::Warning,
                    "rows",
                    format!("{duplicates} duplicate row(s)"),
                ));
            }
        }
    }

    fn check_columns(dataset: &Dataset, issues: &mut Vec<Issue>) {
        for col in 0..dataset.n_features() {
            let name = dataset.column_name(col);
            let values = dataset.features.iter().map(|row| row[col]);

            let non_finite = values.clone().filter(|v| !v.is_finite()).count();
            if non_finite > 0 {
                issues.push(Issue::new(
                    Severity::Error,
                    &name,
                    format!("{non_finite} missing or non-finite value(s)"),
                ));
                continue;
            }

            if dataset.n_rows() > 1 {
                let first = dataset.features[0][col];
                if values.clone().all(|v| v == first) {
                    let message = format!("constant column (value {first})");
                    issues.push(Issue::new(Severity::Warning, &name, message));
                }
            }

            let kind = dataset.schema.as_ref().and_then(|s| s.get(col)).map(|c| &c.kind);
            if let Some(ColumnKind::Categorical { categories }) = kind {
                let invalid = values
                    .filter(|v| v.fract() != 0.0 || *v < 0.0 || *v >= categories.len() as f64)
                    .count();
                if invalid > 0 {
                    issues.push(Issue::new(
                        Severity::Error,
                        &name,
                        format!(
                            "{invalid} value(s) outside the {} declared categories",
                            categories.len()
                        ),
                    ));
                }
            }
        }
    }

    fn check_labels(&self, dataset: &Dataset, issues: &mut Vec<Issue>) {
        if !dataset.class_names.is_empty() {
            let declared = dataset.class_names.len();
            let unknown = dataset.labels.iter().filter(|&&l| l >= declared).count();
            if unknown > 0 {
                issues.push(Issue::new(
                    Severity::Error,
                    "labels",
                    format!("{unknown} label(s) outside the {declared} declared classes"),
                ));
            }
        }

        let counts = dataset.class_counts();
        let present: Vec<(usize, usize)> =
            counts.iter().copied().enumerate().filter(|(_, c)| *c > 0).collect();

        if present.len() < 2 {
            issues.push(Issue::new(
                Severity::Error,
                "labels",
                format!("{} distinct class(es) present, at least 2 required", present.len()),
            ));
            return;
        }

        for (class, name) in dataset.class_names.iter().enumerate() {
            if counts.get(class).copied().unwrap_or(0) == 0 {
                let message = format!("class '{name}' has no rows");
                issues.push(Issue::new(Severity::Warning, "labels", message));
            }
        }

        let min = present.iter().map(|(_, c)| *c).min().unwrap_or(0);
        let max = present.iter().map(|(_, c)| *c).max().unwrap_or(0);
        let ratio = min as f64 / max as f64;
        if ratio < self.rules.min_class_ratio {
            issues.push(Issue::new(
                Severity::Warning,
                "labels",
                format!("class imbalance: minority/majority ratio {ratio:.3}"),
            ));
        }
    }
}

impl Validator for DataValidator {
    fn validate(&self, dataset: &Dataset) -> TrainingResult<ValidationReport> {
        dataset.check_shape()?;

        let mut issues = Vec::new();
        self.check_rows(dataset, &mut issues);
        Self::check_columns(dataset, &mut issues);
        self.check_labels(dataset, &mut issues);

        let report = ValidationReport::from_issues(issues);
        debug!(
            dataset = %dataset.name,
            passed = report.passed,
            summary = %report.summary(),
            "Validated dataset"
        );
        Ok(report)
    }
}
