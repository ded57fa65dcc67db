use crate::error::{TrainingError, TrainingResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Stable identifier for a dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Dataset identifiers accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Synthetic binary classification problem.
    Classification,
    /// Fisher's iris measurements, three classes.
    Iris,
    /// Wine cultivar chemistry, three classes.
    Wine,
}

impl DatasetKind {
    pub const ALL: [Self; 3] = [Self::Classification, Self::Iris, Self::Wine];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Iris => "iris",
            Self::Wine => "wine",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|k| k.as_str() == s.trim()).ok_or_else(|| {
            let expected: Vec<&str> = Self::ALL.iter().map(Self::as_str).collect();
            TrainingError::Configuration(format!(
                "unsupported dataset_type '{s}' (expected one of: {})",
                expected.join(", ")
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    /// Values are category codes indexing into `categories`.
    Categorical { categories: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    #[must_use]
    pub fn numeric(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnKind::Numeric }
    }
}

/// Feature matrix plus class labels.
///
/// Rows are observations; `labels[i]` is the class index of `features[i]`.
/// Structural invariants are checked by [`Dataset::check_shape`], never assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    #[serde(default)]
    pub schema: Option<Vec<Column>>,
    #[serde(default)]
    pub class_names: Vec<String>,
}

impl Dataset {
    #[must_use]
    pub fn new(name: impl Into<String>, features: Vec<Vec<f64>>, labels: Vec<usize>) -> Self {
        Self { name: name.into(), features, labels, schema: None, class_names: Vec::new() }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Vec<Column>) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_class_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.class_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.first().map_or_else(|| self.schema.as_ref().map_or(0, Vec::len), Vec::len)
    }

    /// Number of classes: declared names, widened to cover every observed label.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        let observed = self.labels.iter().max().map_or(0, |m| m + 1);
        observed.max(self.class_names.len())
    }

    #[must_use]
    pub fn column_name(&self, idx: usize) -> String {
        self.schema
            .as_ref()
            .and_then(|s| s.get(idx))
            .map_or_else(|| format!("feature_{idx}"), |c| c.name.clone())
    }

    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes()];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }

    /// Verify the structural invariants every consumer relies on.
    pub fn check_shape(&self) -> TrainingResult<()> {
        if self.features.len() != self.labels.len() {
            return Err(TrainingError::MalformedDataset(format!(
                "features have {} rows but labels have {}",
                self.features.len(),
                self.labels.len()
            )));
        }

        let width = self.n_features();
        if let Some((idx, row)) = self.features.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(TrainingError::MalformedDataset(format!(
                "row {idx} has {} values, expected {width}",
                row.len()
            )));
        }

        if let Some(schema) = &self.schema {
            if !self.features.is_empty() && schema.len() != width {
                return Err(TrainingError::MalformedDataset(format!(
                    "schema declares {} columns but features have {width}",
                    schema.len()
                )));
            }
        }

        Ok(())
    }

    /// Copy of the rows at `indices`, preserving schema and class names.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            schema: self.schema.clone(),
            class_names: self.class_names.clone(),
        }
    }

    /// Seeded, per-class shuffled split into `(train, test)`.
    ///
    /// Every class with at least two rows contributes at least one test row.
    pub fn stratified_split(&self, test_fraction: f64, seed: u64) -> TrainingResult<(Self, Self)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(TrainingError::Configuration(format!(
                "test_fraction must be in (0, 1), got {test_fraction}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut train = Vec::new();
        let mut test = Vec::new();

        for class in 0..self.n_classes() {
            let mut members: Vec<usize> =
                (0..self.labels.len()).filter(|&i| self.labels[i] == class).collect();
            members.shuffle(&mut rng);

            let mut n_test = (members.len() as f64 * test_fraction).round() as usize;
            if members.len() >= 2 {
                n_test = n_test.clamp(1, members.len() - 1);
            } else {
                n_test = 0;
            }
            test.extend_from_slice(&members[..n_test]);
            train.extend_from_slice(&members[n_test..]);
        }

        if train.is_empty() || test.is_empty() {
            return Err(TrainingError::Training(format!(
                "split of {} rows produced an empty partition",
                self.n_rows()
            )));
        }

        train.sort_unstable();
        test.sort_unstable();
        Ok((self.subset(&train), self.subset(&test)))
    }
}

pub fn compute_dataset_id(dataset: &Dataset) -> DatasetId {
    let mut hasher = Sha256::new();

    for (row, label) in dataset.features.iter().zip(&dataset.labels) {
        for value in row {
            hasher.update(value.to_bits().to_le_bytes());
        }
        hasher.update((*label as u64).to_le_bytes());
        hasher.update(b"\n");
    }

    DatasetId(hex::encode(hasher.finalize()))
}
