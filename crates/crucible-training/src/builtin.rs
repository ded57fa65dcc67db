use crate::dataset::{Column, Dataset, DatasetKind};
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const IRIS_CSV: &str = include_str!("../data/iris.csv");

const WINE_COLUMNS: [&str; 13] = [
    "alcohol",
    "malic_acid",
    "ash",
    "alcalinity_of_ash",
    "magnesium",
    "total_phenols",
    "flavanoids",
    "nonflavanoid_phenols",
    "proanthocyanins",
    "color_intensity",
    "hue",
    "od280_od315_of_diluted_wines",
    "proline",
];

/// Per-cultivar (mean, std) of each wine column, with the row count per class.
const WINE_CLASSES: [(usize, [(f64, f64); 13]); 3] = [
    (
        59,
        [
            (13.74, 0.46),
            (2.01, 0.69),
            (2.46, 0.23),
            (17.04, 2.55),
            (106.34, 10.50),
            (2.84, 0.34),
            (2.98, 0.40),
            (0.29, 0.07),
            (1.90, 0.41),
            (5.53, 1.24),
            (1.06, 0.12),
            (3.16, 0.36),
            (1115.71, 221.52),
        ],
    ),
    (
        71,
        [
            (12.28, 0.54),
            (1.93, 1.02),
            (2.24, 0.32),
            (20.24, 3.35),
            (94.55, 16.75),
            (2.26, 0.55),
            (2.08, 0.71),
            (0.36, 0.12),
            (1.63, 0.60),
            (3.09, 0.92),
            (1.06, 0.20),
            (2.79, 0.50),
            (519.51, 157.21),
        ],
    ),
    (
        48,
        [
            (13.15, 0.53),
            (3.33, 1.09),
            (2.44, 0.18),
            (21.42, 2.26),
            (99.31, 10.89),
            (1.68, 0.36),
            (0.78, 0.29),
            (0.45, 0.12),
            (1.15, 0.41),
            (7.40, 2.31),
            (0.68, 0.11),
            (1.68, 0.27),
            (629.90, 115.10),
        ],
    ),
];

/// Source of datasets for the pipeline's fetch stage.
#[async_trait]
pub trait DatasetProvider: Send + Sync {
    fn id(&self) -> &'static str;

    async fn fetch(&self, kind: DatasetKind) -> TrainingResult<Dataset>;
}

#[derive(Debug, Clone)]
pub struct BuiltinOptions {
    pub seed: u64,
    pub classification_samples: usize,
    pub classification_features: usize,
    pub informative_features: usize,
    /// Per-dimension offset of each class centroid from the origin.
    pub class_sep: f64,
    /// Fraction of synthetic labels flipped at random.
    pub label_noise: f64,
    /// UCI `wine.data` file. Without one, wine rows are sampled from the
    /// published per-cultivar statistics.
    pub wine_path: Option<PathBuf>,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            classification_samples: 1000,
            classification_features: 20,
            informative_features: 10,
            class_sep: 0.5,
            label_noise: 0.01,
            wine_path: None,
        }
    }
}

/// Datasets compiled into the binary; no network or filesystem access.
#[derive(Debug, Clone, Default)]
pub struct BuiltinDatasets {
    options: BuiltinOptions,
}

impl BuiltinDatasets {
    #[must_use]
    pub fn new(options: BuiltinOptions) -> Self {
        Self { options }
    }

    pub fn load(&self, kind: DatasetKind) -> TrainingResult<Dataset> {
        let dataset = match kind {
            DatasetKind::Classification => make_classification(&self.options)?,
            DatasetKind::Iris => load_iris()?,
            DatasetKind::Wine => match &self.options.wine_path {
                Some(path) => load_wine_file(path)?,
                None => {
                    warn!("No wine_path configured; sampling wine rows from cultivar statistics");
                    make_wine(self.options.seed)
                }
            },
        };
        debug!(
            dataset = %kind,
            rows = dataset.n_rows(),
            features = dataset.n_features(),
            classes = dataset.n_classes(),
            "Loaded built-in dataset"
        );
        Ok(dataset)
    }
}

#[async_trait]
impl DatasetProvider for BuiltinDatasets {
    fn id(&self) -> &'static str {
        "builtin"
    }

    async fn fetch(&self, kind: DatasetKind) -> TrainingResult<Dataset> {
        self.load(kind)
    }
}

#[derive(Debug, Deserialize)]
struct IrisRow {
    sepal_length: f64,
    sepal_width: f64,
    petal_length: f64,
    petal_width: f64,
    species: String,
}

fn load_iris() -> TrainingResult<Dataset> {
    const SPECIES: [&str; 3] = ["setosa", "versicolor", "virginica"];

    let mut reader = csv::Reader::from_reader(IRIS_CSV.as_bytes());
    let mut features = Vec::new();
    let mut labels = Vec::new();

    for (idx, row) in reader.deserialize::<IrisRow>().enumerate() {
        let row = row.map_err(|e| {
            TrainingError::MalformedDataset(format!("iris row {}: {e}", idx + 1))
        })?;
        let label = SPECIES.iter().position(|s| *s == row.species).ok_or_else(|| {
            TrainingError::MalformedDataset(format!(
                "iris row {}: unknown species '{}'",
                idx + 1,
                row.species
            ))
        })?;
        features.push(vec![row.sepal_length, row.sepal_width, row.petal_length, row.petal_width]);
        labels.push(label);
    }

    let schema = ["sepal_length", "sepal_width", "petal_length", "petal_width"]
        .into_iter()
        .map(Column::numeric)
        .collect();

    Ok(Dataset::new("iris", features, labels).with_schema(schema).with_class_names(SPECIES))
}

/// Two Gaussian clusters around opposite hypercube vertices, padded with
/// redundant (linear combination) and pure-noise columns.
fn make_classification(options: &BuiltinOptions) -> TrainingResult<Dataset> {
    let n_features = options.classification_features;
    let informative = options.informative_features.min(n_features);
    if informative == 0 || options.classification_samples < 2 {
        return Err(TrainingError::Configuration(
            "classification dataset needs at least one informative feature and two samples"
                .to_string(),
        ));
    }
    let redundant = (n_features - informative) / 2;

    let mut rng = StdRng::seed_from_u64(options.seed);
    let vertex: Vec<f64> = (0..informative)
        .map(|_| if rng.gen_bool(0.5) { options.class_sep } else { -options.class_sep })
        .collect();
    let mixing: Vec<Vec<f64>> = (0..redundant)
        .map(|_| (0..informative).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();

    let mut rows: Vec<(Vec<f64>, usize)> = Vec::with_capacity(options.classification_samples);
    for i in 0..options.classification_samples {
        let class = i % 2;
        let sign: f64 = if class == 0 { -1.0 } else { 1.0 };

        let mut row: Vec<f64> =
            vertex.iter().map(|c| sign * *c + standard_normal(&mut rng)).collect();
        for weights in &mixing {
            let value: f64 = weights.iter().zip(&row[..informative]).map(|(w, x)| w * x).sum();
            row.push(value);
        }
        while row.len() < n_features {
            row.push(standard_normal(&mut rng));
        }

        let flipped = rng.gen_bool(options.label_noise.clamp(0.0, 1.0));
        let label = if flipped { 1 - class } else { class };
        rows.push((row, label));
    }
    rows.shuffle(&mut rng);

    let schema = (0..n_features)
        .map(|i| {
            let prefix = if i < informative {
                "informative"
            } else if i < informative + redundant {
                "redundant"
            } else {
                "noise"
            };
            Column::numeric(format!("{prefix}_{i}"))
        })
        .collect();

    let (features, labels): (Vec<Vec<f64>>, Vec<usize>) = rows.into_iter().unzip();
    Ok(Dataset::new("classification", features, labels)
        .with_schema(schema)
        .with_class_names(["negative", "positive"]))
}

/// Reads the UCI layout: no header, the cultivar (1-3) first, then the 13
/// measurements in [`WINE_COLUMNS`] order.
fn load_wine_file(path: &Path) -> TrainingResult<Dataset> {
    let bytes = std::fs::read(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(bytes.as_slice());

    let mut features = Vec::new();
    let mut labels = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 1;
        let record = record
            .map_err(|e| TrainingError::MalformedDataset(format!("wine row {line}: {e}")))?;
        if record.len() != WINE_COLUMNS.len() + 1 {
            return Err(TrainingError::MalformedDataset(format!(
                "wine row {line}: expected {} fields, found {}",
                WINE_COLUMNS.len() + 1,
                record.len()
            )));
        }

        let label = match record.get(0) {
            Some("1") => 0,
            Some("2") => 1,
            Some("3") => 2,
            other => {
                return Err(TrainingError::MalformedDataset(format!(
                    "wine row {line}: unknown cultivar '{}'",
                    other.unwrap_or_default()
                )));
            }
        };
        let row = record
            .iter()
            .skip(1)
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    TrainingError::MalformedDataset(format!(
                        "wine row {line}: '{field}' is not a number"
                    ))
                })
            })
            .collect::<TrainingResult<Vec<f64>>>()?;
        features.push(row);
        labels.push(label);
    }

    let schema = WINE_COLUMNS.into_iter().map(Column::numeric).collect();
    Ok(Dataset::new("wine", features, labels)
        .with_schema(schema)
        .with_class_names(["class_0", "class_1", "class_2"]))
}

/// Samples each cultivar from independent normals fitted to the UCI wine
/// class statistics.
fn make_wine(seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows: Vec<(Vec<f64>, usize)> = Vec::new();

    for (class, (count, stats)) in WINE_CLASSES.iter().enumerate() {
        for _ in 0..*count {
            let row = stats
                .iter()
                .map(|(mean, std)| (mean + std * standard_normal(&mut rng)).max(0.01))
                .collect();
            rows.push((row, class));
        }
    }
    rows.shuffle(&mut rng);

    let schema = WINE_COLUMNS.into_iter().map(Column::numeric).collect();
    let (features, labels): (Vec<Vec<f64>>, Vec<usize>) = rows.into_iter().unzip();
    Dataset::new("wine", features, labels)
        .with_schema(schema)
        .with_class_names(["class_0", "class_1", "class_2"])
}

/// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
