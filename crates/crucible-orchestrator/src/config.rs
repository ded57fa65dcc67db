//! Pipeline configuration file support.
//!
//! Layers, lowest precedence first: built-in defaults, the global
//! `~/.crucible/config.toml`, the local `./crucible.toml`, then an explicit
//! `--config` file. Command-line flags are applied by the caller on top.

use crate::orchestrator::PipelineSettings;
use crucible_models::{Hyperparameters, ModelType};
use crucible_training::{BuiltinOptions, ValidationRules};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_OUTPUT_DIR: &str = "models/artifacts";
pub const DEFAULT_DASHBOARD_PATH: &str = "docs/assets/dashboard_data.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    #[serde(default)]
    pub min_samples: Option<usize>,
    #[serde(default)]
    pub min_class_ratio: Option<f64>,
    #[serde(default)]
    pub check_duplicates: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub dashboard_path: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,

    /// Held-out fraction for evaluation.
    #[serde(default)]
    pub test_fraction: Option<f64>,

    #[serde(default)]
    pub split_seed: Option<u64>,

    /// UCI `wine.data` file backing the `wine` dataset.
    #[serde(default)]
    pub wine_path: Option<PathBuf>,

    #[serde(default)]
    pub validation: ValidationConfig,

    /// Per-model hyperparameter overrides, keyed by model type.
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, Hyperparameters>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl PipelineConfig {
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".crucible")
            .join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from("crucible.toml")
    }

    /// Load the global and local files (when present) and then `explicit`,
    /// which must exist.
    pub fn discover_and_load(explicit: Option<&Path>) -> ConfigResult<Self> {
        Self::load_layers(&Self::default_global_path(), &Self::default_local_path(), explicit)
    }

    pub fn load_layers(global: &Path, local: &Path, explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        for path in [global, local] {
            match Self::load_from_file(path) {
                Ok(layer) => {
                    debug!(path = %path.display(), "Loaded configuration layer");
                    config.merge(&layer);
                }
                Err(ConfigError::NotFound(_)) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Ignoring unreadable configuration")
                }
            }
        }

        if let Some(path) = explicit {
            config.merge(&Self::load_from_file(path)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Values from `other` override `self` field by field; hyperparameter
    /// tables merge per key.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref output_dir) = other.output_dir {
            self.output_dir = Some(output_dir.clone());
        }
        if let Some(ref dashboard_path) = other.dashboard_path {
            self.dashboard_path = Some(dashboard_path.clone());
        }
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
        if other.test_fraction.is_some() {
            self.test_fraction = other.test_fraction;
        }
        if other.split_seed.is_some() {
            self.split_seed = other.split_seed;
        }
        if let Some(ref wine_path) = other.wine_path {
            self.wine_path = Some(wine_path.clone());
        }
        if other.validation.min_samples.is_some() {
            self.validation.min_samples = other.validation.min_samples;
        }
        if other.validation.min_class_ratio.is_some() {
            self.validation.min_class_ratio = other.validation.min_class_ratio;
        }
        if other.validation.check_duplicates.is_some() {
            self.validation.check_duplicates = other.validation.check_duplicates;
        }
        for (model, params) in &other.hyperparameters {
            self.hyperparameters.entry(model.clone()).or_default().extend(params.clone());
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(fraction) = self.test_fraction {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(ConfigError::InvalidValue(format!(
                    "test_fraction must be in (0, 1), got {fraction}"
                )));
            }
        }
        if let Some(ratio) = self.validation.min_class_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidValue(format!(
                    "validation.min_class_ratio must be in [0, 1], got {ratio}"
                )));
            }
        }
        if let Some(model) = self.hyperparameters.keys().find(|k| k.parse::<ModelType>().is_err()) {
            return Err(ConfigError::InvalidValue(format!(
                "hyperparameters for unknown model '{model}'"
            )));
        }
        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.dashboard_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DASHBOARD_PATH))
    }

    pub fn settings(&self) -> PipelineSettings {
        let defaults = PipelineSettings::default();
        PipelineSettings {
            test_fraction: self.test_fraction.unwrap_or(defaults.test_fraction),
            split_seed: self.split_seed.unwrap_or(defaults.split_seed),
        }
    }

    pub fn builtin_options(&self) -> BuiltinOptions {
        BuiltinOptions { wine_path: self.wine_path.clone(), ..Default::default() }
    }

    pub fn validation_rules(&self) -> ValidationRules {
        let defaults = ValidationRules::default();
        ValidationRules {
            min_samples: self.validation.min_samples.unwrap_or(defaults.min_samples),
            min_class_ratio: self.validation.min_class_ratio.unwrap_or(defaults.min_class_ratio),
            check_duplicates: self.validation.check_duplicates.unwrap_or(defaults.check_duplicates),
        }
    }

    /// Configured overrides for `model_type`; empty when none are set.
    pub fn hyperparameters_for(&self, model_type: &str) -> Hyperparameters {
        self.hyperparameters.get(model_type).cloned().unwrap_or_default()
    }
}
