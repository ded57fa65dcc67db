use crate::error::TrainingResult;
use crate::run::RunId;
use std::path::{Path, PathBuf};

pub const MODEL_FILE: &str = "model.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const RUN_RECORD_FILE: &str = "run.json";

/// Filesystem layout for run artifacts under an output directory.
///
/// Layout is `<root>/<run_id>/{model.json, manifest.json, run.json}`.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str())
    }

    #[must_use]
    pub fn model_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(MODEL_FILE)
    }

    /// Model path relative to the root, as recorded in artifact references.
    #[must_use]
    pub fn relative_model_path(run_id: &RunId) -> PathBuf {
        Path::new(run_id.as_str()).join(MODEL_FILE)
    }

    #[must_use]
    pub fn manifest_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn run_record_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(RUN_RECORD_FILE)
    }

    pub fn ensure_run_dir(&self, run_id: &RunId) -> TrainingResult<PathBuf> {
        let dir = self.run_dir(run_id);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
