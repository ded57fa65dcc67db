use crate::dataset::DatasetId;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::ArtifactLayout;
use crate::run::{Run, RunId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Run-scoped pointer to a persisted model plus its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub run_id: RunId,
    /// Path relative to the store root.
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

/// Descriptive metadata stored alongside a model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub dataset_type: String,
    pub model_type: String,
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metadata: ArtifactMetadata,
    pub artifact: ArtifactReference,
}

#[must_use]
pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(sha256_bytes(&bytes))
}

/// Write `bytes` to `path` via a temp file in the same directory and a rename,
/// so readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> TrainingResult<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| TrainingError::Io(e.error))?;
    Ok(())
}

/// JSON-on-disk artifact store rooted at an output directory.
///
/// Several runs may persist concurrently as long as their run ids differ;
/// every file lives under its own `<run_id>/` directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: ArtifactLayout,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { layout: ArtifactLayout::new(root.into()) }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Persist a fitted state for `run_id`. The manifest is written last and
    /// marks the artifact as complete.
    pub fn persist<T: Serialize>(
        &self,
        run_id: &RunId,
        state: &T,
        metadata: ArtifactMetadata,
    ) -> TrainingResult<ArtifactReference> {
        let manifest_path = self.layout.manifest_path(run_id);
        if manifest_path.exists() {
            return Err(TrainingError::Persistence(format!(
                "artifact for run {run_id} already exists at {}",
                manifest_path.display()
            )));
        }

        self.layout
            .ensure_run_dir(run_id)
            .map_err(|e| TrainingError::persistence("cannot create run directory", e))?;

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| TrainingError::persistence("cannot serialize model", e))?;
        let model_path = self.layout.model_path(run_id);
        write_atomic(&model_path, &bytes)
            .map_err(|e| TrainingError::persistence("cannot write model artifact", e))?;

        let reference = ArtifactReference {
            run_id: run_id.clone(),
            path: ArtifactLayout::relative_model_path(run_id),
            sha256: sha256_bytes(&bytes),
            bytes: bytes.len() as u64,
        };
        let manifest = ArtifactManifest {
            run_id: run_id.clone(),
            created_at: Utc::now(),
            metadata,
            artifact: reference.clone(),
        };

        let written = serde_json::to_vec_pretty(&manifest)
            .map_err(TrainingError::from)
            .and_then(|json| write_atomic(&manifest_path, &json));
        if let Err(err) = written {
            if let Err(cleanup) = std::fs::remove_file(&model_path) {
                warn!(
                    run_id = %run_id,
                    error = %cleanup,
                    "Failed to remove orphaned model artifact"
                );
            }
            return Err(TrainingError::persistence("cannot write artifact manifest", err));
        }

        debug!(
            run_id = %run_id,
            path = %model_path.display(),
            bytes = reference.bytes,
            "Persisted model artifact"
        );
        Ok(reference)
    }

    /// Load a persisted state, verifying it against the manifest and the
    /// reference fingerprint.
    pub fn load<T: DeserializeOwned>(&self, reference: &ArtifactReference) -> TrainingResult<T> {
        let path = self.resolve(&reference.path)?;

        let manifest = self.read_manifest(&reference.run_id)?;
        if manifest.artifact.sha256 != reference.sha256 {
            return Err(TrainingError::Persistence(format!(
                "reference for run {} does not match its manifest",
                reference.run_id
            )));
        }

        let bytes = std::fs::read(&path).map_err(|e| {
            TrainingError::persistence(&format!("cannot read {}", path.display()), e)
        })?;
        let actual = sha256_bytes(&bytes);
        if actual != reference.sha256 {
            return Err(TrainingError::Persistence(format!(
                "fingerprint mismatch for {}: expected {}, found {actual}",
                path.display(),
                reference.sha256
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| TrainingError::persistence("cannot deserialize model artifact", e))
    }

    pub fn read_manifest(&self, run_id: &RunId) -> TrainingResult<ArtifactManifest> {
        let path = self.layout.manifest_path(run_id);
        let bytes = std::fs::read(&path).map_err(|e| {
            TrainingError::persistence(&format!("no artifact manifest for run {run_id}"), e)
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TrainingError::persistence(&format!("corrupt manifest {}", path.display()), e)
        })
    }

    /// Write the terminal run record to `<run_id>/run.json`.
    pub fn record_run(&self, run: &Run) -> TrainingResult<PathBuf> {
        let path = self.layout.run_record_path(&run.run_id);
        let json = serde_json::to_vec_pretty(run)?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    pub(crate) fn resolve(&self, relative: &Path) -> TrainingResult<PathBuf> {
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(TrainingError::Persistence(format!(
                "artifact path escapes the store root: {}",
                relative.display()
            )));
        }
        Ok(self.root().join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Weights {
        w: Vec<f64>,
        bias: f64,
    }

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            dataset_type: "iris".into(),
            model_type: "logistic_regression".into(),
            dataset_id: DatasetId("abc".into()),
            hyperparameters: BTreeMap::from([("c".to_string(), 1.0)]),
            metrics: BTreeMap::from([("accuracy".to_string(), 0.9)]),
            feature_names: vec!["x".into()],
            class_names: vec!["a".into(), "b".into()],
        }
    }

    fn weights() -> Weights {
        Weights { w: vec![0.1, -2.5e-17, 1.0 / 3.0], bias: 0.7 }
    }

    #[test]
    fn test_persist_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let run_id = RunId::new();

        let reference = store.persist(&run_id, &weights(), metadata()).unwrap();
        assert_eq!(reference.run_id, run_id);
        assert!(reference.path.is_relative());
        assert_eq!(reference.sha256.len(), 64);

        let loaded: Weights = store.load(&reference).unwrap();
        assert_eq!(loaded, weights());

        let manifest = store.read_manifest(&run_id).unwrap();
        assert_eq!(manifest.artifact, reference);
        assert_eq!(manifest.metadata, metadata());
    }

    #[test]
    fn test_persist_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let run_id = RunId::new();
        store.persist(&run_id, &weights(), metadata()).unwrap();

        let err = store.persist(&run_id, &weights(), metadata()).unwrap_err();
        assert!(matches!(err, TrainingError::Persistence(_)));
    }

    #[test]
    fn test_load_detects_tampering() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let run_id = RunId::new();
        let reference = store.persist(&run_id, &weights(), metadata()).unwrap();

        std::fs::write(store.root().join(&reference.path), br#"{"w":[],"bias":0.0}"#).unwrap();
        let err = store.load::<Weights>(&reference).unwrap_err();
        assert!(err.to_string().contains("fingerprint mismatch"));
    }

    #[test]
    fn test_load_without_manifest_fails() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let run_id = RunId::new();
        let reference = store.persist(&run_id, &weights(), metadata()).unwrap();

        std::fs::remove_file(store.layout().manifest_path(&run_id)).unwrap();
        assert!(store.load::<Weights>(&reference).is_err());
    }

    #[test]
    fn test_load_rejects_escaping_path() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("store"));
        let run_id = RunId::new();
        let mut reference = store.persist(&run_id, &weights(), metadata()).unwrap();
        reference.path = PathBuf::from("../elsewhere/model.json");

        let err = store.load::<Weights>(&reference).unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/file.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
