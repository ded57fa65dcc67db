use crate::artifacts::{sha256_file, ArtifactManifest, ArtifactReference, ArtifactStore};
use crate::error::{TrainingError, TrainingResult};
use crate::run::{Run, RunId};
use std::path::{Component, Path};

/// A run directory discovered under an output directory.
#[derive(Debug, Clone)]
pub struct RunEntry {
    pub run: Run,
    /// Present only when the run persisted a complete artifact.
    pub manifest: Option<ArtifactManifest>,
}

pub fn read_run_record(path: &Path) -> TrainingResult<Run> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<Run>(&bytes)?)
}

/// Directories directly under `root` that look like run directories, sorted by name.
pub fn discover_run_dirs(root: &Path) -> TrainingResult<Vec<RunId>> {
    let dir = match std::fs::read_dir(root) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for entry in dir {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            out.push(RunId(name.to_string()));
        }
    }
    out.sort();
    Ok(out)
}

/// Run ids name a single directory directly under the store root.
fn check_run_id(run_id: &RunId) -> TrainingResult<()> {
    let mut components = Path::new(run_id.as_str()).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TrainingError::Configuration(format!("invalid run id '{run_id}'"))),
    }
}

/// Load the run record and manifest for one run.
pub fn load_run(store: &ArtifactStore, run_id: &RunId) -> TrainingResult<RunEntry> {
    check_run_id(run_id)?;
    let record_path = store.layout().run_record_path(run_id);
    if !record_path.exists() {
        return Err(TrainingError::RunNotFound(run_id.to_string()));
    }
    let run = read_run_record(&record_path)?;
    let manifest = if store.layout().manifest_path(run_id).exists() {
        Some(store.read_manifest(run_id)?)
    } else {
        None
    };
    Ok(RunEntry { run, manifest })
}

/// Resolve `run_id` to the reference recorded in its manifest.
pub fn resolve_artifact(
    store: &ArtifactStore,
    run_id: &RunId,
) -> TrainingResult<ArtifactReference> {
    check_run_id(run_id)?;
    if !store.layout().run_dir(run_id).is_dir() {
        return Err(TrainingError::RunNotFound(run_id.to_string()));
    }
    Ok(store.read_manifest(run_id)?.artifact)
}

/// Re-hash the model file for `run_id` and compare against its manifest.
pub fn verify_artifact(
    store: &ArtifactStore,
    run_id: &RunId,
) -> TrainingResult<ArtifactReference> {
    let reference = resolve_artifact(store, run_id)?;
    let path = store.resolve(&reference.path)?;
    let actual = sha256_file(&path)
        .map_err(|e| TrainingError::persistence(&format!("cannot read {}", path.display()), e))?;
    if actual != reference.sha256 {
        return Err(TrainingError::Persistence(format!(
            "fingerprint mismatch for run {run_id}: manifest {}, file {actual}",
            reference.sha256
        )));
    }
    Ok(reference)
}
