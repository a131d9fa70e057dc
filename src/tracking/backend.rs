//! Tracking backend contract

use super::{Experiment, ModelVersion, Run, RunInfo, RunStatus};
use crate::error::{AutoMLError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Storage for experiments, runs and registered models
///
/// Artifact paths are `/`-separated and relative to the run's artifact root.
pub trait TrackingBackend: Send + Sync {
    /// Location shown to users, e.g. the server URL
    fn tracking_uri(&self) -> String;

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>>;

    /// Create an experiment, returning its id
    fn create_experiment(&self, name: &str) -> Result<String>;

    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<RunInfo>;

    fn get_run(&self, run_id: &str) -> Result<Run>;

    /// Set the run status; terminal statuses also stamp the end time
    fn update_run(&self, run_id: &str, status: RunStatus) -> Result<()>;

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    fn log_metric(&self, run_id: &str, key: &str, value: f64, step: i64) -> Result<()>;

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Upload one file into `artifact_path` (the root when `None`)
    fn log_artifact(&self, run_id: &str, local_path: &Path, artifact_path: Option<&str>) -> Result<()>;

    /// Upload a directory tree into `artifact_path`
    fn log_artifacts(&self, run_id: &str, local_dir: &Path, artifact_path: Option<&str>) -> Result<()> {
        for entry in std::fs::read_dir(local_dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| AutoMLError::TrackingError(format!("Invalid file name: {}", path.display())))?
                .to_string();
            if path.is_dir() {
                let sub = join_artifact_path(artifact_path, &name);
                self.log_artifacts(run_id, &path, Some(sub.as_str()))?;
            } else {
                self.log_artifact(run_id, &path, artifact_path)?;
            }
        }
        Ok(())
    }

    /// Fetch a file or directory of the run into `dst_dir`, returning the
    /// local path
    fn download_artifact(&self, run_id: &str, path: &str, dst_dir: &Path) -> Result<PathBuf>;

    /// Register `source` as a new version of `name`, creating the registered
    /// model if needed
    fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion>;

    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;

    fn transition_model_version_stage(&self, name: &str, version: &str, stage: &str) -> Result<ModelVersion>;
}

/// `base/name`, or `name` alone at the root
pub(crate) fn join_artifact_path(base: Option<&str>, name: &str) -> String {
    match base.map(|b| b.trim_matches('/')).filter(|b| !b.is_empty()) {
        Some(base) => format!("{}/{}", base, name),
        None => name.to_string(),
    }
}

/// Split an artifact path into components, rejecting escapes from the run root
pub(crate) fn artifact_components(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    if parts.iter().any(|p| *p == "..") {
        return Err(AutoMLError::TrackingError(format!(
            "Artifact path must stay inside the run: {}",
            path
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_artifact_path() {
        assert_eq!(join_artifact_path(None, "roc.svg"), "roc.svg");
        assert_eq!(join_artifact_path(Some("evaluation/"), "roc.svg"), "evaluation/roc.svg");
        assert_eq!(join_artifact_path(Some(""), "roc.svg"), "roc.svg");
    }

    #[test]
    fn test_artifact_components_reject_parent() {
        assert_eq!(artifact_components("model/./MLmodel").unwrap(), vec!["model", "MLmodel"]);
        assert!(artifact_components("../secrets").is_err());
    }
}
