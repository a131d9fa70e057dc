//! File-system tracking store
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<experiment_id>/meta.json
//! <root>/<experiment_id>/<run_id>/run.json
//! <root>/<experiment_id>/<run_id>/artifacts/...
//! <root>/models/<name>/versions.json
//! ```

use super::backend::{artifact_components, TrackingBackend};
use super::{
    now_millis, Experiment, ModelVersion, Run, RunData, RunInfo, RunStatus, DEFAULT_EXPERIMENT_NAME,
    RUN_NAME_TAG,
};
use crate::error::{AutoMLError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const MODELS_DIR: &str = "models";
const ARTIFACTS_DIR: &str = "artifacts";

/// Tracking store in a local directory
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    fn experiments(&self) -> Result<Vec<Experiment>> {
        let mut experiments = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let meta = entry?.path().join("meta.json");
            if meta.is_file() {
                experiments.push(Self::read_json::<Experiment>(&meta)?);
            }
        }
        experiments.sort_by_key(|e| e.experiment_id.parse::<u64>().unwrap_or(u64::MAX));
        Ok(experiments)
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty() || artifact_components(run_id)?.len() != 1 {
            return Err(AutoMLError::TrackingError(format!("Invalid run id: {}", run_id)));
        }
        for experiment in self.experiments()? {
            let dir = self.root.join(&experiment.experiment_id).join(run_id);
            if dir.join("run.json").is_file() {
                return Ok(dir);
            }
        }
        Err(AutoMLError::TrackingError(format!("Run '{}' not found", run_id)))
    }

    fn update<F>(&self, run_id: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut Run),
    {
        let path = self.run_dir(run_id)?.join("run.json");
        let mut run: Run = Self::read_json(&path)?;
        change(&mut run);
        Self::write_json(&path, &run)
    }

    fn artifact_root(&self, run_id: &str) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join(ARTIFACTS_DIR))
    }

    fn versions_file(&self, name: &str) -> Result<PathBuf> {
        if artifact_components(name)?.len() != 1 {
            return Err(AutoMLError::TrackingError(format!("Invalid model name: {}", name)));
        }
        Ok(self.root.join(MODELS_DIR).join(name).join("versions.json"))
    }

    fn read_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let path = self.versions_file(name)?;
        if !path.is_file() {
            return Ok(Vec::new());
        }
        Self::read_json(&path)
    }

    /// Expand `runs:/<run_id>/<path>` to the run's artifact directory
    fn resolve_source(&self, source: &str) -> Result<String> {
        match source.strip_prefix("runs:/") {
            Some(rest) => {
                let (run_id, path) = rest.split_once('/').unwrap_or((rest, ""));
                let mut resolved = self.artifact_root(run_id)?;
                for part in artifact_components(path)? {
                    resolved.push(part);
                }
                Ok(resolved.to_string_lossy().into_owned())
            }
            None => Ok(source.to_string()),
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

impl TrackingBackend for LocalBackend {
    fn tracking_uri(&self) -> String {
        self.root.display().to_string()
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        Ok(self.experiments()?.into_iter().find(|e| e.name == name))
    }

    fn create_experiment(&self, name: &str) -> Result<String> {
        let experiments = self.experiments()?;
        if experiments.iter().any(|e| e.name == name) {
            return Err(AutoMLError::TrackingError(format!(
                "Experiment '{}' already exists",
                name
            )));
        }
        let id = if name == DEFAULT_EXPERIMENT_NAME && !experiments.iter().any(|e| e.experiment_id == "0") {
            0
        } else {
            experiments
                .iter()
                .filter_map(|e| e.experiment_id.parse::<u64>().ok())
                .max()
                .map_or(1, |max| max + 1)
        };
        let experiment = Experiment {
            experiment_id: id.to_string(),
            name: name.to_string(),
            artifact_location: self.root.join(id.to_string()).display().to_string(),
            lifecycle_stage: "active".to_string(),
        };
        Self::write_json(&self.root.join(&experiment.experiment_id).join("meta.json"), &experiment)?;
        debug!(experiment_id = %experiment.experiment_id, name, "Created experiment");
        Ok(experiment.experiment_id)
    }

    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<RunInfo> {
        let experiment_dir = self.root.join(experiment_id);
        if !experiment_dir.join("meta.json").is_file() {
            return Err(AutoMLError::TrackingError(format!(
                "Experiment '{}' not found",
                experiment_id
            )));
        }
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = experiment_dir.join(&run_id);
        fs::create_dir_all(run_dir.join(ARTIFACTS_DIR))?;

        let mut tags = tags.clone();
        if let Some(name) = run_name {
            tags.insert(RUN_NAME_TAG.to_string(), name.to_string());
        }
        let info = RunInfo {
            run_id: run_id.clone(),
            experiment_id: experiment_id.to_string(),
            run_name: run_name.map(str::to_string),
            status: RunStatus::Running,
            start_time: now_millis(),
            end_time: None,
            artifact_uri: run_dir.join(ARTIFACTS_DIR).display().to_string(),
        };
        let run = Run {
            info: info.clone(),
            data: RunData {
                tags,
                ..RunData::default()
            },
        };
        Self::write_json(&run_dir.join("run.json"), &run)?;
        Ok(info)
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        Self::read_json(&self.run_dir(run_id)?.join("run.json"))
    }

    fn update_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.update(run_id, |run| {
            run.info.status = status;
            run.info.end_time = if status.is_terminal() { Some(now_millis()) } else { None };
        })
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.update(run_id, |run| {
            run.data.params.insert(key.to_string(), value.to_string());
        })
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64, _step: i64) -> Result<()> {
        self.update(run_id, |run| {
            run.data.metrics.insert(key.to_string(), value);
        })
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.update(run_id, |run| {
            run.data.tags.insert(key.to_string(), value.to_string());
        })
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path, artifact_path: Option<&str>) -> Result<()> {
        let mut dst = self.artifact_root(run_id)?;
        for part in artifact_components(artifact_path.unwrap_or(""))? {
            dst.push(part);
        }
        let file_name = local_path
            .file_name()
            .ok_or_else(|| AutoMLError::TrackingError(format!("Not a file: {}", local_path.display())))?;
        copy_tree(local_path, &dst.join(file_name))
    }

    fn download_artifact(&self, run_id: &str, path: &str, dst_dir: &Path) -> Result<PathBuf> {
        let parts = artifact_components(path)?;
        let mut src = self.artifact_root(run_id)?;
        let mut dst = dst_dir.to_path_buf();
        for part in &parts {
            src.push(part);
            dst.push(part);
        }
        if !src.exists() {
            return Err(AutoMLError::TrackingError(format!(
                "Artifact '{}' not found in run {}",
                path, run_id
            )));
        }
        copy_tree(&src, &dst)?;
        Ok(dst)
    }

    fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion> {
        let mut versions = self.read_versions(name)?;
        let next = versions
            .iter()
            .filter_map(|v| v.version.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let version = ModelVersion {
            name: name.to_string(),
            version: next.to_string(),
            source: self.resolve_source(source)?,
            run_id: run_id.to_string(),
            current_stage: "None".to_string(),
            creation_timestamp: now_millis(),
        };
        versions.push(version.clone());
        Self::write_json(&self.versions_file(name)?, &versions)?;
        Ok(version)
    }

    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        self.read_versions(name)
    }

    fn transition_model_version_stage(&self, name: &str, version: &str, stage: &str) -> Result<ModelVersion> {
        let mut versions = self.read_versions(name)?;
        let entry = versions
            .iter_mut()
            .find(|v| v.version == version)
            .ok_or_else(|| AutoMLError::ModelNotFound(format!("Version {} of model {} not found", version, name)))?;
        entry.current_stage = stage.to_string();
        let updated = entry.clone();
        Self::write_json(&self.versions_file(name)?, &versions)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().join("mlruns")).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_default_experiment_gets_id_zero() {
        let (_dir, backend) = backend();
        assert_eq!(backend.create_experiment("Default").unwrap(), "0");
        assert_eq!(backend.create_experiment("titanic").unwrap(), "1");
        assert_eq!(backend.create_experiment("churn").unwrap(), "2");
        assert!(backend.create_experiment("churn").is_err());
        assert_eq!(backend.get_experiment_by_name("titanic").unwrap().unwrap().experiment_id, "1");
        assert!(backend.get_experiment_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let (_dir, backend) = backend();
        let exp = backend.create_experiment("exp").unwrap();
        let info = backend.create_run(&exp, Some("trial"), &BTreeMap::new()).unwrap();
        backend.log_param(&info.run_id, "estimator_max_depth", "3").unwrap();
        backend.log_metric(&info.run_id, "roc_auc_cv", 0.91, 0).unwrap();
        backend.set_tag(&info.run_id, "hyperopt", "true").unwrap();
        backend.update_run(&info.run_id, RunStatus::Finished).unwrap();

        let run = backend.get_run(&info.run_id).unwrap();
        assert_eq!(run.info.status, RunStatus::Finished);
        assert!(run.info.end_time.is_some());
        assert_eq!(run.data.params["estimator_max_depth"], "3");
        assert_eq!(run.data.metrics["roc_auc_cv"], 0.91);
        assert_eq!(run.data.tags[RUN_NAME_TAG], "trial");
    }

    #[test]
    fn test_artifacts_round_trip() {
        let (dir, backend) = backend();
        let exp = backend.create_experiment("exp").unwrap();
        let info = backend.create_run(&exp, None, &BTreeMap::new()).unwrap();

        let local = dir.path().join("plots");
        fs::create_dir_all(local.join("nested")).unwrap();
        fs::write(local.join("roc.svg"), "<svg/>").unwrap();
        fs::write(local.join("nested").join("pr.svg"), "<svg/>").unwrap();
        backend.log_artifacts(&info.run_id, &local, Some("evaluation")).unwrap();

        let out = dir.path().join("download");
        let path = backend.download_artifact(&info.run_id, "evaluation/nested/pr.svg", &out).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "<svg/>");
        assert!(backend.download_artifact(&info.run_id, "evaluation/missing.svg", &out).is_err());
        assert!(backend.log_artifact(&info.run_id, &local.join("roc.svg"), Some("../escape")).is_err());
    }

    #[test]
    fn test_model_versions() {
        let (_dir, backend) = backend();
        let exp = backend.create_experiment("exp").unwrap();
        let info = backend.create_run(&exp, None, &BTreeMap::new()).unwrap();

        let v1 = backend.create_model_version("churn", &format!("runs:/{}/model", info.run_id), &info.run_id).unwrap();
        let v2 = backend.create_model_version("churn", &format!("runs:/{}/model", info.run_id), &info.run_id).unwrap();
        assert_eq!((v1.version.as_str(), v2.version.as_str()), ("1", "2"));
        assert!(v1.source.ends_with("artifacts/model") || v1.source.ends_with("artifacts\\model"));

        backend.transition_model_version_stage("churn", "2", "Production").unwrap();
        let stages: Vec<String> = backend
            .search_model_versions("churn")
            .unwrap()
            .into_iter()
            .map(|v| v.current_stage)
            .collect();
        assert_eq!(stages, vec!["None", "Production"]);
        assert!(backend.transition_model_version_stage("churn", "9", "Production").is_err());
    }
}
