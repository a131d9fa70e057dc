//! Logging pipelines and run data, and loading pipelines back

use super::backend::{join_artifact_path, TrackingBackend};
use super::registry::register_model;
use super::tracker::{RunOptions, Tracker};
use super::RunInfo;
use crate::error::{AutoMLError, Result};
use crate::model::{Pipeline, PIPELINE_FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Flavor written into every `MLmodel` descriptor
pub const MODEL_FLAVOR: &str = "myautoml";

pub(crate) const MLMODEL_FILE: &str = "MLmodel";
pub(crate) const MODEL_DATA_FILE: &str = "model.json";
pub(crate) const ENVIRONMENT_FILE: &str = "environment.yml";

/// How to load a logged model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFlavor {
    pub loader_module: String,
    /// Data file, relative to the model directory
    pub data: String,
    pub format_version: u32,
    pub crate_version: String,
    #[serde(default)]
    pub env: Option<String>,
}

impl Default for ModelFlavor {
    fn default() -> Self {
        Self {
            loader_module: "myautoml.pipeline".to_string(),
            data: MODEL_DATA_FILE.to_string(),
            format_version: PIPELINE_FORMAT_VERSION,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            env: Some(ENVIRONMENT_FILE.to_string()),
        }
    }
}

/// Contents of the `MLmodel` descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModel {
    pub artifact_path: String,
    pub run_id: String,
    pub utc_time_created: String,
    pub flavors: BTreeMap<String, ModelFlavor>,
}

impl MlModel {
    pub fn new(run_id: &str, artifact_path: &str) -> Self {
        let mut flavors = BTreeMap::new();
        flavors.insert(MODEL_FLAVOR.to_string(), ModelFlavor::default());
        Self {
            artifact_path: artifact_path.to_string(),
            run_id: run_id.to_string(),
            utc_time_created: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            flavors,
        }
    }

    pub fn flavor(&self) -> Option<&ModelFlavor> {
        self.flavors.get(MODEL_FLAVOR)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Environment descriptor stored next to every logged model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub dependencies: Vec<String>,
}

impl Default for EnvironmentDescriptor {
    fn default() -> Self {
        Self {
            name: "myautoml_env".to_string(),
            dependencies: vec![format!("myautoml=={}", env!("CARGO_PKG_VERSION"))],
        }
    }
}

impl EnvironmentDescriptor {
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

/// Params, metrics, tags and files to attach to a run
#[derive(Debug, Clone, Default)]
pub struct TrackData {
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    /// Local file → artifact directory
    pub artifacts: BTreeMap<PathBuf, String>,
    /// Local directory → artifact directory
    pub artifact_dirs: BTreeMap<PathBuf, String>,
}

impl TrackData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_artifact(mut self, path: impl Into<PathBuf>, artifact_path: impl Into<String>) -> Self {
        self.artifacts.insert(path.into(), artifact_path.into());
        self
    }
}

/// Model logging request: where the pipeline goes and what comes with it
#[derive(Debug, Clone)]
pub struct ModelLog {
    pub artifact_path: String,
    /// Register the logged model under this name
    pub registered_model_name: Option<String>,
    pub environment: EnvironmentDescriptor,
    pub data: TrackData,
}

impl Default for ModelLog {
    fn default() -> Self {
        Self {
            artifact_path: "model".to_string(),
            registered_model_name: None,
            environment: EnvironmentDescriptor::default(),
            data: TrackData::default(),
        }
    }
}

impl ModelLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub fn with_registered_model_name(mut self, name: impl Into<String>) -> Self {
        self.registered_model_name = Some(name.into());
        self
    }

    pub fn with_data(mut self, data: TrackData) -> Self {
        self.data = data;
        self
    }
}

/// Write `model.json`, `MLmodel` and the environment file into `dir`
pub(crate) fn save_model_dir(
    pipeline: &Pipeline,
    run_id: &str,
    artifact_path: &str,
    environment: &EnvironmentDescriptor,
    dir: &Path,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    pipeline.save(&dir.join(MODEL_DATA_FILE))?;
    MlModel::new(run_id, artifact_path).save(&dir.join(MLMODEL_FILE))?;
    environment.save(&dir.join(ENVIRONMENT_FILE))?;
    Ok(())
}

/// Log a pipeline under `log.artifact_path` of a run, then its data, then
/// register it if a name was given
pub(crate) fn log_model(
    backend: &dyn TrackingBackend,
    run_id: &str,
    pipeline: &Pipeline,
    log: &ModelLog,
) -> Result<()> {
    info!(artifact_path = %log.artifact_path, "Logging model");
    let temp_dir = tempfile::tempdir()?;
    save_model_dir(pipeline, run_id, &log.artifact_path, &log.environment, temp_dir.path())?;
    backend.log_artifacts(run_id, temp_dir.path(), Some(log.artifact_path.as_str()))?;
    track_model_data(backend, run_id, &log.data)?;
    if let Some(name) = &log.registered_model_name {
        register_model(backend, run_id, name, &log.artifact_path)?;
    }
    Ok(())
}

/// Where files logged through [`TrackData::artifacts`] end up in the run
pub fn artifact_locations(artifacts: &BTreeMap<PathBuf, String>) -> Vec<String> {
    artifacts
        .iter()
        .filter_map(|(path, dir)| {
            let name = path.file_name()?.to_str()?;
            Some(join_artifact_path(Some(dir.as_str()), name))
        })
        .collect()
}

/// Attach params, metrics, tags and artifacts to an existing run
pub fn track_model_data(backend: &dyn TrackingBackend, run_id: &str, data: &TrackData) -> Result<()> {
    debug!(run_id, "Tracking model metadata");
    for (key, value) in &data.params {
        backend.log_param(run_id, key, value)?;
    }
    for (key, value) in &data.metrics {
        backend.log_metric(run_id, key, *value, 0)?;
    }
    for (key, value) in &data.tags {
        backend.set_tag(run_id, key, value)?;
    }
    for (local_path, artifact_path) in &data.artifacts {
        debug!(path = %local_path.display(), artifact_path = %artifact_path, "Logging artifact");
        backend.log_artifact(run_id, local_path, Some(artifact_path.as_str()))?;
    }
    for (local_dir, artifact_path) in &data.artifact_dirs {
        backend.log_artifacts(run_id, local_dir, Some(artifact_path.as_str()))?;
    }
    Ok(())
}

/// Log `pipeline` in a new run of `experiment_name`
pub fn track_model(
    tracker: &mut Tracker,
    pipeline: &Pipeline,
    experiment_name: &str,
    run_name: Option<&str>,
    log: &ModelLog,
) -> Result<RunInfo> {
    debug!("Uploading model to the tracking server");
    tracker.set_experiment(experiment_name)?;
    let options = match run_name {
        Some(name) => RunOptions::named(name),
        None => RunOptions::default(),
    };
    tracker.with_run(options, |run| {
        run.log_model(pipeline, log)?;
        Ok(run.info().clone())
    })
}

/// Load a pipeline saved with [`Pipeline::save`] and log it in a new run
pub fn track_model_from_file(
    tracker: &mut Tracker,
    local_path: &Path,
    experiment_name: &str,
    run_name: Option<&str>,
    log: &ModelLog,
) -> Result<RunInfo> {
    debug!(path = %local_path.display(), "Loading model from file");
    let pipeline = Pipeline::load(local_path)?;
    track_model(tracker, &pipeline, experiment_name, run_name, log)
}

/// Load the pipeline logged at `model_path` of a run
pub fn get_model(backend: &dyn TrackingBackend, run_id: &str, model_path: &str) -> Result<Pipeline> {
    let temp_dir = tempfile::tempdir()?;
    let descriptor_path =
        backend.download_artifact(run_id, &join_artifact_path(Some(model_path), MLMODEL_FILE), temp_dir.path())?;
    let descriptor = MlModel::load(&descriptor_path)?;
    let flavor = descriptor.flavor().ok_or_else(|| {
        AutoMLError::ModelNotFound(format!(
            "Model at '{}' of run {} has no {} flavor",
            model_path, run_id, MODEL_FLAVOR
        ))
    })?;
    debug!(loader = %flavor.loader_module, "Loading model");
    let data_path =
        backend.download_artifact(run_id, &join_artifact_path(Some(model_path), &flavor.data), temp_dir.path())?;
    Pipeline::load(&data_path)
}
