//! Model registry helpers

use super::backend::TrackingBackend;
use super::models::get_model;
use super::ModelVersion;
use crate::error::{AutoMLError, Result};
use crate::model::Pipeline;
use tracing::{debug, info, warn};

/// Register the model logged at `artifact_path` of a run under `name`
pub fn register_model(
    backend: &dyn TrackingBackend,
    run_id: &str,
    name: &str,
    artifact_path: &str,
) -> Result<ModelVersion> {
    debug!(run_id, name, "Registering model");
    let source = format!("runs:/{}/{}", run_id, artifact_path.trim_matches('/'));
    let version = backend.create_model_version(name, &source, run_id)?;
    info!("Registered model '{}' version {}", name, version.version);
    Ok(version)
}

/// Path of a model inside its run's artifact store
///
/// Taken as everything after the last `artifacts` component of the version
/// source.
pub fn model_path_from_source(source: &str) -> Option<String> {
    let parts: Vec<&str> = source.split('/').collect();
    let root = parts.iter().rposition(|p| *p == "artifacts")?;
    let rest: Vec<&str> = parts[root + 1..].iter().copied().filter(|p| !p.is_empty()).collect();
    if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    }
}

/// Load the registered model `name` in `stage`, returning it with its version
///
/// Fails when no version is in the stage. When several are, a warning is
/// logged and the last one listed is used.
pub fn get_registered_model(backend: &dyn TrackingBackend, name: &str, stage: &str) -> Result<(Pipeline, String)> {
    debug!(name, stage, "Finding registered model");
    let in_stage: Vec<ModelVersion> = backend
        .search_model_versions(name)?
        .into_iter()
        .filter(|v| v.current_stage == stage)
        .collect();

    if in_stage.len() > 1 {
        warn!("{} {} versions of model {} found", in_stage.len(), stage, name);
    }
    let version = in_stage
        .last()
        .ok_or_else(|| AutoMLError::ModelNotFound(format!("{} version of model {} not found", stage, name)))?;
    info!("Loading model '{}' version {}", name, version.version);

    let model_path = model_path_from_source(&version.source)
        .ok_or_else(|| AutoMLError::ModelNotFound("Path of model in artifact store not found".to_string()))?;
    let pipeline = get_model(backend, &version.run_id, &model_path)?;
    Ok((pipeline, version.version.clone()))
}
