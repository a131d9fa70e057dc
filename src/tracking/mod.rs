//! Experiment tracking
//!
//! Runs, parameters, metrics, tags, artifacts and a model registry behind the
//! [`TrackingBackend`] trait. [`LocalBackend`] keeps everything in a directory
//! tree; [`RestBackend`] talks to an MLflow tracking server. [`Tracker`] scopes
//! runs to closures and ends them with a status matching the outcome.

mod backend;
mod local;
mod models;
mod registry;
mod rest;
mod tracker;

pub use backend::TrackingBackend;
pub use local::LocalBackend;
pub use models::{
    artifact_locations, get_model, track_model, track_model_data, track_model_from_file, EnvironmentDescriptor, MlModel,
    ModelFlavor, ModelLog, TrackData, MODEL_FLAVOR,
};
pub use registry::{get_registered_model, model_path_from_source, register_model};
pub use rest::RestBackend;
pub use tracker::{ActiveRun, RunOptions, Tracker};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag linking a nested run to its parent
pub const PARENT_RUN_ID_TAG: &str = "mlflow.parentRunId";
/// Tag holding the run name
pub const RUN_NAME_TAG: &str = "mlflow.runName";
/// Experiment used when none is set
pub const DEFAULT_EXPERIMENT_NAME: &str = "Default";

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Failed | RunStatus::Killed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: String,
    #[serde(default = "default_lifecycle_stage")]
    pub lifecycle_stage: String,
}

fn default_lifecycle_stage() -> String {
    "active".to_string()
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    pub status: RunStatus,
    /// Milliseconds since the epoch
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    pub artifact_uri: String,
}

/// Latest logged values of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub info: RunInfo,
    #[serde(default)]
    pub data: RunData,
}

/// One version of a registered model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
    pub source: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default = "default_stage")]
    pub current_stage: String,
    #[serde(default)]
    pub creation_timestamp: i64,
}

fn default_stage() -> String {
    "None".to_string()
}

/// Milliseconds since the epoch
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_serialization() {
        assert_eq!(serde_json::to_string(&RunStatus::Killed).unwrap(), "\"KILLED\"");
        let status: RunStatus = serde_json::from_str("\"FINISHED\"").unwrap();
        assert!(status.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
