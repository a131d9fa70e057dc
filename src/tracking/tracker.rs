//! Closure-scoped tracking runs

use super::backend::TrackingBackend;
use super::local::LocalBackend;
use super::models::{log_model, ModelLog};
use super::rest::RestBackend;
use super::{RunInfo, RunStatus, DEFAULT_EXPERIMENT_NAME, PARENT_RUN_ID_TAG};
use crate::error::Result;
use crate::model::Pipeline;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How to open a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub run_name: Option<String>,
    /// Reopen this run instead of creating one
    pub resume_run_id: Option<String>,
    /// Tags set when the run is created
    pub tags: BTreeMap<String, String>,
}

impl RunOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            run_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn resume(run_id: impl Into<String>) -> Self {
        Self {
            resume_run_id: Some(run_id.into()),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Entry point for experiment tracking
pub struct Tracker {
    backend: Arc<dyn TrackingBackend>,
    experiment_id: Option<String>,
}

impl Tracker {
    pub fn new(backend: Arc<dyn TrackingBackend>) -> Self {
        Self {
            backend,
            experiment_id: None,
        }
    }

    /// `http(s)://` URIs talk to a tracking server, anything else is a local
    /// directory (an optional `file://` prefix is stripped)
    pub fn from_uri(uri: &str) -> Result<Self> {
        let backend: Arc<dyn TrackingBackend> = if uri.starts_with("http://") || uri.starts_with("https://") {
            Arc::new(RestBackend::new(uri))
        } else {
            Arc::new(LocalBackend::new(uri.strip_prefix("file://").unwrap_or(uri))?)
        };
        debug!(tracking_uri = %backend.tracking_uri(), "Tracking backend ready");
        Ok(Self::new(backend))
    }

    pub fn backend(&self) -> &dyn TrackingBackend {
        self.backend.as_ref()
    }

    pub fn tracking_uri(&self) -> String {
        self.backend.tracking_uri()
    }

    pub fn experiment_id(&self) -> Option<&str> {
        self.experiment_id.as_deref()
    }

    /// Make `name` the active experiment, creating it if needed
    pub fn set_experiment(&mut self, name: &str) -> Result<String> {
        let id = match self.backend.get_experiment_by_name(name)? {
            Some(experiment) => experiment.experiment_id,
            None => {
                info!("Creating experiment '{}'", name);
                self.backend.create_experiment(name)?
            }
        };
        self.experiment_id = Some(id.clone());
        Ok(id)
    }

    fn active_experiment(&self) -> Result<String> {
        match &self.experiment_id {
            Some(id) => Ok(id.clone()),
            None => match self.backend.get_experiment_by_name(DEFAULT_EXPERIMENT_NAME)? {
                Some(experiment) => Ok(experiment.experiment_id),
                None => self.backend.create_experiment(DEFAULT_EXPERIMENT_NAME),
            },
        }
    }

    /// Run `f` inside a run of the active experiment.
    ///
    /// The run ends `FINISHED` when `f` succeeds, `KILLED` when it returns
    /// [`AutoMLError::Interrupted`](crate::error::AutoMLError::Interrupted) and `FAILED` on any other error.
    pub fn with_run<T, F>(&self, options: RunOptions, f: F) -> Result<T>
    where
        F: FnOnce(&ActiveRun) -> Result<T>,
    {
        let info = match &options.resume_run_id {
            Some(run_id) => {
                self.backend.update_run(run_id, RunStatus::Running)?;
                for (key, value) in &options.tags {
                    self.backend.set_tag(run_id, key, value)?;
                }
                self.backend.get_run(run_id)?.info
            }
            None => {
                let experiment_id = self.active_experiment()?;
                self.backend
                    .create_run(&experiment_id, options.run_name.as_deref(), &options.tags)?
            }
        };
        run_scope(self.backend.clone(), info, f)
    }
}

fn run_scope<T, F>(backend: Arc<dyn TrackingBackend>, info: RunInfo, f: F) -> Result<T>
where
    F: FnOnce(&ActiveRun) -> Result<T>,
{
    debug!(run_id = %info.run_id, "Run started");
    let run = ActiveRun { backend, info };
    let result = f(&run);
    let status = match &result {
        Ok(_) => RunStatus::Finished,
        Err(e) if e.is_interrupted() => RunStatus::Killed,
        Err(_) => RunStatus::Failed,
    };
    match run.backend.update_run(&run.info.run_id, status) {
        Ok(()) => debug!(run_id = %run.info.run_id, %status, "Run ended"),
        Err(e) if result.is_err() => warn!("Could not end run {}: {}", run.info.run_id, e),
        Err(e) => return Err(e),
    }
    result
}

/// Handle to an open run
pub struct ActiveRun {
    backend: Arc<dyn TrackingBackend>,
    info: RunInfo,
}

impl ActiveRun {
    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn experiment_id(&self) -> &str {
        &self.info.experiment_id
    }

    pub fn backend(&self) -> &dyn TrackingBackend {
        self.backend.as_ref()
    }

    pub fn log_param(&self, key: &str, value: impl Display) -> Result<()> {
        self.backend.log_param(&self.info.run_id, key, &value.to_string())
    }

    pub fn log_params<V: Display>(&self, params: &BTreeMap<String, V>) -> Result<()> {
        for (key, value) in params {
            self.log_param(key, value)?;
        }
        Ok(())
    }

    pub fn set_tag(&self, key: &str, value: impl Display) -> Result<()> {
        self.backend.set_tag(&self.info.run_id, key, &value.to_string())
    }

    pub fn set_tags<V: Display>(&self, tags: &BTreeMap<String, V>) -> Result<()> {
        for (key, value) in tags {
            self.set_tag(key, value)?;
        }
        Ok(())
    }

    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        self.backend.log_metric(&self.info.run_id, key, value, 0)
    }

    pub fn log_metrics(&self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        for (key, value) in metrics {
            self.log_metric(key, *value)?;
        }
        Ok(())
    }

    pub fn log_artifact(&self, local_path: &Path, artifact_path: Option<&str>) -> Result<()> {
        self.backend.log_artifact(&self.info.run_id, local_path, artifact_path)
    }

    /// Log each file into the artifact directory it maps to
    pub fn log_artifacts_map(&self, artifacts: &BTreeMap<PathBuf, String>) -> Result<()> {
        for (path, artifact_path) in artifacts {
            debug!(path = %path.display(), artifact_path = %artifact_path, "Logging artifact");
            self.log_artifact(path, Some(artifact_path.as_str()))?;
        }
        Ok(())
    }

    /// Log a pipeline with its descriptor, environment and run data
    pub fn log_model(&self, pipeline: &Pipeline, log: &ModelLog) -> Result<()> {
        log_model(self.backend.as_ref(), &self.info.run_id, pipeline, log)
    }

    /// Run `f` inside a nested run linked to this one
    pub fn with_child_run<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&ActiveRun) -> Result<T>,
    {
        let mut tags = BTreeMap::new();
        tags.insert(PARENT_RUN_ID_TAG.to_string(), self.info.run_id.clone());
        let info = self.backend.create_run(&self.info.experiment_id, Some(name), &tags)?;
        run_scope(self.backend.clone(), info, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutoMLError;
    use crate::tracking::RUN_NAME_TAG;

    fn tracker() -> (tempfile::TempDir, Tracker) {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::from_uri(&format!("file://{}", dir.path().join("mlruns").display())).unwrap();
        (dir, tracker)
    }

    #[test]
    fn test_set_experiment_is_idempotent() {
        let (_dir, mut tracker) = tracker();
        let first = tracker.set_experiment("titanic").unwrap();
        let second = tracker.set_experiment("titanic").unwrap();
        assert_eq!(first, second);
        assert_eq!(tracker.experiment_id(), Some(first.as_str()));
    }

    #[test]
    fn test_run_status_follows_outcome() {
        let (_dir, mut tracker) = tracker();
        tracker.set_experiment("exp").unwrap();

        let ok = tracker.with_run(RunOptions::default(), |run| Ok(run.run_id().to_string())).unwrap();
        let mut failed_id = String::new();
        let failed: Result<()> = tracker.with_run(RunOptions::default(), |run| {
            failed_id = run.run_id().to_string();
            Err(AutoMLError::TrainingError("boom".to_string()))
        });
        let mut killed_id = String::new();
        let killed: Result<()> = tracker.with_run(RunOptions::default(), |run| {
            killed_id = run.run_id().to_string();
            Err(AutoMLError::Interrupted)
        });

        assert!(failed.is_err() && killed.is_err());
        let backend = tracker.backend();
        assert_eq!(backend.get_run(&ok).unwrap().info.status, RunStatus::Finished);
        assert_eq!(backend.get_run(&failed_id).unwrap().info.status, RunStatus::Failed);
        assert_eq!(backend.get_run(&killed_id).unwrap().info.status, RunStatus::Killed);
    }

    #[test]
    fn test_child_runs_link_to_parent() {
        let (_dir, mut tracker) = tracker();
        tracker.set_experiment("exp").unwrap();
        let (parent, child) = tracker
            .with_run(RunOptions::named("parent"), |run| {
                let child = run.with_child_run("0", |child| {
                    child.log_metric("loss", 0.25)?;
                    Ok(child.run_id().to_string())
                })?;
                Ok((run.run_id().to_string(), child))
            })
            .unwrap();

        let child_run = tracker.backend().get_run(&child).unwrap();
        assert_eq!(child_run.data.tags[PARENT_RUN_ID_TAG], parent);
        assert_eq!(child_run.data.tags[RUN_NAME_TAG], "0");
        assert_eq!(child_run.data.metrics["loss"], 0.25);
        assert_eq!(child_run.info.status, RunStatus::Finished);
    }

    #[test]
    fn test_resume_reopens_run() {
        let (_dir, mut tracker) = tracker();
        tracker.set_experiment("exp").unwrap();
        let run_id = tracker
            .with_run(RunOptions::default(), |run| Ok(run.run_id().to_string()))
            .unwrap();
        tracker
            .with_run(RunOptions::resume(run_id.clone()), |run| run.set_tag("estimator_calibrated", true))
            .unwrap();
        let run = tracker.backend().get_run(&run_id).unwrap();
        assert_eq!(run.data.tags["estimator_calibrated"], "true");
        assert_eq!(run.info.status, RunStatus::Finished);
    }

    #[test]
    fn test_runs_without_experiment_use_default() {
        let (_dir, tracker) = tracker();
        let experiment = tracker
            .with_run(RunOptions::default(), |run| Ok(run.experiment_id().to_string()))
            .unwrap();
        assert_eq!(experiment, "0");
    }
}
