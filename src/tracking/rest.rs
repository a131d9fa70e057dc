//! MLflow tracking server client
//!
//! Speaks the `/api/2.0/mlflow` REST API. Artifacts go through the server's
//! artifact proxy, so only `mlflow-artifacts:` artifact URIs are supported.

use super::backend::{artifact_components, join_artifact_path, TrackingBackend};
use super::{now_millis, Experiment, ModelVersion, Run, RunData, RunInfo, RunStatus};
use crate::error::{AutoMLError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const API: &str = "api/2.0/mlflow";
const ARTIFACT_API: &str = "api/2.0/mlflow-artifacts/artifacts";
const ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

#[derive(Debug, Serialize, Deserialize)]
struct KeyValue {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct MetricEntry {
    key: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct WireRunInfo {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    run_name: Option<String>,
    status: RunStatus,
    #[serde(default)]
    start_time: i64,
    #[serde(default)]
    end_time: Option<i64>,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireRunData {
    #[serde(default)]
    metrics: Vec<MetricEntry>,
    #[serde(default)]
    params: Vec<KeyValue>,
    #[serde(default)]
    tags: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    info: WireRunInfo,
    #[serde(default)]
    data: WireRunData,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: WireRun,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersion,
}

#[derive(Debug, Deserialize)]
struct SearchModelVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersion>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    path: String,
    #[serde(default)]
    is_dir: bool,
}

#[derive(Debug, Deserialize)]
struct ListArtifactsResponse {
    #[serde(default)]
    files: Vec<FileInfo>,
}

impl From<WireRunInfo> for RunInfo {
    fn from(info: WireRunInfo) -> Self {
        RunInfo {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            run_name: info.run_name,
            status: info.status,
            start_time: info.start_time,
            end_time: info.end_time,
            artifact_uri: info.artifact_uri,
        }
    }
}

impl From<WireRun> for Run {
    fn from(run: WireRun) -> Self {
        Run {
            info: run.info.into(),
            data: RunData {
                params: run.data.params.into_iter().map(|kv| (kv.key, kv.value)).collect(),
                metrics: run.data.metrics.into_iter().map(|m| (m.key, m.value)).collect(),
                tags: run.data.tags.into_iter().map(|kv| (kv.key, kv.value)).collect(),
            },
        }
    }
}

/// Client for a remote MLflow tracking server
#[derive(Debug, Clone)]
pub struct RestBackend {
    base_url: String,
    agent: ureq::Agent,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(120))
            .build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API, path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut request = self.agent.get(&self.endpoint(path));
        for (key, value) in query {
            request = request.query(key, value);
        }
        Ok(request.call()?.into_json()?)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        debug!(endpoint = path, "POST");
        Ok(self.agent.post(&self.endpoint(path)).send_json(body)?.into_json()?)
    }

    fn post_unit(&self, path: &str, body: &Value) -> Result<()> {
        self.post::<Value>(path, body).map(|_| ())
    }

    /// URL of an artifact behind the server's artifact proxy
    fn artifact_url(&self, run_id: &str, path: &str) -> Result<String> {
        let root = self.artifact_root(run_id)?;
        let parts = artifact_components(path)?;
        let mut url = format!("{}/{}/{}", self.base_url, ARTIFACT_API, root);
        for part in parts {
            url.push('/');
            url.push_str(part);
        }
        Ok(url)
    }

    fn artifact_root(&self, run_id: &str) -> Result<String> {
        let uri = self.get_run(run_id)?.info.artifact_uri;
        proxied_artifact_root(&uri).ok_or_else(|| {
            AutoMLError::TrackingError(format!(
                "Unsupported artifact location '{}', the server must proxy artifacts",
                uri
            ))
        })
    }

    fn list_artifacts(&self, run_id: &str, path: &str) -> Result<Vec<FileInfo>> {
        let root = self.artifact_root(run_id)?;
        let full = join_artifact_path(Some(root.as_str()), path.trim_matches('/'));
        let url = format!("{}/{}", self.base_url, ARTIFACT_API);
        let response: ListArtifactsResponse = self.agent.get(&url).query("path", &full).call()?.into_json()?;
        // The proxy lists base names; rebuild run-relative paths
        Ok(response
            .files
            .into_iter()
            .map(|f| {
                let name = f.path.rsplit('/').next().unwrap_or(&f.path);
                FileInfo {
                    path: join_artifact_path(Some(path), name),
                    is_dir: f.is_dir,
                }
            })
            .collect())
    }

    fn download_file(&self, run_id: &str, path: &str, dst: &Path) -> Result<()> {
        let response = self.agent.get(&self.artifact_url(run_id, path)?).call()?;
        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dst, bytes)?;
        Ok(())
    }
}

/// Path part of an `mlflow-artifacts:` URI, without host and slashes
fn proxied_artifact_root(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix(ARTIFACT_SCHEME)?;
    let path = match rest.strip_prefix("//") {
        Some(with_host) => with_host.split_once('/').map_or("", |(_, p)| p),
        None => rest,
    };
    Some(path.trim_matches('/').to_string())
}

impl TrackingBackend for RestBackend {
    fn tracking_uri(&self) -> String {
        self.base_url.clone()
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let response = self
            .agent
            .get(&self.endpoint("experiments/get-by-name"))
            .query("experiment_name", name)
            .call();
        match response {
            Ok(resp) => Ok(Some(resp.into_json::<ExperimentResponse>()?.experiment)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create_experiment(&self, name: &str) -> Result<String> {
        let response: CreateExperimentResponse = self.post("experiments/create", &json!({ "name": name }))?;
        Ok(response.experiment_id)
    }

    fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        tags: &BTreeMap<String, String>,
    ) -> Result<RunInfo> {
        let tags: Vec<KeyValue> = tags
            .iter()
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        let mut body = json!({
            "experiment_id": experiment_id,
            "start_time": now_millis(),
            "tags": tags,
        });
        if let Some(name) = run_name {
            body["run_name"] = json!(name);
        }
        let response: RunResponse = self.post("runs/create", &body)?;
        Ok(response.run.info.into())
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        let response: RunResponse = self.get("runs/get", &[("run_id", run_id)])?;
        Ok(response.run.into())
    }

    fn update_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let mut body = json!({ "run_id": run_id, "status": status.as_str() });
        if status.is_terminal() {
            body["end_time"] = json!(now_millis());
        }
        self.post_unit("runs/update", &body)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.post_unit(
            "runs/log-parameter",
            &json!({ "run_id": run_id, "key": key, "value": value }),
        )
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64, step: i64) -> Result<()> {
        self.post_unit(
            "runs/log-metric",
            &json!({
                "run_id": run_id,
                "key": key,
                "value": value,
                "timestamp": now_millis(),
                "step": step,
            }),
        )
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.post_unit("runs/set-tag", &json!({ "run_id": run_id, "key": key, "value": value }))
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path, artifact_path: Option<&str>) -> Result<()> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AutoMLError::TrackingError(format!("Not a file: {}", local_path.display())))?;
        let url = self.artifact_url(run_id, &join_artifact_path(artifact_path, name))?;
        let bytes = fs::read(local_path)?;
        debug!(url = %url, "Uploading artifact");
        self.agent.put(&url).send_bytes(&bytes)?;
        Ok(())
    }

    fn download_artifact(&self, run_id: &str, path: &str, dst_dir: &Path) -> Result<PathBuf> {
        let mut dst = dst_dir.to_path_buf();
        for part in artifact_components(path)? {
            dst.push(part);
        }
        let entries = self.list_artifacts(run_id, path)?;
        if entries.is_empty() {
            self.download_file(run_id, path, &dst)?;
            return Ok(dst);
        }
        for entry in entries {
            if entry.is_dir {
                self.download_artifact(run_id, &entry.path, dst_dir)?;
            } else {
                let mut file_dst = dst_dir.to_path_buf();
                for part in artifact_components(&entry.path)? {
                    file_dst.push(part);
                }
                self.download_file(run_id, &entry.path, &file_dst)?;
            }
        }
        Ok(dst)
    }

    fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion> {
        match self.post_unit("registered-models/create", &json!({ "name": name })) {
            Ok(()) => debug!(name, "Created registered model"),
            Err(AutoMLError::TrackingError(msg)) if msg.contains("RESOURCE_ALREADY_EXISTS") => {}
            Err(e) => return Err(e),
        }
        let response: ModelVersionResponse = self.post(
            "model-versions/create",
            &json!({ "name": name, "source": source, "run_id": run_id }),
        )?;
        Ok(response.model_version)
    }

    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let filter = format!("name='{}'", name.replace('\'', "\\'"));
        let response: SearchModelVersionsResponse = self.get("model-versions/search", &[("filter", &filter)])?;
        Ok(response.model_versions)
    }

    fn transition_model_version_stage(&self, name: &str, version: &str, stage: &str) -> Result<ModelVersion> {
        let response: ModelVersionResponse = self.post(
            "model-versions/transition-stage",
            &json!({
                "name": name,
                "version": version,
                "stage": stage,
                "archive_existing_versions": false,
            }),
        )?;
        Ok(response.model_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxied_artifact_root() {
        assert_eq!(
            proxied_artifact_root("mlflow-artifacts:/1/abc/artifacts").as_deref(),
            Some("1/abc/artifacts")
        );
        assert_eq!(
            proxied_artifact_root("mlflow-artifacts://tracking:5000/1/abc/artifacts").as_deref(),
            Some("1/abc/artifacts")
        );
        assert!(proxied_artifact_root("s3://bucket/1/abc/artifacts").is_none());
    }

    #[test]
    fn test_run_response_parsing() {
        let body = r#"{
            "run": {
                "info": {
                    "run_id": "abc",
                    "experiment_id": "1",
                    "run_name": "0",
                    "status": "FINISHED",
                    "start_time": 1700000000000,
                    "end_time": 1700000005000,
                    "artifact_uri": "mlflow-artifacts:/1/abc/artifacts",
                    "lifecycle_stage": "active"
                },
                "data": {
                    "metrics": [{"key": "roc_auc_cv", "value": 0.9, "timestamp": 1, "step": 0}],
                    "params": [{"key": "estimator_max_depth", "value": "4"}],
                    "tags": [{"key": "hyperopt", "value": "true"}]
                }
            }
        }"#;
        let run: Run = serde_json::from_str::<RunResponse>(body).unwrap().run.into();
        assert_eq!(run.info.status, RunStatus::Finished);
        assert_eq!(run.data.metrics["roc_auc_cv"], 0.9);
        assert_eq!(run.data.params["estimator_max_depth"], "4");
        assert_eq!(run.data.tags["hyperopt"], "true");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let backend = RestBackend::new("http://localhost:5000/");
        assert_eq!(backend.tracking_uri(), "http://localhost:5000");
        assert_eq!(
            backend.endpoint("runs/get"),
            "http://localhost:5000/api/2.0/mlflow/runs/get"
        );
    }
}
