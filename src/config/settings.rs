//! Typed configuration sections

use crate::calibration::CalibrationMethod;
use crate::error::{AutoMLError, Result};
use crate::model::BuiltinEstimator;
use crate::optimizer::{ParamMap, SamplerType, SearchSpace};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fully resolved configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub experiment: ExperimentSettings,
    pub training: TrainingSettings,
    pub evaluation: EvaluationSettings,
    pub calibration: CalibrationSettings,
    pub cache: CacheSettings,
}

impl Settings {
    /// Deserialize from a merged configuration tree
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AutoMLError::ConfigError(format!("Invalid configuration: {}", e)))
    }
}

/// Output format of log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level directive, e.g. `info` or `myautoml=debug,warn`
    pub level: String,
    /// Log to stderr
    pub console: bool,
    /// Optional log file
    pub path: Option<PathBuf>,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            path: None,
            format: LogFormat::Full,
        }
    }
}

/// Experiment tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    /// Experiment name runs are logged under
    pub name: String,
    /// Local directory or `http(s)://` URI of a tracking server
    pub tracking_uri: String,
    /// Register the trained model under this name
    pub registered_model_name: Option<String>,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            tracking_uri: "./mlruns".to_string(),
            registered_model_name: None,
        }
    }
}

/// Hyperparameter search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub estimator: BuiltinEstimator,
    /// Fixed estimator parameters, search samples are merged over them
    pub estimator_params: ParamMap,
    /// Share of rows held out for testing
    pub test_size: f64,
    /// Number of search trials
    pub max_evals: usize,
    /// Seed for the sampler
    pub random_state: u64,
    pub sampler: SamplerType,
    /// Nested search space, absent for a single fixed-parameter fit
    pub search_space: Option<SearchSpace>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            estimator: BuiltinEstimator::DecisionTree,
            estimator_params: ParamMap::new(),
            test_size: 0.2,
            max_evals: 5,
            random_state: 1,
            sampler: SamplerType::Tpe,
            search_space: None,
        }
    }
}

/// Evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Metric maximised by the search
    pub primary_metric: String,
    pub cv_folds: usize,
    /// Run feature attribution on the best model
    pub shap_analysis: bool,
    /// Plot names, or `all`
    pub plots: Vec<String>,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            primary_metric: "roc_auc_cv".to_string(),
            cv_folds: 5,
            shap_analysis: false,
            plots: vec!["all".to_string()],
        }
    }
}

/// Calibration configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Calibrate the best model on the test data after training
    pub calibrate: bool,
    pub method: CalibrationMethod,
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache/myautoml"),
        }
    }
}
