//! Estimator and preprocessor contracts, pipelines and built-in models
//!
//! Estimators work on dense `f64` matrices and predict the positive-class
//! probability of a binary target. Preprocessors turn a raw `DataFrame` into
//! such a matrix. A [`Pipeline`] chains one of each and is what gets persisted
//! to the tracking backend.

mod forest;
mod logistic;
mod pipeline;
mod preprocess;
mod tree;

pub use forest::{MaxFeatures, RandomForestClassifier};
pub use logistic::LogisticRegression;
pub use pipeline::{make_pipeline, Pipeline, SavedPipeline, PIPELINE_FORMAT_VERSION};
pub use preprocess::{ColumnPreprocessor, FeatureOrigin, Passthrough};
pub use tree::{Criterion, DecisionTreeClassifier, TreeNode};

use crate::calibration::CalibratedClassifierState;
use crate::error::{AutoMLError, Result};
use crate::optimizer::ParamMap;
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary classifier over dense feature matrices
pub trait Estimator: Send + Sync + fmt::Debug {
    /// Fit on features `x` and 0/1 labels `y`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// `n × 2` matrix of class probabilities, column 1 is the positive class
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Hard 0/1 predictions, positive when P(y=1) > 0.5
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.column(1).mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    /// Hyperparameters the estimator was built with
    fn params(&self) -> ParamMap;

    /// Fresh, unfitted copy with the same hyperparameters
    fn clone_unfitted(&self) -> Box<dyn Estimator>;

    /// Copy including the fitted state
    fn boxed_clone(&self) -> Box<dyn Estimator>;

    /// Serializable form of the fitted model
    fn to_saved(&self) -> Result<SavedEstimator>;

    /// Tree structure for path attributions, if the model has one
    fn as_tree_ensemble(&self) -> Option<&dyn TreeEnsemble> {
        None
    }
}

/// Positive-class probabilities as a vector
pub fn positive_proba(estimator: &dyn Estimator, x: &Array2<f64>) -> Result<Array1<f64>> {
    let proba = estimator.predict_proba(x)?;
    if proba.ncols() != 2 {
        return Err(AutoMLError::ShapeError {
            expected: "2 probability columns".to_string(),
            actual: format!("{} columns", proba.ncols()),
        });
    }
    Ok(proba.column(1).to_owned())
}

/// Stack positive-class probabilities into the `n × 2` layout
pub(crate) fn two_column_proba(p: &Array1<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((p.len(), 2));
    for (i, &v) in p.iter().enumerate() {
        out[[i, 0]] = 1.0 - v;
        out[[i, 1]] = v;
    }
    out
}

/// Check labels are 0/1 and match the number of rows
pub(crate) fn check_binary_target(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(AutoMLError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(AutoMLError::ValidationError("Cannot fit on an empty dataset".to_string()));
    }
    if let Some(bad) = y.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(AutoMLError::ValidationError(format!(
            "Binary target must be 0 or 1, found {}",
            bad
        )));
    }
    Ok(())
}

/// Decision-path structure used by tree explainers
pub trait TreeEnsemble: Send + Sync {
    /// Number of input features
    fn n_features(&self) -> usize;

    /// Mean positive-class probability over the training data
    fn expected_value(&self) -> f64;

    /// Per-feature contributions for one sample; they sum to
    /// `prediction - expected_value`
    fn contributions(&self, sample: &[f64]) -> Vec<f64>;
}

/// Turns a raw data frame into a feature matrix
pub trait Preprocessor: Send + Sync + fmt::Debug {
    fn fit(&mut self, x: &DataFrame, y: &Array1<f64>) -> Result<()>;

    fn transform(&self, x: &DataFrame) -> Result<Array2<f64>>;

    fn fit_transform(&mut self, x: &DataFrame, y: &Array1<f64>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    /// Names of the output columns
    fn feature_names(&self) -> Vec<String>;

    /// Where each output column came from
    fn feature_origins(&self) -> Vec<FeatureOrigin>;

    fn boxed_clone(&self) -> Box<dyn Preprocessor>;

    fn to_saved(&self) -> Result<SavedPreprocessor>;
}

/// Capability tags supplied alongside an estimator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatorTags {
    /// Namespace the estimator comes from
    pub module: String,
    /// Estimator name
    pub class: String,
    /// Whether tree explainers apply
    pub tree_based: bool,
}

impl EstimatorTags {
    pub fn new(module: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            class: class.into(),
            tree_based: false,
        }
    }

    pub fn with_tree_based(mut self, tree_based: bool) -> Self {
        self.tree_based = tree_based;
        self
    }
}

/// Builds estimators from flat parameter maps
pub trait EstimatorFactory: Send + Sync {
    fn build(&self, params: &ParamMap) -> Result<Box<dyn Estimator>>;

    fn tags(&self) -> EstimatorTags;
}

/// Estimators shipped with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinEstimator {
    DecisionTree,
    RandomForest,
    LogisticRegression,
}

impl FromStr for BuiltinEstimator {
    type Err = AutoMLError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "decision_tree" | "tree" => Ok(BuiltinEstimator::DecisionTree),
            "random_forest" | "forest" => Ok(BuiltinEstimator::RandomForest),
            "logistic_regression" | "logistic" => Ok(BuiltinEstimator::LogisticRegression),
            other => Err(AutoMLError::ConfigError(format!("Unknown estimator: {}", other))),
        }
    }
}

impl EstimatorFactory for BuiltinEstimator {
    fn build(&self, params: &ParamMap) -> Result<Box<dyn Estimator>> {
        Ok(match self {
            BuiltinEstimator::DecisionTree => Box::new(DecisionTreeClassifier::from_params(params)?),
            BuiltinEstimator::RandomForest => Box::new(RandomForestClassifier::from_params(params)?),
            BuiltinEstimator::LogisticRegression => Box::new(LogisticRegression::from_params(params)?),
        })
    }

    fn tags(&self) -> EstimatorTags {
        match self {
            BuiltinEstimator::DecisionTree => {
                EstimatorTags::new("myautoml.model", "DecisionTreeClassifier").with_tree_based(true)
            }
            BuiltinEstimator::RandomForest => {
                EstimatorTags::new("myautoml.model", "RandomForestClassifier").with_tree_based(true)
            }
            BuiltinEstimator::LogisticRegression => {
                EstimatorTags::new("myautoml.model", "LogisticRegression")
            }
        }
    }
}

/// Persisted form of an estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum SavedEstimator {
    DecisionTree(DecisionTreeClassifier),
    RandomForest(RandomForestClassifier),
    LogisticRegression(LogisticRegression),
    Calibrated(CalibratedClassifierState),
}

impl SavedEstimator {
    pub fn into_estimator(self) -> Box<dyn Estimator> {
        match self {
            SavedEstimator::DecisionTree(m) => Box::new(m),
            SavedEstimator::RandomForest(m) => Box::new(m),
            SavedEstimator::LogisticRegression(m) => Box::new(m),
            SavedEstimator::Calibrated(state) => Box::new(state.into_classifier()),
        }
    }
}

/// Persisted form of a preprocessor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "preprocessor", rename_all = "snake_case")]
pub enum SavedPreprocessor {
    Passthrough(Passthrough),
    Columns(ColumnPreprocessor),
}

impl SavedPreprocessor {
    pub fn into_preprocessor(self) -> Box<dyn Preprocessor> {
        match self {
            SavedPreprocessor::Passthrough(p) => Box::new(p),
            SavedPreprocessor::Columns(p) => Box::new(p),
        }
    }
}
