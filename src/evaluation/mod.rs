//! Model evaluation
//!
//! [`evaluate_binary_classifier`] scores a fitted estimator on every data role
//! it is given, cross-validates on the training role and renders diagnostic
//! plots. [`shap::shap_analyse`] adds per-feature attributions for tree models.

pub mod binary_classifier;
pub mod cv;
pub mod metrics;
pub mod shap;

pub use binary_classifier::{evaluate_binary_classifier, evaluate_calibration, EvaluationOptions};
pub use cv::{cross_validate, CVSplit, StratifiedKFold};
pub use metrics::Scorer;

use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Artifact category for evaluation plots
pub const EVALUATION_CATEGORY: &str = "evaluation";

/// A labelled dataset with a role such as `train` or `test`
///
/// Evaluation fills `y_pred` and `y_pred_proba` so later plotting reuses them.
#[derive(Debug, Clone)]
pub struct EvaluationSet {
    pub role: String,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub y_pred: Option<Array1<f64>>,
    pub y_pred_proba: Option<Array1<f64>>,
}

impl EvaluationSet {
    pub fn new(role: impl Into<String>, x: Array2<f64>, y: Array1<f64>) -> Self {
        Self {
            role: role.into(),
            x,
            y,
            y_pred: None,
            y_pred_proba: None,
        }
    }
}

/// Metrics plus artifact files, each mapped to the store sub-directory it
/// belongs in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: BTreeMap<PathBuf, String>,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Merge another evaluation, its entries win on clashes
    pub fn extend(&mut self, other: Evaluation) {
        self.metrics.extend(other.metrics);
        self.artifacts.extend(other.artifacts);
    }
}
