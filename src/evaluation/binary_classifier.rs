//! Binary classifier evaluation

use super::cv::{cross_validate, StratifiedKFold};
use super::metrics::Scorer;
use super::{Evaluation, EvaluationSet, EVALUATION_CATEGORY};
use crate::error::{AutoMLError, Result};
use crate::model::{positive_proba, Estimator};
use crate::visualisation::binary_classifier::PlotData;
use crate::visualisation::{PlotKind, PlotRenderer};
use std::path::Path;
use tracing::debug;

/// What to compute besides the per-role metrics
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    pub plots: Vec<PlotKind>,
    /// Folds for the training-role cross-validation, below 2 disables it
    pub cv_folds: usize,
    /// Role cross-validated
    pub cv_role: String,
    /// Prepended to every metric name and plot file stem
    pub metric_prefix: String,
    /// Shuffle seed for the folds, unshuffled when `None`
    pub random_state: Option<u64>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            plots: PlotKind::STANDARD.to_vec(),
            cv_folds: 5,
            cv_role: "train".to_string(),
            metric_prefix: String::new(),
            random_state: None,
        }
    }
}

impl EvaluationOptions {
    pub fn with_plots(mut self, plots: Vec<PlotKind>) -> Self {
        self.plots = plots;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = prefix.into();
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Settings used for calibrated models: `calibrated_` prefix, no
    /// cross-validation, calibration plots
    pub fn calibration() -> Self {
        Self::default()
            .with_prefix("calibrated_")
            .with_cv_folds(0)
            .with_plots(PlotKind::CALIBRATION.to_vec())
    }
}

/// Score `model` on every data role, cross-validate the training role and
/// render the requested plots into `temp_dir`
///
/// Predictions are stored back on each [`EvaluationSet`]. A plot that fails
/// to render is logged and left out of the artifacts.
pub fn evaluate_binary_classifier(
    model: &dyn Estimator,
    data: &mut [EvaluationSet],
    temp_dir: &Path,
    renderer: &dyn PlotRenderer,
    options: &EvaluationOptions,
) -> Result<Evaluation> {
    debug!("Starting evaluation for binary classifier");
    let prefix = &options.metric_prefix;
    let mut evaluation = Evaluation::new();

    for set in data.iter_mut() {
        let y_pred = model.predict(&set.x)?;
        let y_pred_proba = positive_proba(model, &set.x)?;
        for scorer in Scorer::ALL {
            let score = scorer.score(&set.y, &y_pred, &y_pred_proba)?;
            evaluation
                .metrics
                .insert(format!("{}{}_{}", prefix, scorer.name(), set.role), score);
        }
        set.y_pred = Some(y_pred);
        set.y_pred_proba = Some(y_pred_proba);
    }

    if options.cv_folds >= 2 {
        debug!("Starting cross-validation for binary classifier");
        let set = data
            .iter()
            .find(|s| s.role == options.cv_role)
            .ok_or_else(|| AutoMLError::DataError(format!("No '{}' data to cross-validate on", options.cv_role)))?;
        let mut cv = StratifiedKFold::new(options.cv_folds);
        if let Some(seed) = options.random_state {
            cv = cv.with_shuffle(seed);
        }
        let scores = cross_validate(model, &set.x, &set.y, &cv, &Scorer::ALL)?;
        for (name, score) in scores {
            evaluation.metrics.insert(format!("{}{}_cv", prefix, name), score);
        }
    }

    if !options.plots.is_empty() {
        std::fs::create_dir_all(temp_dir)?;
        let plot_data: Vec<PlotData<'_>> = data
            .iter()
            .filter_map(|s| {
                s.y_pred_proba.as_ref().map(|p| PlotData {
                    role: s.role.as_str(),
                    y: &s.y,
                    y_pred_proba: p,
                })
            })
            .collect();
        for kind in &options.plots {
            if let Some(path) = kind.save(renderer, temp_dir, prefix, &plot_data) {
                evaluation.artifacts.insert(path, EVALUATION_CATEGORY.to_string());
            }
        }
    }

    Ok(evaluation)
}

/// Evaluate a calibrated model: `calibrated_` metrics, no cross-validation
pub fn evaluate_calibration(
    model: &dyn Estimator,
    data: &mut [EvaluationSet],
    temp_dir: &Path,
    renderer: &dyn PlotRenderer,
) -> Result<Evaluation> {
    evaluate_binary_classifier(model, data, temp_dir, renderer, &EvaluationOptions::calibration())
}
