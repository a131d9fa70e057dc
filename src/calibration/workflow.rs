//! Calibrating a model stored in a tracking run

use super::{CalibratedClassifier, CalibrationMethod};
use crate::error::Result;
use crate::evaluation::{evaluate_calibration, EvaluationSet};
use crate::model::{make_pipeline, Estimator, Pipeline};
use crate::tracking::{artifact_locations, get_model, ModelLog, RunOptions, TrackData, Tracker};
use crate::visualisation::PlotRenderer;
use ndarray::Array1;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Where the model comes from and how it is calibrated
#[derive(Debug, Clone)]
pub struct CalibrationOptions {
    pub method: CalibrationMethod,
    /// Artifact path of the model to calibrate
    pub model_path: String,
    /// Artifact path the calibrated model is logged under
    pub calibrated_path: String,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            method: CalibrationMethod::Sigmoid,
            model_path: "model".to_string(),
            calibrated_path: "model_calibrated".to_string(),
        }
    }
}

impl CalibrationOptions {
    pub fn with_method(mut self, method: CalibrationMethod) -> Self {
        self.method = method;
        self
    }
}

/// Calibrated pipeline and what was logged with it
#[derive(Debug, Clone)]
pub struct CalibrationOutput {
    pub model: Pipeline,
    pub params: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Artifact paths inside the run
    pub artifacts: Vec<String>,
}

/// Calibrate the model logged in `run_id` on held-out data `(x, y)`.
///
/// Only the calibrator is fitted, the stored estimator is left as is. The
/// calibrated pipeline is logged under `options.calibrated_path` of the same
/// run together with the `calibrated_` metrics and plots.
pub fn calibrate_model(
    tracker: &Tracker,
    run_id: &str,
    x: &DataFrame,
    y: &Array1<f64>,
    renderer: &dyn PlotRenderer,
    options: &CalibrationOptions,
) -> Result<CalibrationOutput> {
    let temp_dir = tempfile::tempdir()?;
    debug!("Creating temporary directory: '{}'", temp_dir.path().display());

    info!("Loading the model");
    let model = get_model(tracker.backend(), run_id, &options.model_path)?;

    tracker.with_run(RunOptions::resume(run_id), |run| {
        info!("Preprocessing the calibration data");
        let preprocessor = model.preprocessor().boxed_clone();
        let x_prep = preprocessor.transform(x)?;

        let mut calibrated = CalibratedClassifier::prefit(model.estimator().boxed_clone(), options.method);
        calibrated.fit(&x_prep, y)?;

        let mut data = vec![EvaluationSet::new("test", x_prep, y.clone())];
        let evaluation = evaluate_calibration(&calibrated, &mut data, temp_dir.path(), renderer)?;

        let params: BTreeMap<String, String> = BTreeMap::new();
        let mut tags = BTreeMap::new();
        tags.insert("estimator_calibrated".to_string(), "true".to_string());

        let mut calibrated_model = make_pipeline(preprocessor, Box::new(calibrated));
        if let Some(t) = model.tags() {
            calibrated_model = calibrated_model.with_tags(t.clone().with_tree_based(false));
        }

        let log = ModelLog::new()
            .with_artifact_path(options.calibrated_path.clone())
            .with_data(TrackData {
                params: params.clone(),
                metrics: evaluation.metrics.clone(),
                tags: tags.clone(),
                artifacts: evaluation.artifacts.clone(),
                artifact_dirs: BTreeMap::new(),
            });
        run.log_model(&calibrated_model, &log)?;

        Ok(CalibrationOutput {
            model: calibrated_model,
            params,
            tags,
            metrics: evaluation.metrics,
            artifacts: artifact_locations(&evaluation.artifacts),
        })
    })
}
