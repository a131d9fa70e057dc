//! Integration test: calibrating a tracked model

use myautoml::calibration::{calibrate_model, CalibrationMethod, CalibrationOptions};
use myautoml::evaluation::EvaluationOptions;
use myautoml::model::BuiltinEstimator;
use myautoml::optimizer::{ParamMap, ParamValue};
use myautoml::tracking::{get_model, Tracker};
use myautoml::train::{TrainData, TrainOptions, Trainer};
use myautoml::visualisation::SvgRenderer;
use ndarray::Array1;
use polars::prelude::*;

/// Overlapping classes so probabilities are not all 0 or 1
fn noisy(n: usize, offset: usize) -> (DataFrame, Array1<f64>) {
    let a: Vec<f64> = (0..n).map(|i| ((i + offset) % 17) as f64).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 5 + offset) % 11) as f64).collect();
    let y: Array1<f64> = a
        .iter()
        .zip(&b)
        .enumerate()
        .map(|(i, (a, b))| if a + b > 12.0 || i % 7 == 0 { 1.0 } else { 0.0 })
        .collect();
    (df!("a" => &a, "b" => &b).unwrap(), y)
}

fn train(calibrate: Option<CalibrationMethod>) -> (tempfile::TempDir, Trainer, myautoml::train::TrainOutput) {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Tracker::from_uri(dir.path().join("mlruns").to_str().unwrap()).unwrap();
    let mut trainer = Trainer::new(tracker);

    let (x_train, y_train) = noisy(80, 0);
    let (x_test, y_test) = noisy(40, 3);
    let mut params = ParamMap::new();
    params.insert("max_depth".to_string(), ParamValue::Int(3));
    let mut options = TrainOptions::default()
        .with_experiment("calibration")
        .with_estimator_params(params)
        .with_evaluation(EvaluationOptions::default().with_cv_folds(2).with_plots(vec![]));
    if let Some(method) = calibrate {
        options = options.with_calibration(method);
    }

    let output = trainer
        .train_binary_classifier(
            &TrainData::new(x_train, y_train, x_test, y_test),
            None,
            &BuiltinEstimator::DecisionTree,
            &options,
        )
        .unwrap();
    (dir, trainer, output)
}

#[test]
fn test_training_with_calibration_logs_calibrated_model() {
    let (_dir, trainer, output) = train(Some(CalibrationMethod::Sigmoid));
    let calibration = output.calibration.as_ref().unwrap();

    assert_eq!(calibration.tags["estimator_calibrated"], "true");
    assert!(calibration.metrics.keys().all(|k| k.starts_with("calibrated_")));
    assert!(calibration.metrics.contains_key("calibrated_roc_auc_test"));
    assert!(calibration.artifacts.iter().any(|a| a.ends_with("calibration_curve.svg")));
    assert!(!calibration.model.tags().unwrap().tree_based);

    let backend = trainer.tracker().backend();
    let run = backend.get_run(&output.run_id).unwrap();
    assert!(run.data.metrics.contains_key("calibrated_roc_auc_test"));
    assert!(run.data.metrics.contains_key("roc_auc_test"));

    let reloaded = get_model(backend, &output.run_id, "model_calibrated").unwrap();
    let (x, _) = noisy(40, 3);
    let proba = reloaded.predict_proba(&x).unwrap();
    assert!(proba.column(1).iter().all(|p| (0.0..=1.0).contains(p)));
    for row in proba.rows() {
        assert!((row[0] + row[1] - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_calibrated_plots_sit_beside_the_originals() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Tracker::from_uri(dir.path().join("mlruns").to_str().unwrap()).unwrap();
    let mut trainer = Trainer::new(tracker);
    let (x_train, y_train) = noisy(80, 0);
    let (x_test, y_test) = noisy(40, 3);
    let options = TrainOptions::default()
        .with_experiment("calibration_plots")
        .with_evaluation(EvaluationOptions::default().with_cv_folds(2))
        .with_calibration(CalibrationMethod::Sigmoid);

    let output = trainer
        .train_binary_classifier(
            &TrainData::new(x_train, y_train, x_test, y_test),
            None,
            &BuiltinEstimator::DecisionTree,
            &options,
        )
        .unwrap();

    let calibration = output.calibration.as_ref().unwrap();
    assert!(output.artifacts.contains(&"evaluation/roc.svg".to_string()));
    assert!(calibration.artifacts.contains(&"evaluation/calibrated_roc.svg".to_string()));

    let out = tempfile::tempdir().unwrap();
    let backend = trainer.tracker().backend();
    for path in ["evaluation/roc.svg", "evaluation/calibrated_roc.svg", "evaluation/calibrated_calibration_curve.svg"] {
        assert!(backend.download_artifact(&output.run_id, path, out.path()).unwrap().is_file());
    }
}

#[test]
fn test_isotonic_calibration_of_stored_model() {
    let (_dir, trainer, output) = train(None);
    assert!(output.calibration.is_none());

    let (x, y) = noisy(40, 3);
    let options = CalibrationOptions::default().with_method(CalibrationMethod::Isotonic);
    let calibration = calibrate_model(trainer.tracker(), &output.run_id, &x, &y, &SvgRenderer::new(), &options).unwrap();

    let proba = calibration.model.predict_proba(&x).unwrap();
    assert!(proba.column(1).iter().all(|p| (0.0..=1.0).contains(p)));

    // calibration keeps the original model in place
    let original = get_model(trainer.tracker().backend(), &output.run_id, "model").unwrap();
    assert_eq!(original.predict(&x).unwrap(), output.model.predict(&x).unwrap());
}

#[test]
fn test_calibrating_unknown_model_path_fails() {
    let (_dir, trainer, output) = train(None);
    let (x, y) = noisy(40, 3);
    let options = CalibrationOptions {
        model_path: "missing".to_string(),
        ..CalibrationOptions::default()
    };
    let result = calibrate_model(trainer.tracker(), &output.run_id, &x, &y, &SvgRenderer::new(), &options);
    assert!(result.is_err());
}
