//! Hyperparameter Search Example
//!
//! Trains a random forest on synthetic data with a small search, logs every
//! trial to a local tracking directory and calibrates the best model.

use myautoml::calibration::CalibrationMethod;
use myautoml::data::train_test_split;
use myautoml::evaluation::EvaluationOptions;
use myautoml::model::{BuiltinEstimator, ColumnPreprocessor};
use myautoml::optimizer::{ParamValue, SearchSpace};
use myautoml::tracking::Tracker;
use myautoml::train::{TrainData, TrainOptions, Trainer};
use ndarray::Array1;
use polars::prelude::*;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "myautoml=info".into()),
        )
        .init();

    // Two noisy numeric features and one categorical
    let n = 400;
    let x1: Vec<f64> = (0..n).map(|i| (i as f64 / 20.0).cos() + rand_simple(i)).collect();
    let x2: Vec<f64> = (0..n).map(|i| (i as f64 / 20.0).sin() + rand_simple(i + 100)).collect();
    let segment: Vec<&str> = (0..n).map(|i| ["a", "b", "c"][i % 3]).collect();
    let y: Vec<f64> = x1
        .iter()
        .zip(x2.iter())
        .map(|(a, b)| if *a + *b > 0.8 { 1.0 } else { 0.0 })
        .collect();

    let x = df!("x1" => &x1, "x2" => &x2, "segment" => &segment)?;
    let split = train_test_split(&x, &Array1::from_vec(y), 0.25, true, 1)?;
    println!("Dataset: {} train / {} test rows\n", split.x_train.height(), split.x_test.height());

    let space = SearchSpace::new()
        .quniform("n_estimators", 10.0, 60.0, 10.0)
        .quniform("max_depth", 2.0, 8.0, 1.0)
        .choice(
            "max_features",
            vec![ParamValue::from("sqrt"), ParamValue::from("log2")],
        );

    let options = TrainOptions::default()
        .with_experiment("synthetic")
        .with_search_space(space)
        .with_max_evals(10)
        .with_evaluation(EvaluationOptions::default().with_cv_folds(3))
        .with_shap_analysis(true)
        .with_calibration(CalibrationMethod::Sigmoid);

    let tracking_dir = tempfile::tempdir()?;
    let tracker = Tracker::from_uri(tracking_dir.path().to_str().unwrap_or("mlruns"))?;
    let mut trainer = Trainer::new(tracker);

    println!("Running hyperparameter search (10 trials)...\n");
    let output = trainer.train_binary_classifier(
        &TrainData::from(split),
        Some(Box::new(ColumnPreprocessor::new())),
        &BuiltinEstimator::RandomForest,
        &options,
    )?;

    println!("{:<8} {:>10}", "Trial", "Loss");
    for trial in &output.trials {
        println!("{:<8} {:>10.4}", trial.number.unwrap_or_default(), trial.loss);
    }

    println!("\nBest parameters:");
    for (name, value) in &output.params {
        println!("  {:<28} {}", name, value);
    }
    println!("\nTest metrics:");
    for (name, value) in output.metrics.iter().filter(|(k, _)| k.ends_with("_test")) {
        println!("  {:<28} {:.4}", name, value);
    }
    if let Some(calibration) = &output.calibration {
        for (name, value) in &calibration.metrics {
            println!("  {:<28} {:.4}", name, value);
        }
    }
    println!("\nArtifacts: {}", output.artifacts.len());
    println!("Tracking data in {}", tracking_dir.path().display());

    Ok(())
}

/// Deterministic noise in [-0.5, 0.5)
fn rand_simple(seed: usize) -> f64 {
    let x = ((seed as u64).wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407) >> 33) as f64;
    (x / (1u64 << 31) as f64) - 0.5
}
