//! myautoml CLI
//!
//! Registering saved models, training built-in estimators from a data file and
//! clearing the result cache.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::error;

use crate::cache::{delete_cache, CacheConfig};
use crate::config::Settings;
use crate::data::{load_data, split_target, train_test_split};
use crate::model::{BuiltinEstimator, ColumnPreprocessor};
use crate::tracking::{register_model, track_model_data, track_model_from_file, ModelLog, TrackData, Tracker};
use crate::train::{Interrupt, TrainData, TrainOptions, Trainer};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<22} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "myautoml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automated training, evaluation and tracking of binary classifiers")]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file merged over the built-in defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a saved model to the tracking server, optionally registering it
    RegisterModel {
        /// Experiment name in the tracking server
        #[arg(short = 'e', long = "experiment_name")]
        experiment_name: Option<String>,

        /// Path to the trained model file
        #[arg(short = 'm', long = "model_path")]
        model_path: Option<PathBuf>,

        /// Name to register the model with
        #[arg(short = 'n', long = "model_name")]
        model_name: Option<String>,

        /// Tracking server URI or local directory
        #[arg(long)]
        tracking_uri: Option<String>,
    },

    /// Train a built-in estimator on a data file
    Train {
        /// CSV, JSON or Parquet file
        #[arg(short, long)]
        data: PathBuf,

        /// 0/1 target column
        #[arg(short, long)]
        target: String,

        /// decision_tree, random_forest or logistic_regression
        #[arg(long)]
        estimator: Option<String>,

        /// Number of search trials
        #[arg(long)]
        max_evals: Option<usize>,

        #[arg(short = 'e', long)]
        experiment_name: Option<String>,

        #[arg(long)]
        tracking_uri: Option<String>,

        /// Run feature attribution on the best model
        #[arg(long)]
        shap: bool,

        /// Calibrate the best model on the test data
        #[arg(long)]
        calibrate: bool,
    },

    /// Remove the result cache
    DeleteCache {
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

/// Dispatch a parsed command
pub fn run(cli: Cli, settings: &Settings, interrupt: &Interrupt) -> anyhow::Result<()> {
    match cli.command {
        Commands::RegisterModel { experiment_name, model_path, model_name, tracking_uri } => {
            let uri = tracking_uri.unwrap_or_else(|| settings.experiment.tracking_uri.clone());
            cmd_register_model(&uri, experiment_name.as_deref(), model_path.as_deref(), model_name.as_deref());
            Ok(())
        }
        Commands::Train { data, target, estimator, max_evals, experiment_name, tracking_uri, shap, calibrate } => {
            let mut settings = settings.clone();
            if let Some(name) = estimator {
                settings.training.estimator = name.parse()?;
            }
            if let Some(n) = max_evals {
                settings.training.max_evals = n;
            }
            if let Some(name) = experiment_name {
                settings.experiment.name = name;
            }
            if let Some(uri) = tracking_uri {
                settings.experiment.tracking_uri = uri;
            }
            settings.evaluation.shap_analysis |= shap;
            settings.calibration.calibrate |= calibrate;
            cmd_train(&data, &target, &settings, interrupt)
        }
        Commands::DeleteCache { cache_dir } => {
            let config = match cache_dir {
                Some(dir) => CacheConfig::new(dir),
                None => CacheConfig::from_settings(&settings.cache),
            };
            delete_cache(&config)?;
            println!("  {} {}", ok("✓"), format!("Deleted {}", config.cache_dir.display()));
            Ok(())
        }
    }
}

/// Upload a model file and print the run and registered-model URLs.
///
/// Failures are logged; the command itself always succeeds.
pub fn cmd_register_model(
    tracking_uri: &str,
    experiment_name: Option<&str>,
    model_path: Option<&Path>,
    model_name: Option<&str>,
) {
    let experiment_name = experiment_name.unwrap_or("Default");
    let Some(model_path) = model_path else {
        println!("{}", "No model specified to upload!".red().bold());
        return;
    };
    if let Err(e) = register_from_file(tracking_uri, experiment_name, model_path, model_name) {
        error!("Registering model failed: {}", e);
    }
}

fn register_from_file(
    tracking_uri: &str,
    experiment_name: &str,
    model_path: &Path,
    model_name: Option<&str>,
) -> crate::error::Result<()> {
    let mut tracker = Tracker::from_uri(tracking_uri)?;

    println!("{}", "Uploading model to the tracking server".green().bold());
    let run_info = track_model_from_file(&mut tracker, model_path, experiment_name, None, &ModelLog::new())?;
    track_model_data(tracker.backend(), &run_info.run_id, &TrackData::new().with_tag("cli_upload", "true"))?;
    let experiment_run_url = format!(
        "{}/#/experiments/{}/runs/{}",
        tracker.tracking_uri(),
        run_info.experiment_id,
        run_info.run_id
    );

    let registered_model_url = match model_name {
        Some(name) => {
            println!("{}", "Registering model with the tracking server".green().bold());
            let version = register_model(tracker.backend(), &run_info.run_id, name, "model")?;
            format!("{}/#/models/{}/versions/{}", tracker.tracking_uri(), name, version.version)
        }
        None => {
            println!("{}", "No name specified to register the model!".white().bold());
            String::new()
        }
    };

    println!("Experiment run URL: {}", experiment_run_url);
    println!("Registered model URL: {}", registered_model_url);
    Ok(())
}

pub fn cmd_train(data_path: &Path, target: &str, settings: &Settings, interrupt: &Interrupt) -> anyhow::Result<()> {
    section("Train");

    step_run("Loading data");
    let start = Instant::now();
    let df = load_data(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    let (x, y) = split_target(&df, target)?;
    let split = train_test_split(&x, &y, settings.training.test_size, true, settings.training.random_state)?;
    let data = TrainData::from(split);

    let estimator: BuiltinEstimator = settings.training.estimator;
    let options = TrainOptions::from_settings(settings)?;
    let tracker = Tracker::from_uri(&settings.experiment.tracking_uri)?;
    let mut trainer = Trainer::new(tracker).with_interrupt(interrupt.clone());

    step_run(&format!("Training {}", format!("{:?}", estimator).cyan()));
    let start = Instant::now();
    let output = trainer.train_binary_classifier(&data, Some(Box::new(ColumnPreprocessor::new())), &estimator, &options)?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    kv("Run", &output.run_id);
    if !output.trials.is_empty() {
        let trials = if output.interrupted {
            format!("{} (interrupted)", output.trials.len())
        } else {
            output.trials.len().to_string()
        };
        kv("Trials", &trials);
    }
    for (name, value) in &output.metrics {
        if name.ends_with("_cv") || name.ends_with("_test") {
            kv(name, &format!("{:.4}", value));
        }
    }
    if let Some(calibration) = &output.calibration {
        for (name, value) in &calibration.metrics {
            kv(name, &format!("{:.4}", value));
        }
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_register_model_flags() {
        let cli = Cli::parse_from(["myautoml", "register-model", "-e", "titanic", "-m", "model.json", "-n", "churn"]);
        match cli.command {
            Commands::RegisterModel { experiment_name, model_path, model_name, tracking_uri } => {
                assert_eq!(experiment_name.as_deref(), Some("titanic"));
                assert_eq!(model_path, Some(PathBuf::from("model.json")));
                assert_eq!(model_name.as_deref(), Some("churn"));
                assert!(tracking_uri.is_none());
            }
            _ => panic!("expected register-model"),
        }
    }

    #[test]
    fn test_register_model_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        cmd_register_model(
            dir.path().join("mlruns").to_str().unwrap(),
            None,
            Some(&missing),
            Some("churn"),
        );
    }
}
