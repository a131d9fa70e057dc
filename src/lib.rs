//! myautoml - automated training of binary classifiers
//!
//! This crate provides:
//! - Hyperparameter search over nested search spaces
//! - Evaluation with cross-validated metrics, plots and feature attributions
//! - Probability calibration of trained models
//! - Experiment tracking and a model registry, locally or on an MLflow server
//!
//! # Modules
//!
//! ## Core
//! - [`train`] - Search, fit, evaluate and log a binary classifier
//! - [`optimizer`] - Search spaces, samplers and the trial loop
//! - [`model`] - Built-in estimators, preprocessing and pipelines
//! - [`evaluation`] - Metrics, cross-validation and SHAP-like attributions
//! - [`calibration`] - Platt and isotonic calibration
//!
//! ## Infrastructure
//! - [`tracking`] - Runs, artifacts and the model registry
//! - [`visualisation`] - Figures and SVG rendering
//! - [`cache`] - Disk-backed result cache
//! - [`config`] - Layered YAML configuration
//! - [`logging`] - `tracing` subscriber setup
//! - [`data`] - Loading and splitting tabular data
//!
//! ## Services
//! - [`cli`] - Command-line interface

pub mod error;

pub mod config;
pub mod logging;
pub mod data;

pub mod model;
pub mod optimizer;
pub mod evaluation;
pub mod visualisation;
pub mod calibration;
pub mod train;

pub mod tracking;
pub mod cache;

pub mod cli;

pub use error::{AutoMLError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{AutoMLError, Result};

    pub use crate::config::{load_config, Settings};

    pub use crate::data::{load_data, split_target, train_test_split, TrainTestSplit};

    pub use crate::model::{
        make_pipeline, BuiltinEstimator, ColumnPreprocessor, Estimator, EstimatorFactory, Pipeline, Preprocessor,
    };

    pub use crate::optimizer::{HyperOpt, OptimizationConfig, ParamMap, ParamTree, ParamValue, SearchSpace};

    pub use crate::evaluation::{evaluate_binary_classifier, EvaluationOptions, EvaluationSet};

    pub use crate::visualisation::{PlotKind, PlotRenderer, SvgRenderer};

    pub use crate::calibration::{calibrate_model, CalibrationMethod, CalibrationOptions};

    pub use crate::tracking::{get_registered_model, register_model, ModelLog, RunOptions, TrackData, Tracker};

    pub use crate::cache::{CacheConfig, ResultCache};

    pub use crate::train::{Interrupt, TrainData, TrainOptions, TrainOutput, Trainer};
}
