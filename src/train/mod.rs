//! Training with hyperparameter search
//!
//! [`Trainer::train_binary_classifier`] fits a preprocessor once, then either
//! fits the estimator with fixed parameters or searches the parameter space,
//! logging every trial as a nested tracking run. The best trial is logged to
//! the parent run, optionally with feature attributions, and can be calibrated
//! on the test data afterwards.

mod interrupt;

pub use interrupt::Interrupt;

use crate::calibration::{calibrate_model, CalibrationMethod, CalibrationOptions, CalibrationOutput};
use crate::config::Settings;
use crate::error::{AutoMLError, Result};
use crate::evaluation::shap::{shap_analyse, Explainer, TreePathExplainer};
use crate::evaluation::{evaluate_binary_classifier, EvaluationOptions, EvaluationSet};
use crate::model::{make_pipeline, EstimatorFactory, EstimatorTags, Passthrough, Pipeline, Preprocessor};
use crate::optimizer::{
    flatten_params, merge_params, prep_params, HyperOpt, OptimizationConfig, ParamMap, SearchSpace, TrialOutcome,
};
use crate::tracking::{artifact_locations, ActiveRun, ModelLog, RunOptions, TrackData, Tracker};
use crate::visualisation::{PlotKind, PlotRenderer, SvgRenderer};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tag set on a trial run stopped by the user
pub const USER_INTERRUPTED_TAG: &str = "UserInterrupted";

/// Raw training and test partitions
#[derive(Debug, Clone)]
pub struct TrainData {
    pub x_train: DataFrame,
    pub y_train: Array1<f64>,
    pub x_test: DataFrame,
    pub y_test: Array1<f64>,
}

impl TrainData {
    pub fn new(x_train: DataFrame, y_train: Array1<f64>, x_test: DataFrame, y_test: Array1<f64>) -> Self {
        Self {
            x_train,
            y_train,
            x_test,
            y_test,
        }
    }
}

impl From<crate::data::TrainTestSplit> for TrainData {
    fn from(split: crate::data::TrainTestSplit) -> Self {
        Self::new(split.x_train, split.y_train, split.x_test, split.y_test)
    }
}

/// What to train and how to search
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub experiment_name: String,
    /// Fixed parameters, search samples are merged over them
    pub estimator_params: ParamMap,
    /// Without a space, or with one that has no dimensions, a single fit
    /// with `estimator_params` is done
    pub search_space: Option<SearchSpace>,
    pub optimization: OptimizationConfig,
    /// Metric maximised by the search, e.g. `roc_auc_cv`
    pub primary_metric: String,
    pub evaluation: EvaluationOptions,
    pub shap_analysis: bool,
    pub calibrate: bool,
    pub calibration_method: CalibrationMethod,
    pub registered_model_name: Option<String>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            experiment_name: "Default".to_string(),
            estimator_params: ParamMap::new(),
            search_space: None,
            optimization: OptimizationConfig::default(),
            primary_metric: "roc_auc_cv".to_string(),
            evaluation: EvaluationOptions::default(),
            shap_analysis: false,
            calibrate: false,
            calibration_method: CalibrationMethod::Sigmoid,
            registered_model_name: None,
        }
    }
}

impl TrainOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let training = &settings.training;
        let evaluation = &settings.evaluation;
        Ok(Self {
            experiment_name: settings.experiment.name.clone(),
            estimator_params: training.estimator_params.clone(),
            search_space: training.search_space.clone(),
            optimization: OptimizationConfig::default()
                .with_max_evals(training.max_evals)
                .with_sampler(training.sampler)
                .with_random_state(training.random_state),
            primary_metric: evaluation.primary_metric.clone(),
            evaluation: EvaluationOptions::default()
                .with_cv_folds(evaluation.cv_folds)
                .with_plots(PlotKind::parse_list(&evaluation.plots)?),
            shap_analysis: evaluation.shap_analysis,
            calibrate: settings.calibration.calibrate,
            calibration_method: settings.calibration.method,
            registered_model_name: settings.experiment.registered_model_name.clone(),
        })
    }

    pub fn with_experiment(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    pub fn with_estimator_params(mut self, params: ParamMap) -> Self {
        self.estimator_params = params;
        self
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = Some(space);
        self
    }

    pub fn with_max_evals(mut self, max_evals: usize) -> Self {
        self.optimization.max_evals = max_evals;
        self
    }

    pub fn with_primary_metric(mut self, metric: impl Into<String>) -> Self {
        self.primary_metric = metric.into();
        self
    }

    pub fn with_evaluation(mut self, evaluation: EvaluationOptions) -> Self {
        self.evaluation = evaluation;
        self
    }

    pub fn with_shap_analysis(mut self, enabled: bool) -> Self {
        self.shap_analysis = enabled;
        self
    }

    pub fn with_calibration(mut self, method: CalibrationMethod) -> Self {
        self.calibrate = true;
        self.calibration_method = method;
        self
    }
}

/// One fit-and-evaluate cycle
#[derive(Debug, Clone)]
pub struct TrialRecord {
    /// Trial index, `None` for a fixed-parameter fit
    pub number: Option<usize>,
    /// Tracking run the trial was logged to
    pub run_id: String,
    pub model: Pipeline,
    /// `estimator_<name>` → value
    pub params: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Local plot files → artifact directory, valid while training runs
    files: BTreeMap<PathBuf, String>,
    /// `1 - metrics[primary_metric]`
    pub loss: f64,
}

impl TrialRecord {
    /// Artifact paths inside the run
    pub fn artifacts(&self) -> Vec<String> {
        artifact_locations(&self.files)
    }
}

/// Best model of a training call and everything logged with it
#[derive(Debug, Clone)]
pub struct TrainOutput {
    /// Parent run
    pub run_id: String,
    pub model: Pipeline,
    pub params: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Artifact paths inside the parent run
    pub artifacts: Vec<String>,
    /// Completed trials in order, empty without a search space
    pub trials: Vec<TrialRecord>,
    /// The search was stopped before `max_evals` trials
    pub interrupted: bool,
    pub calibration: Option<CalibrationOutput>,
}

/// Features after preprocessing
struct Prepared<'a> {
    preprocessor: &'a dyn Preprocessor,
    x_train: Array2<f64>,
    y_train: &'a Array1<f64>,
    x_test: Array2<f64>,
    y_test: &'a Array1<f64>,
}

/// Runs training calls against one tracker
pub struct Trainer {
    tracker: Tracker,
    renderer: Box<dyn PlotRenderer>,
    explainer: Box<dyn Explainer>,
    interrupt: Interrupt,
}

impl Trainer {
    pub fn new(tracker: Tracker) -> Self {
        Self {
            tracker,
            renderer: Box::new(SvgRenderer::new()),
            explainer: Box::new(TreePathExplainer),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn PlotRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_explainer(mut self, explainer: Box<dyn Explainer>) -> Self {
        self.explainer = explainer;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Train a binary classifier and log the best model.
    ///
    /// Without a preprocessor the raw columns are used as numeric features.
    /// An interruption during the search keeps the trials completed so far
    /// and returns the best of them; it fails with
    /// [`AutoMLError::NoCompletedTrials`] when there is none. The interrupt is
    /// cleared once handled, so the trainer can be used again.
    pub fn train_binary_classifier(
        &mut self,
        data: &TrainData,
        preprocessor: Option<Box<dyn Preprocessor>>,
        factory: &dyn EstimatorFactory,
        options: &TrainOptions,
    ) -> Result<TrainOutput> {
        let temp_dir = tempfile::tempdir()?;
        debug!("Creating temporary directory: '{}'", temp_dir.path().display());
        debug!("Setting experiment: '{}'", options.experiment_name);
        self.tracker.set_experiment(&options.experiment_name)?;

        let mut preprocessor = preprocessor.unwrap_or_else(|| Box::new(Passthrough::new()));
        let tags = factory.tags();

        debug!("Starting the parent run");
        let result = self.tracker.with_run(RunOptions::default(), |run| {
            info!("Fitting the preprocessor");
            preprocessor.fit(&data.x_train, &data.y_train)?;
            info!("Preprocessing the training data");
            let prepared = Prepared {
                preprocessor: preprocessor.as_ref(),
                x_train: preprocessor.transform(&data.x_train)?,
                y_train: &data.y_train,
                x_test: preprocessor.transform(&data.x_test)?,
                y_test: &data.y_test,
            };

            let space = options.search_space.as_ref().filter(|space| !space.is_empty());
            let (mut best, trials, interrupted) = match space {
                None => {
                    let record = self.fit_and_evaluate(
                        run,
                        None,
                        &options.estimator_params,
                        factory,
                        &tags,
                        &prepared,
                        temp_dir.path(),
                        options,
                    )?;
                    (record, Vec::new(), false)
                }
                Some(space) => self.search(run, space, factory, &tags, &prepared, temp_dir.path(), options)?,
            };

            if options.shap_analysis {
                self.attribute(&mut best, &data.x_train, &temp_dir.path().join("shap"))?;
            } else {
                info!("Shap analysis skipped");
            }

            let mut log = ModelLog::new().with_data(TrackData {
                params: best.params.clone(),
                metrics: best.metrics.clone(),
                tags: best.tags.clone(),
                artifacts: best.files.clone(),
                artifact_dirs: BTreeMap::new(),
            });
            if let Some(name) = &options.registered_model_name {
                log = log.with_registered_model_name(name.clone());
            }
            run.log_model(&best.model, &log)?;

            Ok(TrainOutput {
                run_id: run.run_id().to_string(),
                artifacts: best.artifacts(),
                model: best.model,
                params: best.params,
                tags: best.tags,
                metrics: best.metrics,
                trials,
                interrupted,
                calibration: None,
            })
        });
        let mut output = match result {
            Ok(output) => output,
            Err(e) => {
                if e.is_interrupted() {
                    // handled here, later calls start clean
                    self.interrupt.reset();
                }
                return Err(e);
            }
        };

        if options.calibrate {
            info!("Calibrating the model on the test data");
            let calibration_options = CalibrationOptions::default().with_method(options.calibration_method);
            output.calibration = Some(calibrate_model(
                &self.tracker,
                &output.run_id,
                &data.x_test,
                &data.y_test,
                self.renderer.as_ref(),
                &calibration_options,
            )?);
        }

        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        run: &ActiveRun,
        space: &SearchSpace,
        factory: &dyn EstimatorFactory,
        tags: &EstimatorTags,
        prepared: &Prepared<'_>,
        temp_dir: &Path,
        options: &TrainOptions,
    ) -> Result<(TrialRecord, Vec<TrialRecord>, bool)> {
        let mut hyperopt: HyperOpt<TrialRecord> = HyperOpt::new(options.optimization.clone(), space.clone());

        let outcome = hyperopt.optimize(|number, sample| {
            let search_params = prep_params(&flatten_params(sample));
            let params = merge_params(&options.estimator_params, &search_params);
            let record = run.with_child_run(&number.to_string(), |trial_run| {
                let result = self.fit_and_evaluate(
                    trial_run,
                    Some(number),
                    &params,
                    factory,
                    tags,
                    prepared,
                    &temp_dir.join(number.to_string()),
                    options,
                );
                if matches!(result, Err(AutoMLError::Interrupted)) {
                    if let Err(e) = trial_run.set_tag(USER_INTERRUPTED_TAG, true) {
                        warn!("Could not tag the interrupted trial: {}", e);
                    }
                }
                result
            })?;
            Ok(TrialOutcome {
                loss: record.loss,
                result: record,
            })
        });

        let interrupted = match outcome {
            Ok(()) => false,
            Err(AutoMLError::Interrupted) => {
                warn!("User interrupted the hyperparameter search");
                self.interrupt.reset();
                true
            }
            Err(e) => return Err(e),
        };

        let study = hyperopt.into_study();
        let trials: Vec<TrialRecord> = study.trials().iter().map(|t| t.result.clone()).collect();
        let best = study.into_best().ok_or(AutoMLError::NoCompletedTrials)?;
        info!(
            "Best trial {} of {} with loss {:.4}",
            best.number,
            trials.len(),
            best.loss
        );
        Ok((best.result, trials, interrupted))
    }

    /// Fit one estimator, evaluate it and, for search trials, log it to the
    /// trial's run
    #[allow(clippy::too_many_arguments)]
    fn fit_and_evaluate(
        &self,
        run: &ActiveRun,
        number: Option<usize>,
        params: &ParamMap,
        factory: &dyn EstimatorFactory,
        tags: &EstimatorTags,
        prepared: &Prepared<'_>,
        temp_dir: &Path,
        options: &TrainOptions,
    ) -> Result<TrialRecord> {
        self.interrupt.check()?;
        std::fs::create_dir_all(temp_dir)?;

        info!("Fitting the estimator");
        let mut estimator = factory.build(params)?;
        estimator.fit(&prepared.x_train, prepared.y_train)?;
        self.interrupt.check()?;

        let mut data = vec![
            EvaluationSet::new("train", prepared.x_train.clone(), prepared.y_train.clone()),
            EvaluationSet::new("test", prepared.x_test.clone(), prepared.y_test.clone()),
        ];
        let evaluation = evaluate_binary_classifier(
            estimator.as_ref(),
            &mut data,
            temp_dir,
            self.renderer.as_ref(),
            &options.evaluation,
        )?;
        self.interrupt.check()?;

        let model = make_pipeline(prepared.preprocessor.boxed_clone(), estimator).with_tags(tags.clone());
        let params: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (format!("estimator_{}", k), v.to_string()))
            .collect();
        let mut record_tags = BTreeMap::new();
        record_tags.insert("estimator_module".to_string(), tags.module.clone());
        record_tags.insert("estimator_class".to_string(), tags.class.clone());

        let loss = evaluation.metric(&options.primary_metric).map(|m| 1.0 - m);

        let mut record = TrialRecord {
            number,
            run_id: run.run_id().to_string(),
            model,
            params,
            tags: record_tags,
            metrics: evaluation.metrics,
            files: evaluation.artifacts,
            loss: loss.unwrap_or(f64::NAN),
        };

        if number.is_some() {
            record.tags.insert("hyperopt".to_string(), "true".to_string());
            let log = ModelLog::new().with_data(TrackData {
                params: record.params.clone(),
                metrics: record.metrics.clone(),
                tags: record.tags.clone(),
                artifacts: record.files.clone(),
                artifact_dirs: BTreeMap::new(),
            });
            run.log_model(&record.model, &log)?;
            if loss.is_none() {
                return Err(AutoMLError::MetricNotFound(options.primary_metric.clone()));
            }
        }

        Ok(record)
    }

    fn attribute(&self, best: &mut TrialRecord, x: &DataFrame, temp_dir: &Path) -> Result<()> {
        let tree_based = best.model.tags().map_or(false, |t| t.tree_based);
        if !tree_based {
            warn!("Shap analysis skipped, the estimator is not tree-based");
            return Ok(());
        }
        info!("Starting shap analysis");
        let analysis = shap_analyse(&best.model, x, temp_dir, self.renderer.as_ref(), self.explainer.as_ref())?;
        best.tags.extend(analysis.tags);
        best.files.extend(analysis.artifacts);
        Ok(())
    }
}
