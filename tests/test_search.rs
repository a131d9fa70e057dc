//! Integration test: hyperparameter search and interruption

use myautoml::error::AutoMLError;
use myautoml::evaluation::EvaluationOptions;
use myautoml::model::{BuiltinEstimator, Estimator, EstimatorFactory, EstimatorTags};
use myautoml::optimizer::{HyperOpt, OptimizationConfig, ParamMap, SearchSpace, TrialOutcome};
use myautoml::tracking::{Run, RunStatus, Tracker};
use myautoml::train::{Interrupt, TrainData, TrainOptions, Trainer, USER_INTERRUPTED_TAG};
use ndarray::Array1;
use polars::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

fn data(n: usize) -> TrainData {
    let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 3) % 4) as f64).collect();
    let y: Array1<f64> = (0..n).map(|i| if i >= n / 2 { 1.0 } else { 0.0 }).collect();
    let x = df!("a" => &a, "b" => &b).unwrap();
    TrainData::new(x.clone(), y.clone(), x, y)
}

fn options(max_evals: usize) -> TrainOptions {
    TrainOptions::default()
        .with_experiment("search")
        .with_evaluation(EvaluationOptions::default().with_cv_folds(2).with_plots(vec![]))
        .with_search_space(SearchSpace::new().quniform("max_depth", 1.0, 5.0, 1.0))
        .with_max_evals(max_evals)
}

/// Raises the interrupt when the estimator of trial `at` is built
struct InterruptingFactory {
    inner: BuiltinEstimator,
    interrupt: Interrupt,
    builds: AtomicUsize,
    at: usize,
}

impl EstimatorFactory for InterruptingFactory {
    fn build(&self, params: &ParamMap) -> myautoml::Result<Box<dyn Estimator>> {
        if self.builds.fetch_add(1, Ordering::SeqCst) == self.at {
            self.interrupt.trigger();
        }
        self.inner.build(params)
    }

    fn tags(&self) -> EstimatorTags {
        self.inner.tags()
    }
}

/// Every run stored for an experiment in a local tracking directory
fn stored_runs(root: &Path, experiment_id: &str) -> Vec<Run> {
    std::fs::read_dir(root.join(experiment_id))
        .unwrap()
        .map(|entry| entry.unwrap().path().join("run.json"))
        .filter(|path| path.is_file())
        .map(|path| serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap())
        .collect()
}

#[test]
fn test_hyperopt_runs_max_evals_trials() {
    let space = SearchSpace::new()
        .uniform("x", -2.0, 2.0)
        .group("inner", SearchSpace::new().randint("k", 0, 3));
    let config = OptimizationConfig::default().with_max_evals(12).with_random_state(7);
    let mut hyperopt: HyperOpt<f64> = HyperOpt::new(config, space);

    hyperopt
        .optimize(|_, params| {
            let x = myautoml::optimizer::lookup_path(params, "x").and_then(|v| v.as_f64()).unwrap();
            Ok(TrialOutcome { loss: x * x, result: x })
        })
        .unwrap();

    let study = hyperopt.study();
    assert_eq!(study.len(), 12);
    let best = study.best_trial().unwrap();
    assert!(study.trials().iter().all(|t| t.loss >= best.loss));
    assert!(study.trials().iter().enumerate().all(|(i, t)| t.number == i));
}

#[test]
fn test_objective_error_keeps_completed_trials() {
    let space = SearchSpace::new().uniform("x", 0.0, 1.0);
    let mut hyperopt: HyperOpt<()> = HyperOpt::new(OptimizationConfig::default().with_max_evals(10), space);

    let result = hyperopt.optimize(|number, _| {
        if number == 3 {
            Err(AutoMLError::Interrupted)
        } else {
            Ok(TrialOutcome { loss: number as f64, result: () })
        }
    });

    assert!(matches!(result, Err(AutoMLError::Interrupted)));
    assert_eq!(hyperopt.study().len(), 3);
    assert_eq!(hyperopt.study().best_trial().unwrap().number, 0);
}

#[test]
fn test_empty_space_is_rejected() {
    let mut hyperopt: HyperOpt<()> = HyperOpt::new(OptimizationConfig::default(), SearchSpace::new());
    let result = hyperopt.optimize(|_, _| Ok(TrialOutcome { loss: 0.0, result: () }));
    assert!(matches!(result, Err(AutoMLError::OptimizationError(_))));
}

#[test]
fn test_empty_space_trains_a_single_fit() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Tracker::from_uri(dir.path().join("mlruns").to_str().unwrap()).unwrap();
    let mut trainer = Trainer::new(tracker);

    let output = trainer
        .train_binary_classifier(
            &data(24),
            None,
            &BuiltinEstimator::DecisionTree,
            &options(4).with_search_space(SearchSpace::new()),
        )
        .unwrap();

    assert!(output.trials.is_empty());
    assert!(!output.interrupted);
    assert!(output.metrics.contains_key("roc_auc_cv"));
}

#[test]
fn test_interrupt_mid_search_returns_best_so_far() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Tracker::from_uri(dir.path().join("mlruns").to_str().unwrap()).unwrap();
    let interrupt = Interrupt::new();
    let mut trainer = Trainer::new(tracker).with_interrupt(interrupt.clone());

    let factory = InterruptingFactory {
        inner: BuiltinEstimator::DecisionTree,
        interrupt: interrupt.clone(),
        builds: AtomicUsize::new(0),
        at: 2,
    };
    let output = trainer.train_binary_classifier(&data(24), None, &factory, &options(6)).unwrap();

    assert!(output.interrupted);
    assert!(!interrupt.is_triggered());
    assert_eq!(output.trials.len(), 2);
    let best_loss = output.trials.iter().map(|t| t.loss).fold(f64::INFINITY, f64::min);
    assert!((1.0 - output.metrics["roc_auc_cv"] - best_loss).abs() < 1e-12);

    let parent = trainer.tracker().backend().get_run(&output.run_id).unwrap();
    assert_eq!(parent.info.status, RunStatus::Finished);
    assert!(!parent.data.tags.contains_key(USER_INTERRUPTED_TAG));

    let runs = stored_runs(&dir.path().join("mlruns"), &parent.info.experiment_id);
    assert_eq!(runs.len(), 4);
    let killed: Vec<&Run> = runs.iter().filter(|r| r.info.status == RunStatus::Killed).collect();
    assert_eq!(killed.len(), 1);
    assert_eq!(killed[0].data.tags.get(USER_INTERRUPTED_TAG).map(String::as_str), Some("true"));
    assert_eq!(killed[0].info.run_name.as_deref(), Some("2"));
    for trial in &output.trials {
        let run = runs.iter().find(|r| r.info.run_id == trial.run_id).unwrap();
        assert_eq!(run.info.status, RunStatus::Finished);
        assert!(!run.data.tags.contains_key(USER_INTERRUPTED_TAG));
    }
}

#[test]
fn test_trainer_runs_again_after_an_interrupted_search() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Tracker::from_uri(dir.path().join("mlruns").to_str().unwrap()).unwrap();
    let interrupt = Interrupt::new();
    let mut trainer = Trainer::new(tracker).with_interrupt(interrupt.clone());

    let factory = InterruptingFactory {
        inner: BuiltinEstimator::DecisionTree,
        interrupt: interrupt.clone(),
        builds: AtomicUsize::new(0),
        at: 1,
    };
    let first = trainer.train_binary_classifier(&data(24), None, &factory, &options(6)).unwrap();
    assert!(first.interrupted);
    assert_eq!(first.trials.len(), 1);

    let second = trainer
        .train_binary_classifier(&data(24), None, &BuiltinEstimator::DecisionTree, &options(3))
        .unwrap();
    assert!(!second.interrupted);
    assert_eq!(second.trials.len(), 3);
}

#[test]
fn test_interrupted_single_fit_clears_the_flag() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Tracker::from_uri(dir.path().join("mlruns").to_str().unwrap()).unwrap();
    let interrupt = Interrupt::new();
    let mut trainer = Trainer::new(tracker).with_interrupt(interrupt.clone());
    let single_fit = TrainOptions::default()
        .with_experiment("single")
        .with_evaluation(EvaluationOptions::default().with_cv_folds(2).with_plots(vec![]));

    interrupt.trigger();
    let result = trainer.train_binary_classifier(&data(24), None, &BuiltinEstimator::DecisionTree, &single_fit);
    assert!(matches!(result, Err(AutoMLError::Interrupted)));
    assert!(!interrupt.is_triggered());

    let output = trainer
        .train_binary_classifier(&data(24), None, &BuiltinEstimator::DecisionTree, &single_fit)
        .unwrap();
    assert!(output.metrics.contains_key("roc_auc_test"));
}

#[test]
fn test_trials_log_their_own_models() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Tracker::from_uri(dir.path().join("mlruns").to_str().unwrap()).unwrap();
    let mut trainer = Trainer::new(tracker);

    let output = trainer
        .train_binary_classifier(&data(24), None, &BuiltinEstimator::DecisionTree, &options(2))
        .unwrap();

    for trial in &output.trials {
        let model = myautoml::tracking::get_model(trainer.tracker().backend(), &trial.run_id, "model").unwrap();
        assert_eq!(model.predict(&data(24).x_test).unwrap().len(), 24);
    }
}
