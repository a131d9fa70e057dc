//! Integration test: metrics, plots and attributions

use myautoml::error::{AutoMLError, Result};
use myautoml::evaluation::metrics::{average_precision_score, roc_auc_score};
use myautoml::evaluation::shap::{shap_analyse, TreePathExplainer};
use myautoml::evaluation::{evaluate_binary_classifier, EvaluationOptions, EvaluationSet};
use myautoml::model::{
    make_pipeline, BuiltinEstimator, Estimator, EstimatorFactory, LogisticRegression,
    Passthrough, Preprocessor,
};
use myautoml::visualisation::{Figure, PlotKind, PlotRenderer, SvgRenderer};
use ndarray::{array, Array1, Array2};
use polars::prelude::*;
use std::path::Path;

fn separable(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
    let y = Array1::from_shape_fn(n, |i| if i >= n / 2 { 1.0 } else { 0.0 });
    (x, y)
}

fn ramp(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64 / 10.0);
    let y = Array1::from_shape_fn(n, |i| if i >= n / 2 { 1.0 } else { 0.0 });
    (x, y)
}

/// SVG renderer that fails for one file stem
struct FailingRenderer {
    inner: SvgRenderer,
    stem: &'static str,
}

impl PlotRenderer for FailingRenderer {
    fn render(&self, figure: &Figure, path: &Path) -> Result<()> {
        if path.file_stem().and_then(|s| s.to_str()) == Some(self.stem) {
            return Err(AutoMLError::PlotError("renderer broke".to_string()));
        }
        self.inner.render(figure, path)
    }

    fn extension(&self) -> &str {
        self.inner.extension()
    }
}

#[test]
fn test_perfect_ranking_scores_one() {
    let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0];
    let score = array![0.1, 0.2, 0.7, 0.3, 0.8, 0.9];
    assert_eq!(roc_auc_score(&y, &score).unwrap(), 1.0);
    assert_eq!(average_precision_score(&y, &score).unwrap(), 1.0);
}

#[test]
fn test_single_class_auc_is_an_error() {
    let y = array![1.0, 1.0, 1.0];
    let score = array![0.2, 0.5, 0.9];
    assert!(roc_auc_score(&y, &score).is_err());
}

#[test]
fn test_separable_logistic_regression_is_perfect_on_every_role() {
    let (x, y) = ramp(40);
    let mut model = LogisticRegression::new();
    model.fit(&x, &y).unwrap();

    let mut data = vec![
        EvaluationSet::new("train", x.clone(), y.clone()),
        EvaluationSet::new("test", x, y),
    ];
    let dir = tempfile::tempdir().unwrap();
    let evaluation = evaluate_binary_classifier(
        &model,
        &mut data,
        dir.path(),
        &SvgRenderer::new(),
        &EvaluationOptions::default().with_cv_folds(0).with_plots(vec![]),
    )
    .unwrap();

    for role in ["train", "test"] {
        assert_eq!(evaluation.metric(&format!("roc_auc_{}", role)), Some(1.0));
        assert_eq!(evaluation.metric(&format!("average_precision_{}", role)), Some(1.0));
    }
    assert!(evaluation.metric("roc_auc_cv").is_none());
}

#[test]
fn test_failed_plot_is_left_out() {
    let (x, y) = ramp(40);
    let mut model = LogisticRegression::new();
    model.fit(&x, &y).unwrap();

    let mut data = vec![
        EvaluationSet::new("train", x.clone(), y.clone()),
        EvaluationSet::new("test", x, y),
    ];
    let dir = tempfile::tempdir().unwrap();
    let renderer = FailingRenderer {
        inner: SvgRenderer::new(),
        stem: "roc",
    };
    let evaluation = evaluate_binary_classifier(
        &model,
        &mut data,
        dir.path(),
        &renderer,
        &EvaluationOptions::default().with_cv_folds(2),
    )
    .unwrap();

    assert_eq!(evaluation.artifacts.len(), PlotKind::STANDARD.len() - 1);
    assert!(!dir.path().join("roc.svg").exists());
    assert!(dir.path().join("precision_recall.svg").is_file());
    assert!(evaluation.artifacts.values().all(|category| category == "evaluation"));
    assert!(evaluation.metric("f1_cv").is_some());
}

#[test]
fn test_tree_attributions_add_up_to_prediction() {
    let n = 30;
    let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 7) % 5) as f64).collect();
    let x = df!("a" => &a, "b" => &b).unwrap();
    let y: Array1<f64> = (0..n).map(|i| if i >= 15 { 1.0 } else { 0.0 }).collect();

    let mut preprocessor = Passthrough::new();
    preprocessor.fit(&x, &y).unwrap();
    let mut estimator = BuiltinEstimator::RandomForest.build(&Default::default()).unwrap();
    estimator.fit(&preprocessor.transform(&x).unwrap(), &y).unwrap();
    let model = make_pipeline(Box::new(preprocessor), estimator).with_tags(BuiltinEstimator::RandomForest.tags());

    let dir = tempfile::tempdir().unwrap();
    let analysis = shap_analyse(&model, &x, dir.path(), &SvgRenderer::new(), &TreePathExplainer).unwrap();

    assert_eq!(analysis.feature_names, vec!["a".to_string(), "b".to_string()]);
    assert!(analysis.tags.contains_key("shap_expected_value"));
    assert!(!analysis.artifacts.is_empty());

    let proba = model.predict_proba(&x).unwrap();
    for i in 0..n {
        let total: f64 = analysis.explanation.values.row(i).sum();
        let expected = proba[[i, 1]] - analysis.explanation.expected_value;
        assert!((total - expected).abs() < 1e-9, "row {}: {} vs {}", i, total, expected);
    }
}

#[test]
fn test_attribution_needs_tree_tags() {
    let (x, y) = separable(20);
    let frame = df!("a" => x.column(0).to_vec(), "b" => x.column(1).to_vec()).unwrap();
    let mut estimator = LogisticRegression::new();
    estimator.fit(&x, &y).unwrap();
    let model = make_pipeline(Box::new(Passthrough::new()), Box::new(estimator))
        .with_tags(BuiltinEstimator::LogisticRegression.tags());

    let dir = tempfile::tempdir().unwrap();
    let result = shap_analyse(&model, &frame, dir.path(), &SvgRenderer::new(), &TreePathExplainer);
    assert!(matches!(result, Err(AutoMLError::ValidationError(_))));
}
