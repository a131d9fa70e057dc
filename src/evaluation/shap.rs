//! Feature attribution analysis for tree-based models

use crate::error::{AutoMLError, Result};
use crate::model::{Estimator, Pipeline};
use crate::visualisation::shap::{save_shap_dependence_plots, save_shap_summary, save_shap_summary_bar};
use crate::visualisation::PlotRenderer;
use ndarray::Array2;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Artifact category for attribution plots
pub const SHAP_CATEGORY: &str = "shap";

/// Per-sample per-feature attributions
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Mean positive-class probability the attributions start from
    pub expected_value: f64,
    /// `n_samples × n_features`
    pub values: Array2<f64>,
}

/// Computes attributions for a fitted estimator on transformed features
pub trait Explainer: Send + Sync {
    fn explain(&self, estimator: &dyn Estimator, x: &Array2<f64>) -> Result<Explanation>;
}

/// Decision-path attributions for tree models
///
/// Each split on a sample's path credits its feature with the change in the
/// node's positive-class probability; forests average over trees. For every
/// sample the attributions add up to `prediction - expected_value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreePathExplainer;

impl Explainer for TreePathExplainer {
    fn explain(&self, estimator: &dyn Estimator, x: &Array2<f64>) -> Result<Explanation> {
        let ensemble = estimator.as_tree_ensemble().ok_or_else(|| {
            AutoMLError::ComputationError("Path attributions need a tree-based estimator".to_string())
        })?;
        if x.ncols() != ensemble.n_features() {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} features", ensemble.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| ensemble.contributions(&x.row(i).to_vec()))
            .collect();

        let mut values = Array2::zeros((x.nrows(), x.ncols()));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        Ok(Explanation {
            expected_value: ensemble.expected_value(),
            values,
        })
    }
}

/// Output of [`shap_analyse`]
#[derive(Debug, Clone)]
pub struct ShapAnalysis {
    /// `shap_expected_value`
    pub tags: BTreeMap<String, String>,
    pub artifacts: BTreeMap<PathBuf, String>,
    pub explanation: Explanation,
    /// Transformed features the attributions refer to
    pub data: Array2<f64>,
    pub feature_names: Vec<String>,
}

/// Explain a fitted pipeline on `x` and render summary, summary-bar and one
/// dependence plot per transformed feature into `temp_dir`
///
/// The pipeline must carry tags declaring a tree-based estimator.
pub fn shap_analyse(
    model: &Pipeline,
    x: &DataFrame,
    temp_dir: &Path,
    renderer: &dyn PlotRenderer,
    explainer: &dyn Explainer,
) -> Result<ShapAnalysis> {
    let tree_based = model.tags().map_or(false, |t| t.tree_based);
    if !tree_based {
        return Err(AutoMLError::ValidationError(
            "Shap analysis requires an estimator tagged as tree-based".to_string(),
        ));
    }

    std::fs::create_dir_all(temp_dir)?;
    debug!("Performing Shap analysis");
    let preprocessor = model.preprocessor();
    let feature_names = preprocessor.feature_names();
    let origins = preprocessor.feature_origins();
    let data = preprocessor.transform(x)?;

    let explanation = explainer.explain(model.estimator(), &data)?;

    let mut tags = BTreeMap::new();
    tags.insert(
        "shap_expected_value".to_string(),
        explanation.expected_value.to_string(),
    );

    let values = &explanation.values;
    let mut paths: Vec<PathBuf> = Vec::new();
    paths.extend(save_shap_summary(renderer, temp_dir, values, &data, &feature_names));
    paths.extend(save_shap_summary_bar(renderer, temp_dir, values, &data, &feature_names));
    paths.extend(save_shap_dependence_plots(
        renderer,
        temp_dir,
        values,
        &data,
        &feature_names,
        &origins,
    ));

    let artifacts = paths
        .into_iter()
        .map(|p| (p, SHAP_CATEGORY.to_string()))
        .collect();

    Ok(ShapAnalysis {
        tags,
        artifacts,
        explanation,
        data,
        feature_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        make_pipeline, BuiltinEstimator, ColumnPreprocessor, DecisionTreeClassifier, EstimatorFactory,
        LogisticRegression, RandomForestClassifier,
    };
    use crate::visualisation::SvgRenderer;
    use ndarray::{array, Array1, Axis};
    use polars::prelude::*;

    fn additivity_holds(estimator: &dyn Estimator, x: &Array2<f64>) {
        let explanation = TreePathExplainer.explain(estimator, x).unwrap();
        let proba = estimator.predict_proba(x).unwrap();
        for (i, row) in explanation.values.axis_iter(Axis(0)).enumerate() {
            let total = explanation.expected_value + row.sum();
            assert!((total - proba[[i, 1]]).abs() < 1e-9, "row {}", i);
        }
    }

    #[test]
    fn test_tree_attributions_are_additive() {
        let x = array![[1.0, 5.0], [2.0, 3.0], [3.0, 8.0], [4.0, 1.0], [5.0, 2.0], [6.0, 9.0]];
        let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let mut tree = DecisionTreeClassifier::new();
        tree.fit(&x, &y).unwrap();
        additivity_holds(&tree, &x);

        let mut forest = RandomForestClassifier::new(5).with_random_state(3);
        forest.fit(&x, &y).unwrap();
        additivity_holds(&forest, &x);
    }

    #[test]
    fn test_non_tree_estimator_is_rejected() {
        let x = array![[0.0], [1.0]];
        let y: Array1<f64> = array![0.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert!(TreePathExplainer.explain(&model, &x).is_err());
    }

    #[test]
    fn test_shap_analyse_writes_plots_and_tag() {
        let df = df!(
            "age" => &[22.0, 38.0, 26.0, 35.0, 54.0, 2.0, 27.0, 14.0],
            "sex" => &["male", "female", "female", "female", "male", "male", "female", "female"],
        )
        .unwrap();
        let y = array![0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0];

        let factory = BuiltinEstimator::DecisionTree;
        let mut pipeline = make_pipeline(Box::new(ColumnPreprocessor::new()), Box::new(DecisionTreeClassifier::new()))
            .with_tags(factory.tags());
        pipeline.fit(&df, &y).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let analysis = shap_analyse(&pipeline, &df, dir.path(), &SvgRenderer::new(), &TreePathExplainer).unwrap();

        assert!(analysis.tags.contains_key("shap_expected_value"));
        // summary, summary bar and one dependence plot per transformed feature
        assert_eq!(analysis.artifacts.len(), 2 + analysis.feature_names.len());
        assert!(analysis.artifacts.values().all(|c| c == "shap"));
        assert!(dir.path().join("shap_summary.svg").exists());
    }

    #[test]
    fn test_shap_analyse_requires_tree_tag() {
        let df = df!("a" => &[0.0, 1.0, 2.0, 3.0]).unwrap();
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut pipeline = make_pipeline(Box::new(ColumnPreprocessor::new()), Box::new(DecisionTreeClassifier::new()));
        pipeline.fit(&df, &y).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(shap_analyse(&pipeline, &df, dir.path(), &SvgRenderer::new(), &TreePathExplainer).is_err());
    }
}
