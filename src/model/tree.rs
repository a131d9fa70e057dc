//! Binary decision tree classifier

use super::{check_binary_target, two_column_proba, Estimator, SavedEstimator, TreeEnsemble};
use crate::error::{AutoMLError, Result};
use crate::optimizer::{ParamMap, ParamReader, ParamValue};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node; `value` is the positive-class fraction of the node's
/// training samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        value: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    pub fn value(&self) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } | TreeNode::Split { value, .. } => *value,
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

impl Criterion {
    fn impurity(self, positives: f64, total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        let p = positives / total;
        match self {
            Criterion::Gini => 1.0 - p * p - (1.0 - p) * (1.0 - p),
            Criterion::Entropy => {
                let h = |q: f64| if q > 0.0 { -q * q.ln() } else { 0.0 };
                h(p) + h(1.0 - p)
            }
        }
    }
}

/// Decision tree classifier for 0/1 targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    /// Restrict split search to these features
    pub feature_subset: Option<Vec<usize>>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeClassifier {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            feature_subset: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Build from `max_depth`, `min_samples_split`, `min_samples_leaf` and
    /// `criterion`
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let reader = ParamReader::new(params, "DecisionTreeClassifier");
        reader.only(&["max_depth", "min_samples_split", "min_samples_leaf", "criterion"])?;

        let mut tree = Self::new();
        tree.max_depth = reader.usize("max_depth")?;
        if let Some(v) = reader.usize("min_samples_split")? {
            tree = tree.with_min_samples_split(v);
        }
        if let Some(v) = reader.usize("min_samples_leaf")? {
            tree = tree.with_min_samples_leaf(v);
        }
        if let Some(c) = reader.string("criterion")? {
            tree = tree.with_criterion(parse_criterion(&c)?);
        }
        Ok(tree)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_feature_subset(mut self, features: Vec<usize>) -> Self {
        self.feature_subset = Some(features);
        self
    }

    /// Fit on all rows
    pub fn fit_tree(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.fit_indices(x, y, &indices)
    }

    /// Fit on the rows listed in `indices`; repeated indices act as weights
    pub fn fit_indices(&mut self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Result<()> {
        check_binary_target(x, y)?;
        if indices.is_empty() {
            return Err(AutoMLError::ValidationError("No samples to fit".to_string()));
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        self.root = Some(self.build_tree(x, y, indices, 0, &mut importances));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|imp| *imp /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(())
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = indices.len();
        let positives: f64 = indices.iter().map(|&i| y[i]).sum();
        let value = positives / n_samples as f64;
        let leaf = TreeNode::Leaf { value, n_samples };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || positives == 0.0
            || positives == n_samples as f64;
        if should_stop {
            return leaf;
        }

        let Some((feature, threshold, gain)) = self.find_best_split(x, y, indices, positives) else {
            return leaf;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);
        if left_idx.len() < self.min_samples_leaf || right_idx.len() < self.min_samples_leaf {
            return leaf;
        }

        importances[feature] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_idx, depth + 1, importances));
        let right = Box::new(self.build_tree(x, y, &right_idx, depth + 1, importances));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            value,
            left,
            right,
            n_samples,
            impurity: self.criterion.impurity(positives, n_samples as f64),
        }
    }

    /// Best `(feature, threshold, impurity decrease)` over candidate features
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        positives: f64,
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len() as f64;
        let parent = self.criterion.impurity(positives, n);
        let features: Vec<usize> = match &self.feature_subset {
            Some(subset) => subset.iter().copied().filter(|&f| f < x.ncols()).collect(),
            None => (0..x.ncols()).collect(),
        };

        let results: Vec<Option<(usize, f64, f64)>> = features
            .into_par_iter()
            .map(|feature| {
                let mut column: Vec<(f64, f64)> =
                    indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
                column.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

                let mut best: Option<(f64, f64)> = None;
                let mut left_pos = 0.0;
                for k in 0..column.len() - 1 {
                    left_pos += column[k].1;
                    if column[k].0 == column[k + 1].0 {
                        continue;
                    }
                    let left_n = (k + 1) as f64;
                    let right_n = n - left_n;
                    if (left_n as usize) < self.min_samples_leaf
                        || (right_n as usize) < self.min_samples_leaf
                    {
                        continue;
                    }
                    let weighted = (left_n * self.criterion.impurity(left_pos, left_n)
                        + right_n * self.criterion.impurity(positives - left_pos, right_n))
                        / n;
                    let gain = parent - weighted;
                    if gain > 1e-12 && best.map_or(true, |(g, _)| gain > g) {
                        best = Some((gain, (column[k].0 + column[k + 1].0) / 2.0));
                    }
                }
                best.map(|(gain, threshold)| (feature, threshold, gain))
            })
            .collect();

        results
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
    }

    fn root(&self) -> Result<&TreeNode> {
        self.root.as_ref().ok_or(AutoMLError::ModelNotFitted)
    }

    fn leaf_value(node: &TreeNode, sample: &[f64]) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    Self::leaf_value(left, sample)
                } else {
                    Self::leaf_value(right, sample)
                }
            }
        }
    }

    /// Positive-class probability per row
    pub fn predict_positive(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root()?;
        if x.ncols() != self.n_features {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| Self::leaf_value(root, &row.to_vec()))
            .collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub(crate) fn root_value(&self) -> f64 {
        self.root.as_ref().map_or(0.0, TreeNode::value)
    }

    pub(crate) fn path_contributions(&self, sample: &[f64], out: &mut [f64]) {
        let mut node = match &self.root {
            Some(root) => root,
            None => return,
        };
        while let TreeNode::Split { feature_idx, threshold, value, left, right, .. } = node {
            let child = if sample[*feature_idx] <= *threshold {
                left.as_ref()
            } else {
                right.as_ref()
            };
            out[*feature_idx] += child.value() - value;
            node = child;
        }
    }
}

pub(crate) fn parse_criterion(name: &str) -> Result<Criterion> {
    match name {
        "gini" => Ok(Criterion::Gini),
        "entropy" => Ok(Criterion::Entropy),
        other => Err(AutoMLError::InvalidParameter {
            name: "criterion".to_string(),
            value: other.to_string(),
            reason: "expected gini or entropy".to_string(),
        }),
    }
}

impl Estimator for DecisionTreeClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_tree(x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(two_column_proba(&self.predict_positive(x)?))
    }

    fn params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        if let Some(d) = self.max_depth {
            params.insert("max_depth".into(), ParamValue::Int(d as i64));
        }
        params.insert("min_samples_split".into(), ParamValue::Int(self.min_samples_split as i64));
        params.insert("min_samples_leaf".into(), ParamValue::Int(self.min_samples_leaf as i64));
        let criterion = match self.criterion {
            Criterion::Gini => "gini",
            Criterion::Entropy => "entropy",
        };
        params.insert("criterion".into(), ParamValue::from(criterion));
        params
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        let mut tree = self.clone();
        tree.root = None;
        tree.feature_importances = None;
        tree.n_features = 0;
        Box::new(tree)
    }

    fn boxed_clone(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn to_saved(&self) -> Result<SavedEstimator> {
        Ok(SavedEstimator::DecisionTree(self.clone()))
    }

    fn as_tree_ensemble(&self) -> Option<&dyn TreeEnsemble> {
        Some(self)
    }
}

impl TreeEnsemble for DecisionTreeClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn expected_value(&self) -> f64 {
        self.root_value()
    }

    fn contributions(&self, sample: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_features];
        self.path_contributions(sample, &mut out);
        out
    }
}
