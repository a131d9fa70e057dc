//! Random forest classifier

use super::tree::{parse_criterion, Criterion, DecisionTreeClassifier};
use super::{check_binary_target, two_column_proba, Estimator, SavedEstimator, TreeEnsemble};
use crate::error::{AutoMLError, Result};
use crate::optimizer::{ParamMap, ParamReader, ParamValue};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of features each tree may split on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    Fraction(f64),
    Fixed(usize),
    All,
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }

    fn from_param(value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Str(s) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
            ParamValue::Str(s) if s == "log2" => Ok(MaxFeatures::Log2),
            ParamValue::Str(s) if s == "all" => Ok(MaxFeatures::All),
            ParamValue::Int(n) if *n > 0 => Ok(MaxFeatures::Fixed(*n as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            other => Err(AutoMLError::InvalidParameter {
                name: "max_features".to_string(),
                value: other.to_string(),
                reason: "expected sqrt, log2, all, a positive integer or a fraction".to_string(),
            }),
        }
    }

    fn to_param(self) -> ParamValue {
        match self {
            MaxFeatures::Sqrt => ParamValue::from("sqrt"),
            MaxFeatures::Log2 => ParamValue::from("log2"),
            MaxFeatures::All => ParamValue::from("all"),
            MaxFeatures::Fixed(n) => ParamValue::Int(n as i64),
            MaxFeatures::Fraction(f) => ParamValue::Float(f),
        }
    }
}

/// Bagged ensemble of decision trees with soft voting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    trees: Vec<DecisionTreeClassifier>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let reader = ParamReader::new(params, "RandomForestClassifier");
        reader.only(&[
            "n_estimators",
            "max_depth",
            "min_samples_split",
            "min_samples_leaf",
            "max_features",
            "bootstrap",
            "criterion",
            "random_state",
        ])?;

        let mut forest = Self::new(reader.usize("n_estimators")?.unwrap_or(100));
        if forest.n_estimators == 0 {
            return Err(AutoMLError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        forest.max_depth = reader.usize("max_depth")?;
        if let Some(v) = reader.usize("min_samples_split")? {
            forest.min_samples_split = v.max(2);
        }
        if let Some(v) = reader.usize("min_samples_leaf")? {
            forest.min_samples_leaf = v.max(1);
        }
        if let Some(v) = params.get("max_features") {
            forest.max_features = MaxFeatures::from_param(v)?;
        }
        if let Some(v) = reader.bool("bootstrap")? {
            forest.bootstrap = v;
        }
        if let Some(c) = reader.string("criterion")? {
            forest.criterion = parse_criterion(&c)?;
        }
        forest.random_state = reader.u64("random_state")?;
        Ok(forest)
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    fn fit_forest(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_binary_target(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_features == 0 {
            return Err(AutoMLError::ValidationError("No features to fit on".to_string()));
        }
        let n_split_features = self.max_features.resolve(n_features);
        let base_seed = self.random_state.unwrap_or(42);

        let trees: Result<Vec<DecisionTreeClassifier>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let rows: Vec<usize> = if self.bootstrap {
                    (0..n_samples)
                        .map(|_| (rng.next_u64() as usize) % n_samples)
                        .collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut features = sample(&mut rng, n_features, n_split_features).into_vec();
                features.sort_unstable();

                let mut tree = DecisionTreeClassifier::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_criterion(self.criterion)
                    .with_feature_subset(features);
                tree.max_depth = self.max_depth;
                tree.fit_indices(x, y, &rows)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        self.n_features = n_features;
        self.compute_feature_importances();
        Ok(())
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for imp in self.trees.iter().filter_map(|t| t.feature_importances()) {
            for (acc, v) in total.iter_mut().zip(imp.iter()) {
                *acc += v;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Mean positive-class probability over all trees
    pub fn predict_positive(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(AutoMLError::ModelNotFitted);
        }
        let per_tree: Result<Vec<Array1<f64>>> =
            self.trees.par_iter().map(|t| t.predict_positive(x)).collect();
        let per_tree = per_tree?;

        let mut mean: Array1<f64> = Array1::zeros(x.nrows());
        for p in &per_tree {
            mean += p;
        }
        Ok(mean / per_tree.len() as f64)
    }
}

impl Estimator for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_forest(x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(two_column_proba(&self.predict_positive(x)?))
    }

    fn params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("n_estimators".into(), ParamValue::Int(self.n_estimators as i64));
        if let Some(d) = self.max_depth {
            params.insert("max_depth".into(), ParamValue::Int(d as i64));
        }
        params.insert("min_samples_split".into(), ParamValue::Int(self.min_samples_split as i64));
        params.insert("min_samples_leaf".into(), ParamValue::Int(self.min_samples_leaf as i64));
        params.insert("max_features".into(), self.max_features.to_param());
        params.insert("bootstrap".into(), ParamValue::Bool(self.bootstrap));
        if let Some(seed) = self.random_state {
            params.insert("random_state".into(), ParamValue::Int(seed as i64));
        }
        params
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        let mut forest = self.clone();
        forest.trees.clear();
        forest.feature_importances = None;
        forest.n_features = 0;
        Box::new(forest)
    }

    fn boxed_clone(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn to_saved(&self) -> Result<SavedEstimator> {
        Ok(SavedEstimator::RandomForest(self.clone()))
    }

    fn as_tree_ensemble(&self) -> Option<&dyn TreeEnsemble> {
        Some(self)
    }
}

impl TreeEnsemble for RandomForestClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn expected_value(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.root_value()).sum::<f64>() / self.trees.len() as f64
    }

    fn contributions(&self, sample: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.path_contributions(sample, &mut out);
        }
        if !self.trees.is_empty() {
            let n = self.trees.len() as f64;
            out.iter_mut().for_each(|v| *v /= n);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let mut x = Array2::zeros((40, 3));
        let mut y = Array1::zeros(40);
        for i in 0..40 {
            let label = (i % 2) as f64;
            x[[i, 0]] = label * 4.0 + (i as f64 * 0.37).sin();
            x[[i, 1]] = (i as f64 * 1.3).cos();
            x[[i, 2]] = label * 2.0 - (i as f64 * 0.11).sin();
            y[i] = label;
        }
        (x, y)
    }

    #[test]
    fn test_forest_fits_separable_blobs() {
        let (x, y) = blobs();
        let mut forest = RandomForestClassifier::new(15)
            .with_random_state(7)
            .with_max_features(MaxFeatures::All);
        forest.fit(&x, &y).unwrap();
        assert_eq!(forest.n_trees(), 15);

        let pred = forest.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 38, "only {} of 40 correct", correct);
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let (x, y) = blobs();
        let mut a = RandomForestClassifier::new(5).with_random_state(3);
        let mut b = RandomForestClassifier::new(5).with_random_state(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_positive(&x).unwrap(), b.predict_positive(&x).unwrap());
    }

    #[test]
    fn test_from_params_with_integral_values() {
        let mut params = ParamMap::new();
        params.insert("n_estimators".into(), ParamValue::Int(12));
        params.insert("max_depth".into(), ParamValue::Int(4));
        let forest = RandomForestClassifier::from_params(&params).unwrap();
        assert_eq!(forest.n_estimators, 12);
        assert_eq!(forest.max_depth, Some(4));
    }

    #[test]
    fn test_contributions_are_additive() {
        let (x, y) = blobs();
        let mut forest = RandomForestClassifier::new(6).with_random_state(11);
        forest.fit(&x, &y).unwrap();
        let pred = forest.predict_positive(&x).unwrap();
        let row = x.row(3).to_vec();
        let total: f64 = forest.contributions(&row).iter().sum();
        assert!((forest.expected_value() + total - pred[3]).abs() < 1e-9);
    }
}
