//! Stratified k-fold cross-validation

use super::metrics::Scorer;
use crate::error::{AutoMLError, Result};
use crate::model::{positive_proba, Estimator};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::debug;

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter keeping the class balance in every fold
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    /// Shuffle within each class before distributing
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.random_state = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        if self.n_splits < 2 {
            return Err(AutoMLError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }

        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        if let Some((class, members)) = class_indices.iter().find(|(_, m)| m.len() < self.n_splits) {
            return Err(AutoMLError::ValidationError(format!(
                "n_splits={} cannot be greater than the number of members in class {} ({})",
                self.n_splits,
                class,
                members.len()
            )));
        }

        if self.shuffle {
            let mut rng = match self.random_state {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Continue the round-robin across classes so fold sizes stay balanced
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut slot = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[slot % self.n_splits].push(idx);
                slot += 1;
            }
        }

        Ok((0..self.n_splits)
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect())
    }
}

/// Mean score of fresh estimator clones over stratified folds, one entry per
/// scorer name
pub fn cross_validate(
    estimator: &dyn Estimator,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cv: &StratifiedKFold,
    scorers: &[Scorer],
) -> Result<BTreeMap<String, f64>> {
    let splits = cv.split(y)?;
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();

    for split in &splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut model = estimator.clone_unfitted();
        model.fit(&x_train, &y_train)?;
        let proba = positive_proba(model.as_ref(), &x_test)?;
        let pred = model.predict(&x_test)?;

        for scorer in scorers {
            let score = scorer.score(&y_test, &pred, &proba)?;
            *totals.entry(scorer.name().to_string()).or_insert(0.0) += score;
        }
        debug!(fold = split.fold_idx, "Cross-validation fold done");
    }

    let n = splits.len() as f64;
    Ok(totals.into_iter().map(|(name, total)| (name, total / n)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogisticRegression;
    use ndarray::array;

    #[test]
    fn test_folds_partition_and_stratify() {
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let splits = StratifiedKFold::new(2).with_shuffle(7).split(&y).unwrap();
        assert_eq!(splits.len(), 2);

        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        for split in &splits {
            let positives = split.test_indices.iter().filter(|&&i| y[i] > 0.5).count();
            assert_eq!(positives, 2);
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 10);
        }
    }

    #[test]
    fn test_too_few_members_fails() {
        let y = array![0.0, 0.0, 0.0, 1.0];
        assert!(StratifiedKFold::new(2).split(&y).is_err());
        assert!(StratifiedKFold::new(1).split(&y).is_err());
    }

    #[test]
    fn test_cross_validate_reports_mean_per_scorer() {
        let x = array![
            [-3.0], [-2.5], [-2.0], [-1.5], [-1.0],
            [1.0], [1.5], [2.0], [2.5], [3.0]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let scores = cross_validate(
            &LogisticRegression::new(),
            &x,
            &y,
            &StratifiedKFold::new(5),
            &Scorer::ALL,
        )
        .unwrap();
        assert_eq!(scores.len(), 6);
        assert_eq!(scores["roc_auc"], 1.0);
        assert!(scores.values().all(|v| (0.0..=1.0).contains(v)));
    }
}
