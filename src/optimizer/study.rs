//! Trial bookkeeping for a search

use super::params::ParamTree;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What an objective reports for one trial
#[derive(Debug, Clone)]
pub struct TrialOutcome<T> {
    /// Value to minimise
    pub loss: f64,
    /// Arbitrary payload kept with the trial
    pub result: T,
}

/// A completed trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial<T> {
    /// Zero-based trial index
    pub number: usize,
    /// Nested sample the objective was called with
    pub params: ParamTree,
    pub loss: f64,
    pub result: T,
}

/// Completed trials of one search, best tracked by lowest loss
#[derive(Debug, Clone)]
pub struct Study<T> {
    trials: Vec<Trial<T>>,
    best: Option<usize>,
}

impl<T> Default for Study<T> {
    fn default() -> Self {
        Self {
            trials: Vec::new(),
            best: None,
        }
    }
}

fn loss_order(a: f64, b: f64) -> Ordering {
    // NaN losses rank last
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl<T> Study<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed trial
    pub fn add_trial(&mut self, trial: Trial<T>) {
        let is_best = match self.best {
            None => true,
            Some(idx) => loss_order(trial.loss, self.trials[idx].loss) == Ordering::Less,
        };
        self.trials.push(trial);
        if is_best {
            self.best = Some(self.trials.len() - 1);
        }
    }

    pub fn trials(&self) -> &[Trial<T>] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Trial with the lowest loss; the earliest one wins ties
    pub fn best_trial(&self) -> Option<&Trial<T>> {
        self.best.map(|idx| &self.trials[idx])
    }

    /// Consume the study, keeping only the best trial
    pub fn into_best(mut self) -> Option<Trial<T>> {
        let idx = self.best?;
        Some(self.trials.swap_remove(idx))
    }

    /// `(sample, loss)` pairs for samplers
    pub fn history(&self) -> Vec<(ParamTree, f64)> {
        self.trials
            .iter()
            .map(|t| (t.params.clone(), t.loss))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(number: usize, loss: f64) -> Trial<()> {
        Trial {
            number,
            params: ParamTree::group(),
            loss,
            result: (),
        }
    }

    #[test]
    fn test_best_trial_tracks_minimum() {
        let mut study = Study::new();
        study.add_trial(trial(0, 0.4));
        study.add_trial(trial(1, 0.2));
        study.add_trial(trial(2, 0.2));
        study.add_trial(trial(3, f64::NAN));
        assert_eq!(study.best_trial().unwrap().number, 1);
        assert_eq!(study.into_best().unwrap().number, 1);
    }

    #[test]
    fn test_nan_never_beats_finite() {
        let mut study = Study::new();
        study.add_trial(trial(0, f64::NAN));
        study.add_trial(trial(1, 0.9));
        assert_eq!(study.best_trial().unwrap().number, 1);
    }
}
