//! Hyperparameter search
//!
//! A [`HyperOpt`] drives a [`Sampler`] over a nested [`SearchSpace`] and calls
//! an objective once per trial, keeping every completed trial in a [`Study`].
//! If the objective fails, the search stops and the completed trials remain
//! available through [`HyperOpt::study`].

mod params;
mod samplers;
mod space;
mod study;

pub use params::{flatten_params, merge_params, prep_params, ParamMap, ParamReader, ParamTree, ParamValue};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use space::{lookup_path, Dimension, SearchSpace, SpaceNode};
pub use study::{Study, Trial, TrialOutcome};

use crate::error::{AutoMLError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Total number of trials
    pub max_evals: usize,
    pub sampler: SamplerType,
    /// Sampler seed
    pub random_state: Option<u64>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_evals: 5,
            sampler: SamplerType::Tpe,
            random_state: Some(1),
        }
    }
}

impl OptimizationConfig {
    pub fn with_max_evals(mut self, max_evals: usize) -> Self {
        self.max_evals = max_evals;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

/// Sequential black-box minimiser
pub struct HyperOpt<T> {
    config: OptimizationConfig,
    space: SearchSpace,
    sampler: Box<dyn Sampler>,
    study: Study<T>,
}

impl<T> HyperOpt<T> {
    pub fn new(config: OptimizationConfig, space: SearchSpace) -> Self {
        let sampler = create_sampler(config.sampler, config.random_state);
        Self {
            config,
            space,
            sampler,
            study: Study::new(),
        }
    }

    /// Replace the sampler built from the configuration
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Run trials until the study holds `max_evals` of them.
    ///
    /// The objective receives the trial number and the nested sample. Its first
    /// error stops the search and is returned; trials completed before it are
    /// kept.
    pub fn optimize<F>(&mut self, mut objective: F) -> Result<()>
    where
        F: FnMut(usize, &ParamTree) -> Result<TrialOutcome<T>>,
    {
        if self.space.is_empty() {
            return Err(AutoMLError::OptimizationError(
                "Search space has no dimensions".to_string(),
            ));
        }
        self.space.validate()?;

        for number in self.study.len()..self.config.max_evals {
            let history = self.study.history();
            let params = self.sampler.sample(&self.space, &history);
            let outcome = objective(number, &params)?;
            debug!(trial = number, loss = outcome.loss, "Trial complete");
            self.study.add_trial(Trial {
                number,
                params,
                loss: outcome.loss,
                result: outcome.result,
            });
        }

        Ok(())
    }

    pub fn study(&self) -> &Study<T> {
        &self.study
    }

    pub fn into_study(self) -> Study<T> {
        self.study
    }
}
