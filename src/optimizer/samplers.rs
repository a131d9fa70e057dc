//! Sampling strategies for hyperparameter search

use super::params::ParamTree;
use super::space::{lookup_path, SearchSpace};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerType {
    /// Random sampling
    Random,
    /// Tree-structured Parzen Estimator
    #[default]
    Tpe,
}

/// Trait for hyperparameter samplers
pub trait Sampler: Send + Sync {
    /// Sample the next set of hyperparameters given `(sample, loss)` history
    fn sample(&mut self, search_space: &SearchSpace, history: &[(ParamTree, f64)]) -> ParamTree;
}

fn seeded_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded_rng(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(ParamTree, f64)]) -> ParamTree {
        search_space.sample(&mut self.rng)
    }
}

/// Simplified Tree-structured Parzen Estimator.
///
/// After the startup trials, history is split at the `gamma` quantile of the
/// loss into good and bad trials. Candidates are drawn at random and the one
/// maximising `l(x) / g(x)` wins, where both densities are Gaussian kernels over
/// the normalised dimension positions.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
    bandwidth: f64,
}

impl TPESampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
            n_startup_trials: 3,
            gamma: 0.25,
            n_candidates: 24,
            bandwidth: 0.2,
        }
    }

    /// Set number of random startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set gamma (quantile for splitting good/bad)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    fn positions(space: &SearchSpace, sample: &ParamTree) -> Vec<Option<f64>> {
        space
            .dimensions()
            .into_iter()
            .map(|(path, dim)| lookup_path(sample, &path).and_then(|v| dim.normalize(v)))
            .collect()
    }

    fn density(&self, candidate: &[Option<f64>], group: &[Vec<Option<f64>>]) -> f64 {
        if group.is_empty() {
            return 1e-12;
        }
        let h2 = 2.0 * self.bandwidth * self.bandwidth;
        let total: f64 = group
            .iter()
            .map(|other| {
                let d2: f64 = candidate
                    .iter()
                    .zip(other)
                    .map(|(a, b)| match (a, b) {
                        (Some(a), Some(b)) => (a - b).powi(2),
                        _ => 1.0,
                    })
                    .sum();
                (-d2 / h2).exp()
            })
            .sum();
        total / group.len() as f64 + 1e-12
    }
}

impl Sampler for TPESampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(ParamTree, f64)]) -> ParamTree {
        if history.len() < self.n_startup_trials {
            return search_space.sample(&mut self.rng);
        }

        let mut sorted: Vec<&(ParamTree, f64)> = history.iter().collect();
        sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).clamp(1, sorted.len());
        let good: Vec<Vec<Option<f64>>> = sorted[..n_good]
            .iter()
            .map(|(p, _)| Self::positions(search_space, p))
            .collect();
        let bad: Vec<Vec<Option<f64>>> = sorted[n_good..]
            .iter()
            .map(|(p, _)| Self::positions(search_space, p))
            .collect();

        let mut best = search_space.sample(&mut self.rng);
        let mut best_score = f64::MIN;

        for _ in 0..self.n_candidates {
            let candidate = search_space.sample(&mut self.rng);
            let pos = Self::positions(search_space, &candidate);
            let score = self.density(&pos, &good) / self.density(&pos, &bad);
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }

        best
    }
}

/// Create a sampler from type
pub fn create_sampler(sampler_type: SamplerType, seed: Option<u64>) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::Tpe => Box::new(TPESampler::new(seed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::flatten_params;

    #[test]
    fn test_random_sampler_is_seeded() {
        let space = SearchSpace::new().uniform("lr", 0.001, 0.1).randint("n", 10, 100);
        let a = RandomSampler::new(Some(42)).sample(&space, &[]);
        let b = RandomSampler::new(Some(42)).sample(&space, &[]);
        assert_eq!(a, b);
        let flat = flatten_params(&a);
        assert!(flat.contains_key("lr"));
        assert!(flat.contains_key("n"));
    }

    #[test]
    fn test_tpe_prefers_good_region() {
        let space = SearchSpace::new().uniform("x", 0.0, 1.0);
        let history: Vec<(ParamTree, f64)> = (0..20)
            .map(|i| {
                let x = i as f64 / 19.0;
                (ParamTree::group().with("x", x), x)
            })
            .collect();

        let mut sampler = TPESampler::new(Some(3));
        let picks: Vec<f64> = (0..10)
            .map(|_| flatten_params(&sampler.sample(&space, &history))["x"].as_f64().unwrap())
            .collect();
        let mean = picks.iter().sum::<f64>() / picks.len() as f64;
        assert!(mean < 0.5, "mean pick {} should lean towards low loss", mean);
    }
}
