//! Nested hyperparameter search spaces

use super::params::{ParamTree, ParamValue};
use crate::error::{AutoMLError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distribution of a single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist")]
pub enum Dimension {
    /// Continuous value in `[low, high]`
    #[serde(rename = "uniform")]
    Uniform { low: f64, high: f64 },
    /// `round(uniform(low, high) / q) * q`, returned as a float
    #[serde(rename = "quniform")]
    QUniform { low: f64, high: f64, q: f64 },
    /// Value whose logarithm is uniform in `[ln low, ln high]`
    #[serde(rename = "loguniform")]
    LogUniform { low: f64, high: f64 },
    /// Integer in `[low, high)`
    #[serde(rename = "randint")]
    RandInt { low: i64, high: i64 },
    /// One of the listed values
    #[serde(rename = "choice")]
    Choice { options: Vec<ParamValue> },
}

impl Dimension {
    /// Draw one value
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            Dimension::Uniform { low, high } => ParamValue::Float(rng.gen_range(*low..=*high)),
            Dimension::QUniform { low, high, q } => {
                let v: f64 = rng.gen_range(*low..=*high);
                ParamValue::Float((v / q).round() * q)
            }
            Dimension::LogUniform { low, high } => {
                let v: f64 = rng.gen_range(low.ln()..=high.ln());
                ParamValue::Float(v.exp())
            }
            Dimension::RandInt { low, high } => ParamValue::Int(rng.gen_range(*low..*high)),
            Dimension::Choice { options } => {
                options[rng.gen_range(0..options.len())].clone()
            }
        }
    }

    /// Position of `value` mapped onto `[0, 1]`, used to compare trials
    pub fn normalize(&self, value: &ParamValue) -> Option<f64> {
        let scaled = |v: f64, lo: f64, hi: f64| {
            if hi > lo {
                ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        match self {
            Dimension::Uniform { low, high } | Dimension::QUniform { low, high, .. } => {
                value.as_f64().map(|v| scaled(v, *low, *high))
            }
            Dimension::LogUniform { low, high } => value
                .as_f64()
                .filter(|v| *v > 0.0)
                .map(|v| scaled(v.ln(), low.ln(), high.ln())),
            Dimension::RandInt { low, high } => value
                .as_f64()
                .map(|v| scaled(v, *low as f64, (*high - 1) as f64)),
            Dimension::Choice { options } => {
                let idx = options.iter().position(|o| o == value)?;
                Some(if options.len() > 1 {
                    idx as f64 / (options.len() - 1) as f64
                } else {
                    0.0
                })
            }
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(AutoMLError::InvalidParameter {
                name: name.to_string(),
                value: format!("{:?}", self),
                reason: reason.to_string(),
            })
        };
        match self {
            Dimension::Uniform { low, high } if low > high => invalid("low must not exceed high"),
            Dimension::QUniform { low, high, q } => {
                if low > high {
                    invalid("low must not exceed high")
                } else if *q <= 0.0 {
                    invalid("q must be positive")
                } else {
                    Ok(())
                }
            }
            Dimension::LogUniform { low, high } if *low <= 0.0 || low > high => {
                invalid("bounds must satisfy 0 < low <= high")
            }
            Dimension::RandInt { low, high } if low >= high => invalid("low must be below high"),
            Dimension::Choice { options } if options.is_empty() => invalid("no options given"),
            _ => Ok(()),
        }
    }
}

/// A dimension or a named group of further nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpaceNode {
    Dimension(Dimension),
    Group(BTreeMap<String, SpaceNode>),
}

/// Search space whose leaves are [`Dimension`]s, possibly nested under groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    nodes: BTreeMap<String, SpaceNode>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension
    pub fn add(mut self, name: impl Into<String>, dimension: Dimension) -> Self {
        self.nodes.insert(name.into(), SpaceNode::Dimension(dimension));
        self
    }

    /// Add a nested group
    pub fn group(mut self, name: impl Into<String>, space: SearchSpace) -> Self {
        self.nodes.insert(name.into(), SpaceNode::Group(space.nodes));
        self
    }

    pub fn uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Dimension::Uniform { low, high })
    }

    pub fn quniform(self, name: impl Into<String>, low: f64, high: f64, q: f64) -> Self {
        self.add(name, Dimension::QUniform { low, high, q })
    }

    pub fn loguniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Dimension::LogUniform { low, high })
    }

    pub fn randint(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, Dimension::RandInt { low, high })
    }

    pub fn choice(self, name: impl Into<String>, options: Vec<ParamValue>) -> Self {
        self.add(name, Dimension::Choice { options })
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions().is_empty()
    }

    /// All dimensions with their slash-separated path
    pub fn dimensions(&self) -> Vec<(String, &Dimension)> {
        let mut out = Vec::new();
        collect_dimensions(&self.nodes, "", &mut out);
        out
    }

    /// Check every dimension's bounds
    pub fn validate(&self) -> Result<()> {
        for (path, dimension) in self.dimensions() {
            dimension.validate(&path)?;
        }
        Ok(())
    }

    /// Draw one nested sample
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamTree {
        sample_nodes(&self.nodes, rng)
    }
}

fn collect_dimensions<'a>(
    nodes: &'a BTreeMap<String, SpaceNode>,
    prefix: &str,
    out: &mut Vec<(String, &'a Dimension)>,
) {
    for (name, node) in nodes {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        match node {
            SpaceNode::Dimension(d) => out.push((path, d)),
            SpaceNode::Group(inner) => collect_dimensions(inner, &path, out),
        }
    }
}

fn sample_nodes<R: Rng + ?Sized>(nodes: &BTreeMap<String, SpaceNode>, rng: &mut R) -> ParamTree {
    let mut tree = BTreeMap::new();
    for (name, node) in nodes {
        let child = match node {
            SpaceNode::Dimension(d) => ParamTree::Value(d.sample(rng)),
            SpaceNode::Group(inner) => sample_nodes(inner, rng),
        };
        tree.insert(name.clone(), child);
    }
    ParamTree::Group(tree)
}

/// Value stored under a slash-separated path of a sampled tree
pub fn lookup_path<'a>(tree: &'a ParamTree, path: &str) -> Option<&'a ParamValue> {
    let mut node = tree;
    for segment in path.split('/') {
        match node {
            ParamTree::Group(map) => node = map.get(segment)?,
            ParamTree::Value(_) => return None,
        }
    }
    match node {
        ParamTree::Value(v) => Some(v),
        ParamTree::Group(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::flatten_params;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_quniform_samples_integral_floats() {
        let space = SearchSpace::new().quniform("n_estimators", 10.0, 150.0, 1.0);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for _ in 0..20 {
            let flat = flatten_params(&space.sample(&mut rng));
            let v = flat["n_estimators"].as_f64().unwrap();
            assert_eq!(v.fract(), 0.0);
            assert!((10.0..=150.0).contains(&v));
        }
    }

    #[test]
    fn test_nested_sample_and_lookup() {
        let space = SearchSpace::new()
            .uniform("top", 0.0, 1.0)
            .group("booster", SearchSpace::new().randint("depth", 1, 4));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let sample = space.sample(&mut rng);
        let depth = lookup_path(&sample, "booster/depth").unwrap().as_i64().unwrap();
        assert!((1..4).contains(&depth));
        assert_eq!(space.dimensions().len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let space = SearchSpace::new().uniform("x", 2.0, 1.0);
        assert!(space.validate().is_err());
        let space = SearchSpace::new().loguniform("lr", 0.0, 1.0);
        assert!(space.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = "
max_depth: {dist: quniform, low: 3, high: 6, q: 1}
forest:
  n_estimators: {dist: quniform, low: 10, high: 150, q: 1}
  criterion: {dist: choice, options: [gini, entropy]}
";
        let space: SearchSpace = serde_yaml::from_str(yaml).unwrap();
        let paths: Vec<String> = space.dimensions().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["forest/criterion", "forest/n_estimators", "max_depth"]);
    }
}
