//! Parameter values, nested parameter trees and flat parameter maps

use crate::error::{AutoMLError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view; floats qualify only when they carry no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{:?}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Flat parameter map consumed by estimators
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Parameters nested under named groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamTree {
    Value(ParamValue),
    Group(BTreeMap<String, ParamTree>),
}

impl ParamTree {
    /// Empty group
    pub fn group() -> Self {
        ParamTree::Group(BTreeMap::new())
    }

    /// Insert a child, turning a leaf into a group if needed
    pub fn insert(&mut self, key: impl Into<String>, child: ParamTree) {
        if let ParamTree::Value(_) = self {
            *self = ParamTree::group();
        }
        if let ParamTree::Group(map) = self {
            map.insert(key.into(), child);
        }
    }

    /// Builder form of [`ParamTree::insert`]
    pub fn with(mut self, key: impl Into<String>, child: impl Into<ParamTree>) -> Self {
        self.insert(key, child.into());
        self
    }
}

macro_rules! impl_tree_leaf {
    ($($ty:ty),*) => {
        $(impl From<$ty> for ParamTree {
            fn from(v: $ty) -> Self {
                ParamTree::Value(v.into())
            }
        })*
    };
}

impl_tree_leaf!(ParamValue, bool, i64, f64, &str);

/// Collapse a nested parameter tree into a flat map.
///
/// Group names are discarded at every depth; only leaf names survive. When two
/// groups define the same leaf name the one visited last (groups are visited in
/// key order) wins, and a warning names the colliding key.
pub fn flatten_params(params: &ParamTree) -> ParamMap {
    let mut out = ParamMap::new();
    if let ParamTree::Group(map) = params {
        flatten_into(map, &mut out);
    }
    out
}

fn flatten_into(map: &BTreeMap<String, ParamTree>, out: &mut ParamMap) {
    for (key, child) in map {
        match child {
            ParamTree::Group(inner) => flatten_into(inner, out),
            ParamTree::Value(value) => {
                if let Some(previous) = out.insert(key.clone(), value.clone()) {
                    if &previous != value {
                        tracing::warn!(
                            key = %key,
                            dropped = %previous,
                            kept = %value,
                            "Parameter name defined in several groups, keeping the last one"
                        );
                    }
                }
            }
        }
    }
}

/// Convert floats with no fractional part into integers.
///
/// Search spaces such as quantised uniforms produce `10.0` where estimators
/// expect an integer count. Every other value is left unchanged.
pub fn prep_params(params: &ParamMap) -> ParamMap {
    params
        .iter()
        .map(|(key, value)| {
            let value = match value {
                ParamValue::Float(v)
                    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 =>
                {
                    ParamValue::Int(*v as i64)
                }
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Merge `overrides` over `base`
pub fn merge_params(base: &ParamMap, overrides: &ParamMap) -> ParamMap {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Typed access to a flat parameter map, used by estimator factories
pub struct ParamReader<'a> {
    params: &'a ParamMap,
    estimator: &'a str,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a ParamMap, estimator: &'a str) -> Self {
        Self { params, estimator }
    }

    /// Fail on names outside `allowed`
    pub fn only(&self, allowed: &[&str]) -> Result<()> {
        match self.params.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(unknown) => Err(AutoMLError::InvalidParameter {
                name: unknown.clone(),
                value: self.params[unknown].to_string(),
                reason: format!("not a parameter of {}", self.estimator),
            }),
            None => Ok(()),
        }
    }

    pub fn usize(&self, name: &str) -> Result<Option<usize>> {
        self.get(name, |v| v.as_i64().filter(|i| *i >= 0).map(|i| i as usize), "expected a non-negative integer")
    }

    pub fn u64(&self, name: &str) -> Result<Option<u64>> {
        self.get(name, |v| v.as_i64().filter(|i| *i >= 0).map(|i| i as u64), "expected a non-negative integer")
    }

    pub fn f64(&self, name: &str) -> Result<Option<f64>> {
        self.get(name, ParamValue::as_f64, "expected a number")
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>> {
        self.get(name, ParamValue::as_bool, "expected a boolean")
    }

    pub fn string(&self, name: &str) -> Result<Option<String>> {
        self.get(name, |v| v.as_str().map(str::to_string), "expected a string")
    }

    fn get<T>(
        &self,
        name: &str,
        convert: impl Fn(&ParamValue) -> Option<T>,
        reason: &str,
    ) -> Result<Option<T>> {
        match self.params.get(name) {
            None => Ok(None),
            Some(value) => convert(value).map(Some).ok_or_else(|| AutoMLError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            }),
        }
    }
}
