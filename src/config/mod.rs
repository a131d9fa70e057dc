//! Layered configuration
//!
//! Settings are resolved from three sources, each deep-merged over the
//! previous one:
//! - the built-in default configuration
//! - a user YAML file, with `${VAR}` references substituted from the environment
//! - environment overrides of the form `MYAUTOML__SECTION__KEY=value`

mod settings;

pub use settings::{
    CacheSettings, CalibrationSettings, EvaluationSettings, ExperimentSettings, LogFormat,
    LoggingSettings, Settings, TrainingSettings,
};

use crate::error::{AutoMLError, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

/// Built-in default configuration
pub const DEFAULT_CONFIG: &str = include_str!("default_config.yml");

/// Prefix of environment variables that override configuration keys
pub const ENV_PREFIX: &str = "MYAUTOML__";

/// Deep-merge `update` into `base`.
///
/// Mappings are merged key by key, recursing into nested mappings; any other
/// value in `update` replaces the value in `base`. Keys only present in `base`
/// are kept.
pub fn recursive_update(base: &mut Value, update: &Value) {
    let Value::Object(update_map) = update else {
        *base = update.clone();
        return;
    };

    if !base.is_object() {
        *base = Value::Object(Map::new());
    }

    if let Value::Object(base_map) = base {
        for (key, value) in update_map {
            match value {
                Value::Object(_) => {
                    let entry = base_map
                        .entry(key.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    recursive_update(entry, value);
                }
                other => {
                    base_map.insert(key.clone(), other.clone());
                }
            }
        }
    }
}

/// Load a configuration file and resolve it into [`Settings`].
///
/// `include_environment` enables `${VAR}` substitution and `MYAUTOML__`
/// overrides; `include_default` merges the file over [`DEFAULT_CONFIG`].
pub fn load_config(
    path: Option<&Path>,
    include_environment: bool,
    include_default: bool,
) -> Result<Settings> {
    let value = load_config_value(path, include_environment, include_default)?;
    Settings::from_value(value)
}

/// Same as [`load_config`] but returns the merged, untyped tree.
pub fn load_config_value(
    path: Option<&Path>,
    include_environment: bool,
    include_default: bool,
) -> Result<Value> {
    if Path::new(".env").exists() {
        warn!(
            "A .env file exists in the working directory; its variables are only \
             visible if they were exported before start-up"
        );
    }

    let mut config = if include_default {
        parse_yaml(DEFAULT_CONFIG, false)?
    } else {
        Value::Object(Map::new())
    };

    if let Some(path) = path {
        debug!(path = %path.display(), "Loading configuration file");
        let text = std::fs::read_to_string(path).map_err(|e| {
            AutoMLError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let file_config = parse_yaml(&text, include_environment)?;
        recursive_update(&mut config, &file_config);
    }

    if include_environment {
        let overrides = environment_overrides(std::env::vars());
        recursive_update(&mut config, &overrides);
    }

    Ok(config)
}

fn parse_yaml(text: &str, substitute: bool) -> Result<Value> {
    let text = if substitute {
        substitute_env(text, |name| std::env::var(name).ok())
    } else {
        text.to_string()
    };
    let yaml: serde_yaml::Value = serde_yaml::from_str(&text)?;
    let value = serde_json::to_value(yaml)?;
    Ok(match value {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

/// Replace `${NAME}` and `${NAME:-default}` with values from `lookup`.
///
/// Unknown variables without a default are left untouched.
pub fn substitute_env<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };

        match (lookup(name), default) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(default)) => out.push_str(default),
            (None, None) => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Build an override tree from `MYAUTOML__SECTION__KEY=value` variables.
///
/// Values are parsed as YAML scalars so that numbers and booleans keep their
/// type.
pub fn environment_overrides<I>(vars: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut root = Value::Object(Map::new());

    for (key, raw) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let segments: Vec<String> = path
            .split("__")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect();
        if segments.is_empty() {
            continue;
        }

        let parsed = serde_yaml::from_str::<serde_yaml::Value>(&raw)
            .ok()
            .and_then(|v| serde_json::to_value(v).ok())
            .unwrap_or_else(|| Value::String(raw.clone()));

        let mut node = parsed;
        for segment in segments.into_iter().rev() {
            let mut map = Map::new();
            map.insert(segment, node);
            node = Value::Object(map);
        }
        recursive_update(&mut root, &node);
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recursive_update() {
        let mut base = json!({"k": 1, "l": {"m": 2, "n": 3}, "o": 4});
        let update = json!({"k": 5, "l": {"m": 6, "p": 7}});
        recursive_update(&mut base, &update);
        assert_eq!(base, json!({"k": 5, "l": {"m": 6, "n": 3, "p": 7}, "o": 4}));
    }

    #[test]
    fn test_recursive_update_replaces_scalar_with_mapping() {
        let mut base = json!({"a": 1});
        recursive_update(&mut base, &json!({"a": {"b": 2}}));
        assert_eq!(base, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_substitute_env() {
        let lookup = |name: &str| match name {
            "HOST" => Some("example.org".to_string()),
            _ => None,
        };
        assert_eq!(
            substitute_env("uri: http://${HOST}:${PORT:-5000}/${MISSING}", lookup),
            "uri: http://example.org:5000/${MISSING}"
        );
    }

    #[test]
    fn test_environment_overrides() {
        let vars = vec![
            ("MYAUTOML__TRAINING__MAX_EVALS".to_string(), "12".to_string()),
            ("MYAUTOML__EXPERIMENT__NAME".to_string(), "titanic".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let overrides = environment_overrides(vars);
        assert_eq!(
            overrides,
            json!({"training": {"max_evals": 12}, "experiment": {"name": "titanic"}})
        );
    }

    #[test]
    fn test_default_config_parses() {
        let settings = load_config(None, false, true).unwrap();
        assert_eq!(settings.training.max_evals, 5);
        assert_eq!(settings.evaluation.primary_metric, "roc_auc_cv");
        assert_eq!(settings.experiment.name, "Default");
        assert!(!settings.calibration.calibrate);
    }

    #[test]
    fn test_file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "training:\n  max_evals: 20\nevaluation:\n  shap_analysis: true\n",
        )
        .unwrap();

        let settings = load_config(Some(&path), false, true).unwrap();
        assert_eq!(settings.training.max_evals, 20);
        assert!(settings.evaluation.shap_analysis);
        assert_eq!(settings.evaluation.primary_metric, "roc_auc_cv");
    }
}
