//! Logging setup on top of `tracing-subscriber`

use crate::config::{LogFormat, LoggingSettings};
use crate::error::{AutoMLError, Result};
use serde_json::Value;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// returns an error because a global subscriber is already set.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| AutoMLError::ConfigError(format!("Invalid log level: {}", e)))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if settings.console {
        let layer = fmt::layer().with_writer(std::io::stderr);
        layers.push(format_layer(layer, settings.format));
    }

    if let Some(path) = &settings.path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
        layers.push(format_layer(layer, settings.format));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| AutoMLError::ConfigError(format!("Logging already initialised: {}", e)))
}

fn format_layer<W>(layer: fmt::Layer<Registry, fmt::format::DefaultFields, fmt::format::Format, W>, format: LogFormat) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Log every leaf of a nested mapping at debug level as `name.key.sub: value`.
pub fn log_nested(value: &Value, name: &str) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                log_nested(child, &format!("{}.{}", name, key));
            }
        }
        leaf => tracing::debug!("{}: {}", name, leaf),
    }
}

/// Flatten a nested mapping into `(dotted key, value)` pairs, the same view
/// [`log_nested`] emits.
pub fn nested_entries(value: &Value, name: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_entries(value, name.to_string(), &mut out);
    out
}

fn collect_entries(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_entries(child, format!("{}.{}", prefix, key), out);
            }
        }
        leaf => out.push((prefix, leaf.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_entries() {
        let value = json!({"training": {"max_evals": 5}, "experiment": {"name": "x"}});
        let entries = nested_entries(&value, "config");
        assert!(entries.contains(&("config.training.max_evals".to_string(), "5".to_string())));
        assert!(entries.contains(&("config.experiment.name".to_string(), "\"x\"".to_string())));
    }
}
