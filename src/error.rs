//! Error types for myautoml

use thiserror::Error;

/// Result type alias for myautoml operations
pub type Result<T> = std::result::Result<T, AutoMLError>;

/// Main error type
#[derive(Error, Debug)]
pub enum AutoMLError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Plot error: {0}")]
    PlotError(String),

    #[error("Tracking error: {0}")]
    TrackingError(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Interrupted by user")]
    Interrupted,

    #[error("No trial completed before the search stopped")]
    NoCompletedTrials,
}

impl AutoMLError {
    /// Whether this error is a user interruption
    pub fn is_interrupted(&self) -> bool {
        matches!(self, AutoMLError::Interrupted)
    }
}

impl From<polars::error::PolarsError> for AutoMLError {
    fn from(err: polars::error::PolarsError) -> Self {
        AutoMLError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for AutoMLError {
    fn from(err: serde_json::Error) -> Self {
        AutoMLError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for AutoMLError {
    fn from(err: serde_yaml::Error) -> Self {
        AutoMLError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AutoMLError {
    fn from(err: ndarray::ShapeError) -> Self {
        AutoMLError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<ureq::Error> for AutoMLError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                AutoMLError::TrackingError(format!("HTTP {}: {}", code, body))
            }
            ureq::Error::Transport(t) => AutoMLError::TrackingError(t.to_string()),
        }
    }
}
