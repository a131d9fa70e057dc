//! Probability calibration
//!
//! A [`CalibratedClassifier`] wraps an already fitted estimator and learns a
//! monotone mapping from its positive-class probability to a calibrated one.
//! [`calibrate_model`] applies this to a model stored in a tracking run.

mod classifier;
mod isotonic;
mod platt;
mod workflow;

pub use classifier::{CalibratedClassifier, CalibratedClassifierState};
pub use isotonic::IsotonicRegression;
pub use platt::PlattScaling;
pub use workflow::{calibrate_model, CalibrationOptions, CalibrationOutput};

use crate::error::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Calibration method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMethod {
    /// Platt scaling
    #[default]
    Sigmoid,
    /// Isotonic regression
    Isotonic,
}

/// Trait for probability calibrators
pub trait Calibrator: Send + Sync {
    /// Fit on predicted probabilities and true labels
    fn fit(&mut self, probs: &Array1<f64>, labels: &Array1<f64>) -> Result<()>;

    /// Calibrate probabilities
    fn calibrate(&self, probs: &Array1<f64>) -> Result<Array1<f64>>;

    fn fit_calibrate(&mut self, probs: &Array1<f64>, labels: &Array1<f64>) -> Result<Array1<f64>> {
        self.fit(probs, labels)?;
        self.calibrate(probs)
    }
}
