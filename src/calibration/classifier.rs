//! Calibration wrapper around a pre-fitted estimator

use super::{CalibrationMethod, Calibrator, IsotonicRegression, PlattScaling};
use crate::error::Result;
use crate::model::{positive_proba, two_column_proba, Estimator, SavedEstimator};
use crate::optimizer::{ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
enum FittedCalibrator {
    Sigmoid(PlattScaling),
    Isotonic(IsotonicRegression),
}

impl FittedCalibrator {
    fn new(method: CalibrationMethod) -> Self {
        match method {
            CalibrationMethod::Sigmoid => FittedCalibrator::Sigmoid(PlattScaling::new()),
            CalibrationMethod::Isotonic => FittedCalibrator::Isotonic(IsotonicRegression::new()),
        }
    }

    fn as_calibrator(&self) -> &dyn Calibrator {
        match self {
            FittedCalibrator::Sigmoid(c) => c,
            FittedCalibrator::Isotonic(c) => c,
        }
    }

    fn as_calibrator_mut(&mut self) -> &mut dyn Calibrator {
        match self {
            FittedCalibrator::Sigmoid(c) => c,
            FittedCalibrator::Isotonic(c) => c,
        }
    }
}

/// Estimator whose probabilities pass through a calibrator.
///
/// The base estimator is treated as already fitted: [`Estimator::fit`] only
/// fits the calibrator on the base estimator's probabilities for `x`.
#[derive(Debug)]
pub struct CalibratedClassifier {
    base: Box<dyn Estimator>,
    method: CalibrationMethod,
    calibrator: FittedCalibrator,
    fitted: bool,
}

impl CalibratedClassifier {
    /// Wrap a fitted estimator
    pub fn prefit(base: Box<dyn Estimator>, method: CalibrationMethod) -> Self {
        Self {
            base,
            method,
            calibrator: FittedCalibrator::new(method),
            fitted: false,
        }
    }

    pub fn method(&self) -> CalibrationMethod {
        self.method
    }

    /// Wrapped estimator
    pub fn base(&self) -> &dyn Estimator {
        self.base.as_ref()
    }
}

impl Estimator for CalibratedClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let raw = positive_proba(self.base.as_ref(), x)?;
        self.calibrator.as_calibrator_mut().fit(&raw, y)?;
        self.fitted = true;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(crate::error::AutoMLError::ModelNotFitted);
        }
        let raw = positive_proba(self.base.as_ref(), x)?;
        let calibrated = self.calibrator.as_calibrator().calibrate(&raw)?;
        Ok(two_column_proba(&calibrated))
    }

    fn params(&self) -> ParamMap {
        let mut params = self.base.params();
        let method = match self.method {
            CalibrationMethod::Sigmoid => "sigmoid",
            CalibrationMethod::Isotonic => "isotonic",
        };
        params.insert("calibration_method".into(), ParamValue::from(method));
        params
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Self::prefit(self.base.boxed_clone(), self.method))
    }

    fn boxed_clone(&self) -> Box<dyn Estimator> {
        Box::new(Self {
            base: self.base.boxed_clone(),
            method: self.method,
            calibrator: self.calibrator.clone(),
            fitted: self.fitted,
        })
    }

    fn to_saved(&self) -> Result<SavedEstimator> {
        Ok(SavedEstimator::Calibrated(CalibratedClassifierState {
            base: Box::new(self.base.to_saved()?),
            method: self.method,
            calibrator: self.calibrator.clone(),
            fitted: self.fitted,
        }))
    }
}

/// Persisted form of a [`CalibratedClassifier`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratedClassifierState {
    base: Box<SavedEstimator>,
    method: CalibrationMethod,
    calibrator: FittedCalibrator,
    fitted: bool,
}

impl CalibratedClassifierState {
    pub fn into_classifier(self) -> CalibratedClassifier {
        CalibratedClassifier {
            base: self.base.into_estimator(),
            method: self.method,
            calibrator: self.calibrator,
            fitted: self.fitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogisticRegression;
    use ndarray::array;

    fn fitted_base() -> (Box<dyn Estimator>, Array2<f64>, Array1<f64>) {
        let x = array![[-2.0], [-1.0], [-0.5], [0.5], [1.0], [2.0], [0.2], [-0.2]];
        let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let mut base = LogisticRegression::new();
        base.fit(&x, &y).unwrap();
        (Box::new(base), x, y)
    }

    #[test]
    fn test_prefit_keeps_base_unchanged() {
        let (base, x, y) = fitted_base();
        let before = base.predict_proba(&x).unwrap();
        let mut calibrated = CalibratedClassifier::prefit(base, CalibrationMethod::Sigmoid);
        calibrated.fit(&x, &y).unwrap();
        assert_eq!(calibrated.base().predict_proba(&x).unwrap(), before);

        let proba = calibrated.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_saved_roundtrip_predicts_the_same() {
        let (base, x, y) = fitted_base();
        let mut calibrated = CalibratedClassifier::prefit(base, CalibrationMethod::Isotonic);
        calibrated.fit(&x, &y).unwrap();

        let json = serde_json::to_string(&calibrated.to_saved().unwrap()).unwrap();
        let saved: SavedEstimator = serde_json::from_str(&json).unwrap();
        let restored = saved.into_estimator();
        assert_eq!(
            restored.predict_proba(&x).unwrap(),
            calibrated.predict_proba(&x).unwrap()
        );
    }
}
