//! L2-regularised logistic regression trained by gradient descent

use super::{check_binary_target, two_column_proba, Estimator, SavedEstimator};
use crate::error::{AutoMLError, Result};
use crate::optimizer::{ParamMap, ParamReader, ParamValue};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// Regularization strength (L2)
    pub alpha: f64,
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    pub learning_rate: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
        }
    }

    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let reader = ParamReader::new(params, "LogisticRegression");
        reader.only(&["alpha", "max_iter", "tol", "learning_rate", "fit_intercept"])?;

        let mut model = Self::new();
        if let Some(v) = reader.f64("alpha")? {
            model.alpha = v;
        }
        if let Some(v) = reader.usize("max_iter")? {
            model.max_iter = v;
        }
        if let Some(v) = reader.f64("tol")? {
            model.tol = v;
        }
        if let Some(v) = reader.f64("learning_rate")? {
            if v <= 0.0 {
                return Err(AutoMLError::InvalidParameter {
                    name: "learning_rate".to_string(),
                    value: v.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            model.learning_rate = v;
        }
        if let Some(v) = reader.bool("fit_intercept")? {
            model.fit_intercept = v;
        }
        Ok(model)
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Positive-class probability per row
    pub fn predict_positive(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(AutoMLError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(AutoMLError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let linear = x.dot(coefficients) + self.intercept.unwrap_or(0.0);
        Ok(Self::sigmoid(&linear))
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_binary_target(x, y)?;
        let n_samples = x.nrows() as f64;

        let mut weights: Array1<f64> = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let predictions = Self::sigmoid(&(x.dot(&weights) + bias));
            let errors = &predictions - y;
            let dw = x.t().dot(&errors) / n_samples + self.alpha * &weights;
            let db = if self.fit_intercept {
                errors.mean().unwrap_or(0.0)
            } else {
                0.0
            };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(AutoMLError::TrainingError(
                "Logistic regression diverged; lower the learning rate".to_string(),
            ));
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(two_column_proba(&self.predict_positive(x)?))
    }

    fn params(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("alpha".into(), ParamValue::Float(self.alpha));
        params.insert("max_iter".into(), ParamValue::Int(self.max_iter as i64));
        params.insert("tol".into(), ParamValue::Float(self.tol));
        params.insert("learning_rate".into(), ParamValue::Float(self.learning_rate));
        params.insert("fit_intercept".into(), ParamValue::Bool(self.fit_intercept));
        params
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        let mut model = self.clone();
        model.coefficients = None;
        model.intercept = None;
        Box::new(model)
    }

    fn boxed_clone(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }

    fn to_saved(&self) -> Result<SavedEstimator> {
        Ok(SavedEstimator::LogisticRegression(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_separates_classes() {
        let x = array![[-2.0], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new().with_learning_rate(0.5);
        model.fit(&x, &y).unwrap();

        let p = model.predict_positive(&x).unwrap();
        assert!(p[0] < 0.5);
        assert!(p[5] > 0.5);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_clone_unfitted_drops_coefficients() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        let fresh = model.clone_unfitted();
        assert!(matches!(fresh.predict_proba(&x), Err(AutoMLError::ModelNotFitted)));
    }
}
