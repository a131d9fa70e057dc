//! Platt scaling (sigmoid calibration)

use super::Calibrator;
use crate::error::{AutoMLError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Platt scaling calibrator
///
/// Fits `P(y=1|f) = 1 / (1 + exp(-(A*f + B)))` where `f` is the logit of the
/// uncalibrated probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlattScaling {
    a: Option<f64>,
    b: Option<f64>,
    max_iter: usize,
    tol: f64,
}

impl PlattScaling {
    pub fn new() -> Self {
        Self {
            a: None,
            b: None,
            max_iter: 100,
            tol: 1e-9,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fitted `(A, B)`
    pub fn parameters(&self) -> Option<(f64, f64)> {
        match (self.a, self.b) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    fn logit(p: f64) -> f64 {
        let p = p.clamp(1e-10, 1.0 - 1e-10);
        (p / (1.0 - p)).ln()
    }

    fn loss(logits: &[f64], targets: &[f64], a: f64, b: f64) -> f64 {
        logits
            .iter()
            .zip(targets)
            .map(|(&f, &t)| {
                let p = Self::sigmoid(a * f + b).clamp(1e-15, 1.0 - 1e-15);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum()
    }
}

impl Default for PlattScaling {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator for PlattScaling {
    fn fit(&mut self, probs: &Array1<f64>, labels: &Array1<f64>) -> Result<()> {
        let n = probs.len();
        if n != labels.len() {
            return Err(AutoMLError::ValidationError(
                "Probabilities and labels must have same length".to_string(),
            ));
        }
        if n == 0 {
            return Err(AutoMLError::ValidationError("Empty input".to_string()));
        }

        let logits: Vec<f64> = probs.iter().map(|&p| Self::logit(p)).collect();

        // Platt's smoothed targets keep the optimum finite on separable data
        let n_pos = labels.iter().filter(|&&y| y > 0.5).count() as f64;
        let n_neg = n as f64 - n_pos;
        let target_pos = (n_pos + 1.0) / (n_pos + 2.0);
        let target_neg = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = labels
            .iter()
            .map(|&y| if y > 0.5 { target_pos } else { target_neg })
            .collect();

        let mut a = 1.0;
        let mut b = 0.0;
        let mut current = Self::loss(&logits, &targets, a, b);

        for _ in 0..self.max_iter {
            let (mut grad_a, mut grad_b) = (0.0, 0.0);
            let (mut h_aa, mut h_ab, mut h_bb) = (1e-12, 0.0, 1e-12);

            for (&f, &t) in logits.iter().zip(&targets) {
                let p = Self::sigmoid(a * f + b);
                let d1 = p - t;
                let d2 = p * (1.0 - p);
                grad_a += f * d1;
                grad_b += d1;
                h_aa += f * f * d2;
                h_ab += f * d2;
                h_bb += d2;
            }

            let det = h_aa * h_bb - h_ab * h_ab;
            if det.abs() < 1e-18 {
                break;
            }
            let delta_a = (h_bb * grad_a - h_ab * grad_b) / det;
            let delta_b = (h_aa * grad_b - h_ab * grad_a) / det;

            // Backtracking keeps every accepted step a descent step
            let mut step = 1.0;
            let mut improved = false;
            while step > 1e-10 {
                let (na, nb) = (a - step * delta_a, b - step * delta_b);
                let candidate = Self::loss(&logits, &targets, na, nb);
                if candidate <= current {
                    a = na;
                    b = nb;
                    current = candidate;
                    improved = true;
                    break;
                }
                step /= 2.0;
            }

            if !improved || (step * delta_a).abs().max((step * delta_b).abs()) < self.tol {
                break;
            }
        }

        self.a = Some(a);
        self.b = Some(b);
        Ok(())
    }

    fn calibrate(&self, probs: &Array1<f64>) -> Result<Array1<f64>> {
        let (a, b) = self.parameters().ok_or(AutoMLError::ModelNotFitted)?;
        Ok(probs.mapv(|p| Self::sigmoid(a * Self::logit(p) + b)))
    }
}
