//! Isotonic regression calibration

use super::Calibrator;
use crate::error::{AutoMLError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Non-parametric calibrator fitting a monotonically increasing step function,
/// linearly interpolated between block boundaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsotonicRegression {
    x_values: Vec<f64>,
    y_values: Vec<f64>,
}

impl IsotonicRegression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool Adjacent Violators over sorted targets; returns one fitted value
    /// per input
    fn pava(y: &[f64]) -> Vec<f64> {
        // (mean, weight, count)
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(y.len());
        for &v in y {
            blocks.push((v, 1.0, 1));
            while blocks.len() > 1 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.0 <= last.0 {
                    break;
                }
                let weight = prev.1 + last.1;
                let merged = ((prev.0 * prev.1 + last.0 * last.1) / weight, weight, prev.2 + last.2);
                blocks.pop();
                let end = blocks.len() - 1;
                blocks[end] = merged;
            }
        }
        blocks
            .into_iter()
            .flat_map(|(mean, _, count)| std::iter::repeat(mean).take(count))
            .collect()
    }

    fn interpolate(&self, x: f64) -> f64 {
        let xs = &self.x_values;
        let ys = &self.y_values;
        let last = xs.len() - 1;
        if x <= xs[0] {
            return ys[0];
        }
        if x >= xs[last] {
            return ys[last];
        }
        let hi = xs.partition_point(|&v| v <= x);
        let lo = hi - 1;
        let (x0, x1, y0, y1) = (xs[lo], xs[hi], ys[lo], ys[hi]);
        if (x1 - x0).abs() < 1e-12 {
            return y0;
        }
        y0 + (x - x0) / (x1 - x0) * (y1 - y0)
    }
}

impl Calibrator for IsotonicRegression {
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

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| probs[a].partial_cmp(&probs[b]).unwrap_or(std::cmp::Ordering::Equal));

        // Tied inputs share one target before pooling
        let mut xs: Vec<f64> = Vec::new();
        let mut sums: Vec<(f64, f64)> = Vec::new();
        for &i in &order {
            match xs.last() {
                Some(&last) if last == probs[i] => {
                    if let Some(entry) = sums.last_mut() {
                        entry.0 += labels[i];
                        entry.1 += 1.0;
                    }
                }
                _ => {
                    xs.push(probs[i]);
                    sums.push((labels[i], 1.0));
                }
            }
        }
        let means: Vec<f64> = sums.iter().map(|(s, w)| s / w).collect();
        let fitted = Self::pava(&means);

        self.x_values = xs;
        self.y_values = fitted;
        Ok(())
    }

    fn calibrate(&self, probs: &Array1<f64>) -> Result<Array1<f64>> {
        if self.x_values.is_empty() {
            return Err(AutoMLError::ModelNotFitted);
        }
        Ok(probs.mapv(|p| self.interpolate(p).clamp(0.0, 1.0)))
    }
}
