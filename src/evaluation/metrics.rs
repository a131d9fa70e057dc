//! Binary classification metrics and curves
//!
//! Threshold-free scores (`roc_auc`, `average_precision`) work on
//! positive-class probabilities and require both classes to be present.
//! Threshold-based scores work on hard 0/1 predictions and return 0 when the
//! ratio is undefined.

use crate::error::{AutoMLError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Confusion matrix counts for a binary problem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionCounts {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut counts = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t > 0.5, p > 0.5) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn check_lengths(y_true: &Array1<f64>, other: &Array1<f64>) -> Result<()> {
    if y_true.len() != other.len() {
        return Err(AutoMLError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", other.len()),
        });
    }
    if y_true.is_empty() {
        return Err(AutoMLError::ValidationError("Cannot score an empty dataset".to_string()));
    }
    Ok(())
}

fn class_counts(y_true: &Array1<f64>) -> (usize, usize) {
    let n_pos = y_true.iter().filter(|&&y| y > 0.5).count();
    (n_pos, y_true.len() - n_pos)
}

fn require_both_classes(y_true: &Array1<f64>, metric: &str) -> Result<(usize, usize)> {
    let (n_pos, n_neg) = class_counts(y_true);
    if n_pos == 0 || n_neg == 0 {
        return Err(AutoMLError::ComputationError(format!(
            "Only one class present in y_true. {} is not defined in that case.",
            metric
        )));
    }
    Ok((n_pos, n_neg))
}

pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let c = ConfusionCounts::compute(y_true, y_pred);
    Ok(ratio(c.tp + c.tn, c.total()))
}

pub fn precision_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let c = ConfusionCounts::compute(y_true, y_pred);
    Ok(ratio(c.tp, c.tp + c.fp))
}

pub fn recall_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let c = ConfusionCounts::compute(y_true, y_pred);
    Ok(ratio(c.tp, c.tp + c.fn_))
}

pub fn f1_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let c = ConfusionCounts::compute(y_true, y_pred);
    Ok(ratio(2 * c.tp, 2 * c.tp + c.fp + c.fn_))
}

/// Average ranks (1-based), ties share the mean of their ranks
fn average_ranks(scores: &Array1<f64>) -> Vec<f64> {
    let n = scores.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Area under the ROC curve through the Mann-Whitney rank statistic
pub fn roc_auc_score(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64> {
    check_lengths(y_true, y_score)?;
    let (n_pos, n_neg) = require_both_classes(y_true, "ROC AUC score")?;
    let ranks = average_ranks(y_score);
    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(&y, _)| y > 0.5)
        .map(|(_, &r)| r)
        .sum();
    let n_pos_f = n_pos as f64;
    Ok((pos_rank_sum - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg as f64))
}

/// Cumulative true/false positive counts at each distinct threshold,
/// thresholds in decreasing order
struct ThresholdCounts {
    thresholds: Vec<f64>,
    tps: Vec<f64>,
    fps: Vec<f64>,
}

fn threshold_counts(y_true: &Array1<f64>, y_score: &Array1<f64>) -> ThresholdCounts {
    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[b].partial_cmp(&y_score[a]).unwrap_or(Ordering::Equal));

    let mut out = ThresholdCounts {
        thresholds: Vec::new(),
        tps: Vec::new(),
        fps: Vec::new(),
    };
    let (mut tp, mut fp) = (0.0, 0.0);
    for (k, &idx) in order.iter().enumerate() {
        if y_true[idx] > 0.5 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_threshold = order
            .get(k + 1)
            .map_or(true, |&next| y_score[next] != y_score[idx]);
        if last_of_threshold {
            out.thresholds.push(y_score[idx]);
            out.tps.push(tp);
            out.fps.push(fp);
        }
    }
    out
}

/// Points of a ROC curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// ROC curve starting at (0, 0) with an infinite threshold
pub fn roc_curve(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<RocCurve> {
    check_lengths(y_true, y_score)?;
    let (n_pos, n_neg) = require_both_classes(y_true, "ROC curve")?;
    let counts = threshold_counts(y_true, y_score);

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    for ((&t, &tp), &fp) in counts.thresholds.iter().zip(&counts.tps).zip(&counts.fps) {
        curve.fpr.push(fp / n_neg as f64);
        curve.tpr.push(tp / n_pos as f64);
        curve.thresholds.push(t);
    }
    Ok(curve)
}

/// Points of a precision-recall curve, ordered by decreasing recall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecallCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// Precision-recall pairs ending at (recall 0, precision 1); points past full
/// recall are dropped
pub fn precision_recall_curve(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<PrecisionRecallCurve> {
    check_lengths(y_true, y_score)?;
    let (n_pos, _) = require_both_classes(y_true, "Precision-recall curve")?;
    let counts = threshold_counts(y_true, y_score);

    let full = counts
        .tps
        .iter()
        .position(|&tp| tp >= n_pos as f64)
        .unwrap_or(counts.tps.len() - 1);

    let mut curve = PrecisionRecallCurve {
        precision: Vec::with_capacity(full + 2),
        recall: Vec::with_capacity(full + 2),
        thresholds: Vec::with_capacity(full + 1),
    };
    for k in (0..=full).rev() {
        let (tp, fp) = (counts.tps[k], counts.fps[k]);
        curve.precision.push(tp / (tp + fp));
        curve.recall.push(tp / n_pos as f64);
        curve.thresholds.push(counts.thresholds[k]);
    }
    curve.precision.push(1.0);
    curve.recall.push(0.0);
    curve.thresholds.reverse();
    Ok(curve)
}

/// Step-wise area under the precision-recall curve
pub fn average_precision_score(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64> {
    let curve = precision_recall_curve(y_true, y_score)?;
    let n = curve.recall.len();
    Ok((0..n - 1)
        .map(|k| (curve.recall[k] - curve.recall[k + 1]) * curve.precision[k])
        .sum())
}

/// Reliability diagram points over uniform bins on [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCurve {
    /// Observed positive rate per non-empty bin
    pub prob_true: Vec<f64>,
    /// Mean predicted probability per non-empty bin
    pub prob_pred: Vec<f64>,
}

pub fn calibration_curve(y_true: &Array1<f64>, y_prob: &Array1<f64>, n_bins: usize) -> Result<CalibrationCurve> {
    check_lengths(y_true, y_prob)?;
    if n_bins == 0 {
        return Err(AutoMLError::InvalidParameter {
            name: "n_bins".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if let Some(p) = y_prob.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(AutoMLError::ValidationError(format!(
            "y_prob has values outside [0, 1]: {}",
            p
        )));
    }

    let mut sums = vec![(0.0, 0.0, 0usize); n_bins];
    for (&y, &p) in y_true.iter().zip(y_prob.iter()) {
        // inner edges strictly below p, so an edge value belongs to the lower bin
        let bin = (1..n_bins)
            .filter(|&k| (k as f64 / n_bins as f64) < p)
            .count();
        sums[bin].0 += y;
        sums[bin].1 += p;
        sums[bin].2 += 1;
    }

    let mut curve = CalibrationCurve {
        prob_true: Vec::new(),
        prob_pred: Vec::new(),
    };
    for (y_sum, p_sum, count) in sums.into_iter().filter(|s| s.2 > 0) {
        curve.prob_true.push(y_sum / count as f64);
        curve.prob_pred.push(p_sum / count as f64);
    }
    Ok(curve)
}

/// Non-cumulative lift per quantile bin, highest-probability bin first
///
/// Bins are probability quantiles; duplicate bin edges are merged, so heavily
/// tied scores produce fewer than `n_bins` bars.
pub fn lift_by_quantile(y_true: &Array1<f64>, y_prob: &Array1<f64>, n_bins: usize) -> Result<Vec<f64>> {
    check_lengths(y_true, y_prob)?;
    let (n_pos, _) = class_counts(y_true);
    if n_pos == 0 {
        return Err(AutoMLError::ComputationError(
            "Lift is undefined without positive samples".to_string(),
        ));
    }
    let baseline = n_pos as f64 / y_true.len() as f64;

    let mut sorted: Vec<f64> = y_prob.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mut edges: Vec<f64> = (0..=n_bins).map(|k| quantile(&sorted, k as f64 / n_bins as f64)).collect();
    edges.dedup();
    if edges.len() < 2 {
        edges.push(edges[0]);
    }

    let n_edges = edges.len();
    let mut bins = vec![(0.0, 0usize); n_edges - 1];
    for (&y, &p) in y_true.iter().zip(y_prob.iter()) {
        // right-closed intervals, the first one also includes its left edge
        let bin = edges[1..n_edges - 1].iter().filter(|&&e| e < p).count();
        bins[bin].0 += y;
        bins[bin].1 += 1;
    }

    Ok(bins
        .into_iter()
        .rev()
        .filter(|b| b.1 > 0)
        .map(|(pos, count)| pos / count as f64 / baseline)
        .collect())
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Precision among the top fraction of samples ranked by probability,
/// one `(fraction, precision)` point per sample
pub fn cumulative_precision(y_true: &Array1<f64>, y_prob: &Array1<f64>) -> Result<Vec<(f64, f64)>> {
    check_lengths(y_true, y_prob)?;
    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| y_prob[b].partial_cmp(&y_prob[a]).unwrap_or(Ordering::Equal));

    let n = order.len() as f64;
    let mut positives = 0.0;
    Ok(order
        .iter()
        .enumerate()
        .map(|(rank, &idx)| {
            positives += y_true[idx];
            let k = (rank + 1) as f64;
            (k / n, positives / k)
        })
        .collect())
}

/// Fixed scorer set reported for every data role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    RocAuc,
    AveragePrecision,
    Accuracy,
    F1,
    Precision,
    Recall,
}

impl Scorer {
    pub const ALL: [Scorer; 6] = [
        Scorer::RocAuc,
        Scorer::AveragePrecision,
        Scorer::Accuracy,
        Scorer::F1,
        Scorer::Precision,
        Scorer::Recall,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scorer::RocAuc => "roc_auc",
            Scorer::AveragePrecision => "average_precision",
            Scorer::Accuracy => "accuracy",
            Scorer::F1 => "f1",
            Scorer::Precision => "precision",
            Scorer::Recall => "recall",
        }
    }

    /// Whether the scorer ranks probabilities rather than hard predictions
    pub fn needs_proba(&self) -> bool {
        matches!(self, Scorer::RocAuc | Scorer::AveragePrecision)
    }

    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>, y_proba: &Array1<f64>) -> Result<f64> {
        match self {
            Scorer::RocAuc => roc_auc_score(y_true, y_proba),
            Scorer::AveragePrecision => average_precision_score(y_true, y_proba),
            Scorer::Accuracy => accuracy_score(y_true, y_pred),
            Scorer::F1 => f1_score(y_true, y_pred),
            Scorer::Precision => precision_score(y_true, y_pred),
            Scorer::Recall => recall_score(y_true, y_pred),
        }
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scorer {
    type Err = AutoMLError;

    fn from_str(s: &str) -> Result<Self> {
        Scorer::ALL
            .iter()
            .copied()
            .find(|scorer| scorer.name() == s)
            .ok_or_else(|| AutoMLError::MetricNotFound(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_threshold_metrics() {
        let y = array![1.0, 1.0, 0.0, 0.0, 1.0];
        let pred = array![1.0, 0.0, 1.0, 0.0, 1.0];
        assert!(approx(accuracy_score(&y, &pred).unwrap(), 0.6));
        assert!(approx(precision_score(&y, &pred).unwrap(), 2.0 / 3.0));
        assert!(approx(recall_score(&y, &pred).unwrap(), 2.0 / 3.0));
        assert!(approx(f1_score(&y, &pred).unwrap(), 2.0 / 3.0));
    }

    #[test]
    fn test_undefined_ratios_are_zero() {
        let y = array![0.0, 0.0, 1.0];
        let pred = array![0.0, 0.0, 0.0];
        assert_eq!(precision_score(&y, &pred).unwrap(), 0.0);
        assert_eq!(recall_score(&y, &pred).unwrap(), 0.0);
        assert_eq!(f1_score(&y, &pred).unwrap(), 0.0);
    }

    #[test]
    fn test_roc_auc_with_ties() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let score = array![0.1, 0.4, 0.35, 0.8];
        assert!(approx(roc_auc_score(&y, &score).unwrap(), 0.75));

        let tied = array![0.5, 0.5, 0.5, 0.5];
        assert!(approx(roc_auc_score(&y, &tied).unwrap(), 0.5));
    }

    #[test]
    fn test_single_class_fails() {
        let y = array![1.0, 1.0];
        let score = array![0.2, 0.9];
        assert!(roc_auc_score(&y, &score).is_err());
        assert!(average_precision_score(&y, &score).is_err());
    }

    #[test]
    fn test_average_precision_matches_reference() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let score = array![0.1, 0.4, 0.35, 0.8];
        assert!(approx(average_precision_score(&y, &score).unwrap(), 0.8333333333333333));
    }

    #[test]
    fn test_perfect_separation() {
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0];
        let score = array![0.1, 0.2, 0.3, 0.7, 0.9];
        assert_eq!(roc_auc_score(&y, &score).unwrap(), 1.0);
        assert_eq!(average_precision_score(&y, &score).unwrap(), 1.0);
    }

    #[test]
    fn test_roc_curve_endpoints() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let score = array![0.1, 0.4, 0.35, 0.8];
        let curve = roc_curve(&y, &score).unwrap();
        assert_eq!((curve.fpr[0], curve.tpr[0]), (0.0, 0.0));
        assert_eq!((*curve.fpr.last().unwrap(), *curve.tpr.last().unwrap()), (1.0, 1.0));
        assert!(curve.thresholds[0].is_infinite());
    }

    #[test]
    fn test_pr_curve_ends_at_zero_recall() {
        let y = array![0.0, 1.0, 1.0, 0.0];
        let score = array![0.2, 0.9, 0.6, 0.1];
        let curve = precision_recall_curve(&y, &score).unwrap();
        assert_eq!(curve.recall[0], 1.0);
        assert_eq!(*curve.recall.last().unwrap(), 0.0);
        assert_eq!(*curve.precision.last().unwrap(), 1.0);
        assert_eq!(curve.thresholds.len(), curve.precision.len() - 1);
    }

    #[test]
    fn test_calibration_curve_bins() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let prob = array![0.1, 0.1, 0.9, 0.8];
        let curve = calibration_curve(&y, &prob, 10).unwrap();
        assert_eq!(curve.prob_true, vec![0.0, 1.0, 1.0]);
        assert!(approx(curve.prob_pred[0], 0.1));
        assert!(calibration_curve(&y, &array![0.1, 0.1, 1.2, 0.8], 10).is_err());
    }

    #[test]
    fn test_lift_highest_bin_first() {
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let prob = array![0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.9, 0.95];
        let lift = lift_by_quantile(&y, &prob, 10).unwrap();
        assert_eq!(lift.len(), 10);
        assert!(approx(lift[0], 5.0));
        assert!(approx(lift[9], 0.0));
    }

    #[test]
    fn test_lift_merges_duplicate_edges() {
        let y = array![0.0, 1.0, 0.0, 1.0];
        let prob = array![0.5, 0.5, 0.5, 0.5];
        let lift = lift_by_quantile(&y, &prob, 10).unwrap();
        assert_eq!(lift, vec![1.0]);
    }

    #[test]
    fn test_cumulative_precision() {
        let y = array![1.0, 0.0, 1.0, 0.0];
        let prob = array![0.9, 0.8, 0.7, 0.1];
        let points = cumulative_precision(&y, &prob).unwrap();
        assert_eq!(points[0], (0.25, 1.0));
        assert_eq!(points[1], (0.5, 0.5));
        assert!(approx(points[2].1, 2.0 / 3.0));
        assert_eq!(points[3], (1.0, 0.5));
    }

    #[test]
    fn test_scorer_names() {
        assert_eq!("roc_auc".parse::<Scorer>().unwrap(), Scorer::RocAuc);
        assert!("logloss".parse::<Scorer>().is_err());
        assert!(Scorer::AveragePrecision.needs_proba());
        assert!(!Scorer::F1.needs_proba());
    }
}
