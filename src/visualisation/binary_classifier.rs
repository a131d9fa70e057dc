//! Diagnostic plots for binary classifiers

use super::colors::{role_color, BASELINE_COLOR, TEST_COLOR};
use super::{save_figure, Bar, Figure, LineStyle, Orientation, PlotRenderer, Trace};
use crate::error::{AutoMLError, Result};
use crate::evaluation::metrics::{
    average_precision_score, calibration_curve, cumulative_precision, lift_by_quantile,
    precision_recall_curve, roc_auc_score, roc_curve,
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Labels and predicted positive-class probabilities of one data role
#[derive(Debug, Clone, Copy)]
pub struct PlotData<'a> {
    pub role: &'a str,
    pub y: &'a Array1<f64>,
    pub y_pred_proba: &'a Array1<f64>,
}

/// Diagnostic plot types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Roc,
    #[serde(rename = "pr")]
    PrecisionRecall,
    LiftDeciles,
    CumPrecision,
    #[serde(rename = "distribution")]
    PredictionDistribution,
    #[serde(rename = "calibration")]
    CalibrationCurve,
    #[serde(rename = "calibration_zoom")]
    CalibrationCurveZoom,
}

impl PlotKind {
    /// Plots drawn for `all`
    pub const STANDARD: [PlotKind; 5] = [
        PlotKind::Roc,
        PlotKind::PrecisionRecall,
        PlotKind::LiftDeciles,
        PlotKind::CumPrecision,
        PlotKind::PredictionDistribution,
    ];

    /// Plots drawn when evaluating a calibrated model
    pub const CALIBRATION: [PlotKind; 5] = [
        PlotKind::Roc,
        PlotKind::PrecisionRecall,
        PlotKind::CalibrationCurve,
        PlotKind::CalibrationCurveZoom,
        PlotKind::PredictionDistribution,
    ];

    const ALL: [PlotKind; 7] = [
        PlotKind::Roc,
        PlotKind::PrecisionRecall,
        PlotKind::LiftDeciles,
        PlotKind::CumPrecision,
        PlotKind::PredictionDistribution,
        PlotKind::CalibrationCurve,
        PlotKind::CalibrationCurveZoom,
    ];

    /// Name used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            PlotKind::Roc => "roc",
            PlotKind::PrecisionRecall => "pr",
            PlotKind::LiftDeciles => "lift_deciles",
            PlotKind::CumPrecision => "cum_precision",
            PlotKind::PredictionDistribution => "distribution",
            PlotKind::CalibrationCurve => "calibration",
            PlotKind::CalibrationCurveZoom => "calibration_zoom",
        }
    }

    /// Artifact file stem
    pub fn file_stem(&self) -> &'static str {
        match self {
            PlotKind::Roc => "roc",
            PlotKind::PrecisionRecall => "precision_recall",
            PlotKind::LiftDeciles => "lift_deciles",
            PlotKind::CumPrecision => "cum_precision",
            PlotKind::PredictionDistribution => "prediction_distribution",
            PlotKind::CalibrationCurve => "calibration_curve",
            PlotKind::CalibrationCurveZoom => "calibration_curve_zoom",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PlotKind::Roc => "ROC curve",
            PlotKind::PrecisionRecall => "Precision-Recall curve",
            PlotKind::LiftDeciles => "lift deciles",
            PlotKind::CumPrecision => "cumulative precision curve",
            PlotKind::PredictionDistribution => "prediction distribution",
            PlotKind::CalibrationCurve => "calibration curve",
            PlotKind::CalibrationCurveZoom => "calibration curve zoom",
        }
    }

    /// Resolve configured plot names; `all` expands to [`PlotKind::STANDARD`]
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<PlotKind>> {
        let mut kinds = Vec::new();
        for name in names {
            let expanded: Vec<PlotKind> = match name.as_ref() {
                "all" => PlotKind::STANDARD.to_vec(),
                "" => Vec::new(),
                other => vec![other.parse()?],
            };
            for kind in expanded {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        Ok(kinds)
    }

    pub fn figure(&self, data: &[PlotData<'_>]) -> Result<Figure> {
        match self {
            PlotKind::Roc => roc_figure(data),
            PlotKind::PrecisionRecall => precision_recall_figure(data),
            PlotKind::LiftDeciles => lift_deciles_figure(test_data(data)?),
            PlotKind::CumPrecision => cum_precision_figure(data),
            PlotKind::PredictionDistribution => prediction_distribution_figure(data),
            PlotKind::CalibrationCurve => calibration_figure(test_data(data)?, false),
            PlotKind::CalibrationCurveZoom => calibration_figure(test_data(data)?, true),
        }
    }

    /// Render into `dir` as `<prefix><file_stem>`; failures are logged and
    /// give `None`
    pub fn save(
        &self,
        renderer: &dyn PlotRenderer,
        dir: &Path,
        prefix: &str,
        data: &[PlotData<'_>],
    ) -> Option<PathBuf> {
        let stem = format!("{}{}", prefix, self.file_stem());
        save_figure(renderer, dir, &stem, self.description(), self.figure(data))
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlotKind {
    type Err = AutoMLError;

    fn from_str(s: &str) -> Result<Self> {
        PlotKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| AutoMLError::ConfigError(format!("Unknown plot: {}", s)))
    }
}

fn test_data<'a, 'b>(data: &'b [PlotData<'a>]) -> Result<&'b PlotData<'a>> {
    data.iter()
        .find(|d| d.role == "test")
        .ok_or_else(|| AutoMLError::PlotError("No 'test' data to plot".to_string()))
}

fn unit_square(title: &str, x_label: &str, y_label: &str) -> Figure {
    Figure::new(title)
        .with_labels(x_label, y_label)
        .with_x_lim(-0.05, 1.05)
        .with_y_lim(-0.05, 1.05)
}

pub fn roc_figure(data: &[PlotData<'_>]) -> Result<Figure> {
    let mut fig = unit_square("Receiver Operating Characteristic Curve", "False Positive Rate", "True Positive Rate")
        .add(Trace::reference_line(BASELINE_COLOR, vec![(0.0, 0.0), (1.0, 1.0)]));
    for d in data {
        let auc = roc_auc_score(d.y, d.y_pred_proba)?;
        let curve = roc_curve(d.y, d.y_pred_proba)?;
        let label = format!("{}: area = {:.2}", d.role, auc);
        let points = curve.fpr.into_iter().zip(curve.tpr).collect();
        fig.push(Trace::line(Some(&label), role_color(d.role), points));
    }
    Ok(fig)
}

pub fn precision_recall_figure(data: &[PlotData<'_>]) -> Result<Figure> {
    let mut fig = unit_square("Precision-Recall Curve", "Recall", "Precision");
    for d in data {
        let ap = average_precision_score(d.y, d.y_pred_proba)?;
        let curve = precision_recall_curve(d.y, d.y_pred_proba)?;
        let label = format!("{}: area = {:.2}", d.role, ap);
        let points = curve.recall.into_iter().zip(curve.precision).collect();
        fig.push(Trace::line(Some(&label), role_color(d.role), points));
    }
    Ok(fig)
}

pub fn lift_deciles_figure(data: &PlotData<'_>) -> Result<Figure> {
    let lift = lift_by_quantile(data.y, data.y_pred_proba, 10)?;
    let bars = lift
        .iter()
        .enumerate()
        .map(|(i, &value)| Bar {
            position: (i + 1) as f64,
            width: 0.8,
            value,
        })
        .collect();
    Ok(Figure::new("Non-Cumulative Lift")
        .with_labels("Decile", "Lift")
        .add(Trace::Bars {
            label: None,
            color: TEST_COLOR.to_string(),
            bars,
            orientation: Orientation::Vertical,
            annotate: true,
        })
        .add(Trace::HLine {
            y: 1.0,
            color: BASELINE_COLOR.to_string(),
            style: LineStyle::Dotted,
        }))
}

pub fn cum_precision_figure(data: &[PlotData<'_>]) -> Result<Figure> {
    let mut fig = unit_square("Cumulative Precision", "Fraction of samples", "Precision");
    for d in data {
        let points = cumulative_precision(d.y, d.y_pred_proba)?;
        let baseline = d.y.mean().unwrap_or(0.0);
        fig.push(Trace::line(Some(d.role), role_color(d.role), points));
        fig.push(Trace::HLine {
            y: baseline,
            color: BASELINE_COLOR.to_string(),
            style: LineStyle::Dotted,
        });
    }
    Ok(fig)
}

/// Density-normalised histogram bars over [0, 1]
pub fn histogram(values: &Array1<f64>, n_bins: usize) -> Vec<Bar> {
    let width = 1.0 / n_bins as f64;
    let mut counts = vec![0usize; n_bins];
    for &v in values.iter().filter(|v| v.is_finite()) {
        let bin = ((v.clamp(0.0, 1.0) / width) as usize).min(n_bins - 1);
        counts[bin] += 1;
    }
    let total = values.len().max(1) as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bar {
            position: (i as f64 + 0.5) * width,
            width,
            value: count as f64 / (total * width),
        })
        .collect()
}

/// Train and test probability histograms side by side, test alone if there
/// is no train role
pub fn prediction_distribution_figure(data: &[PlotData<'_>]) -> Result<Figure> {
    let test = test_data(data)?;
    let mut series = Vec::new();
    if let Some(train) = data.iter().find(|d| d.role == "train") {
        series.push(train);
    }
    series.push(test);

    let n_series = series.len() as f64;
    let mut fig = Figure::new("Prediction distribution")
        .with_labels("Predicted probability", "Density")
        .with_x_lim(-0.05, 1.05);
    for (k, d) in series.iter().enumerate() {
        let bars = histogram(d.y_pred_proba, 20)
            .into_iter()
            .map(|b| {
                let slot = b.width / n_series;
                Bar {
                    position: b.position - b.width / 2.0 + slot * (k as f64 + 0.5),
                    width: slot,
                    value: b.value,
                }
            })
            .collect();
        fig.push(Trace::Bars {
            label: Some(d.role.to_string()),
            color: role_color(d.role).to_string(),
            bars,
            orientation: Orientation::Vertical,
            annotate: false,
        });
    }
    Ok(fig)
}

/// Reliability diagram; `zoom` fits the axes to the observed range
pub fn calibration_figure(data: &PlotData<'_>, zoom: bool) -> Result<Figure> {
    let curve = calibration_curve(data.y, data.y_pred_proba, 10)?;
    let title = if zoom { "Calibration curve (zoom)" } else { "Calibration curve" };
    let mut fig = Figure::new(title).with_labels("Mean predicted probability", "Fraction of positives");

    let hi = if zoom {
        curve
            .prob_pred
            .iter()
            .chain(&curve.prob_true)
            .fold(0.01_f64, |acc, &v| acc.max(v))
            * 1.05
    } else {
        1.05
    };
    let lo = if zoom { 0.0 } else { -0.05 };
    fig = fig
        .with_x_lim(lo, hi)
        .with_y_lim(lo, hi)
        .add(Trace::reference_line(BASELINE_COLOR, vec![(0.0, 0.0), (1.0, 1.0)]));

    let points: Vec<(f64, f64)> = curve.prob_pred.into_iter().zip(curve.prob_true).collect();
    fig.push(Trace::Line {
        label: Some(data.role.to_string()),
        color: TEST_COLOR.to_string(),
        points: points.clone(),
        style: LineStyle::Solid,
    });
    fig.push(Trace::Scatter {
        label: None,
        color: TEST_COLOR.to_string(),
        points,
        intensity: None,
    });
    Ok(fig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_list_expands_all() {
        let kinds = PlotKind::parse_list(&["all", "roc", "calibration"]).unwrap();
        assert_eq!(kinds.len(), 6);
        assert_eq!(kinds[0], PlotKind::Roc);
        assert_eq!(kinds[5], PlotKind::CalibrationCurve);
        assert!(PlotKind::parse_list(&["violin"]).is_err());
        assert!(PlotKind::parse_list::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_histogram_density_integrates_to_one() {
        let values = array![0.0, 0.1, 0.5, 0.52, 1.0];
        let bars = histogram(&values, 20);
        assert_eq!(bars.len(), 20);
        let area: f64 = bars.iter().map(|b| b.value * b.width).sum();
        assert!((area - 1.0).abs() < 1e-9);
        assert!(bars[19].value > 0.0);
    }

    #[test]
    fn test_test_only_plots_require_test_role() {
        let y = array![0.0, 1.0, 0.0, 1.0];
        let p = array![0.2, 0.8, 0.3, 0.6];
        let data = [PlotData { role: "train", y: &y, y_pred_proba: &p }];
        assert!(PlotKind::LiftDeciles.figure(&data).is_err());
        assert!(PlotKind::Roc.figure(&data).is_ok());
    }

    #[test]
    fn test_roc_legend_carries_area() {
        let y = array![0.0, 1.0, 0.0, 1.0];
        let p = array![0.2, 0.8, 0.3, 0.6];
        let data = [PlotData { role: "test", y: &y, y_pred_proba: &p }];
        let fig = roc_figure(&data).unwrap();
        let labels: Vec<&str> = fig.traces.iter().filter_map(|t| t.label()).map(|l| l.0).collect();
        assert_eq!(labels, vec!["test: area = 1.00"]);
    }
}
