//! Feature attribution plots

use super::colors::TEST_COLOR;
use super::{save_figure, Bar, Figure, Orientation, PlotRenderer, Tick, Trace};
use crate::error::{AutoMLError, Result};
use crate::model::FeatureOrigin;
use ndarray::{Array2, ArrayView1, Axis};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 500;

fn check_shapes(values: &Array2<f64>, data: &Array2<f64>, names: &[String]) -> Result<()> {
    if values.dim() != data.dim() || values.ncols() != names.len() {
        return Err(AutoMLError::ShapeError {
            expected: format!("{} rows x {} features", data.nrows(), names.len()),
            actual: format!("{} rows x {} attributions", values.nrows(), values.ncols()),
        });
    }
    Ok(())
}

/// Min-max scaled copy of a column, constant columns map to 0.5
fn scaled(column: ArrayView1<'_, f64>) -> Vec<f64> {
    let (lo, hi) = column
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    column
        .iter()
        .map(|&v| if span > 0.0 { (v - lo) / span } else { 0.5 })
        .collect()
}

/// Feature indices by decreasing mean absolute attribution
fn importance_order(values: &Array2<f64>) -> Vec<(usize, f64)> {
    let mut order: Vec<(usize, f64)> = values
        .axis_iter(Axis(1))
        .map(|col| col.mapv(f64::abs).mean().unwrap_or(0.0))
        .enumerate()
        .collect();
    order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    order
}

/// One row of points per feature, most important on top, shaded by feature value
pub fn summary_figure(values: &Array2<f64>, data: &Array2<f64>, names: &[String]) -> Result<Figure> {
    check_shapes(values, data, names)?;
    let order = importance_order(values);
    let n = order.len();

    let mut points = Vec::with_capacity(values.len());
    let mut intensity = Vec::with_capacity(values.len());
    let mut ticks: Vec<Tick> = Vec::with_capacity(n);
    for (rank, &(j, _)) in order.iter().enumerate() {
        let row = (n - rank) as f64;
        ticks.push((row, names[j].clone()));
        let shade = scaled(data.column(j));
        for (i, &v) in values.column(j).iter().enumerate() {
            // deterministic jitter so overlapping points stay visible
            let jitter = ((i * 37) % 21) as f64 / 50.0 - 0.2;
            points.push((v, row + jitter));
            intensity.push(shade[i]);
        }
    }

    Ok(Figure::new("SHAP summary")
        .with_labels("SHAP value (impact on model output)", "")
        .with_size(WIDTH, HEIGHT)
        .with_y_lim(0.3, n as f64 + 0.7)
        .with_y_ticks(ticks)
        .add(Trace::Scatter {
            label: None,
            color: TEST_COLOR.to_string(),
            points,
            intensity: Some(intensity),
        }))
}

/// Mean absolute attribution per feature
pub fn summary_bar_figure(values: &Array2<f64>, data: &Array2<f64>, names: &[String]) -> Result<Figure> {
    check_shapes(values, data, names)?;
    let order = importance_order(values);
    let n = order.len();

    let bars = order
        .iter()
        .enumerate()
        .map(|(rank, &(_, importance))| Bar {
            position: (n - rank) as f64,
            width: 0.7,
            value: importance,
        })
        .collect();
    let ticks = order
        .iter()
        .enumerate()
        .map(|(rank, &(j, _))| ((n - rank) as f64, names[j].clone()))
        .collect();

    Ok(Figure::new("SHAP feature importance")
        .with_labels("mean(|SHAP value|)", "")
        .with_size(WIDTH, HEIGHT)
        .with_y_ticks(ticks)
        .add(Trace::Bars {
            label: None,
            color: TEST_COLOR.to_string(),
            bars,
            orientation: Orientation::Horizontal,
            annotate: false,
        }))
}

/// Tick labels on the original scale of a numeric feature
///
/// Labels are rounded to one order of magnitude below the original value
/// range, so neighbouring ticks can print the same value on narrow ranges.
/// Returns `None` for categorical features or a degenerate range.
pub fn original_ticks(origin: &FeatureOrigin, lo: f64, hi: f64, count: usize) -> Option<Vec<Tick>> {
    let (orig_lo, orig_hi) = (origin.to_original(lo)?, origin.to_original(hi)?);
    let range = (orig_hi - orig_lo).abs();
    if !range.is_finite() || range == 0.0 || count < 2 {
        return None;
    }
    let exponent = range.log10().floor() as i32 - 1;
    let step = 10f64.powi(exponent);
    let decimals = (-exponent).max(0) as usize;

    let ticks = (0..count)
        .filter_map(|i| {
            let t = lo + (hi - lo) * i as f64 / (count - 1) as f64;
            let original = origin.to_original(t)?;
            let rounded = (original / step).round() * step;
            Some((t, format!("{:.*}", decimals, rounded)))
        })
        .collect();
    Some(ticks)
}

/// Attribution against feature value for feature `j`
pub fn dependence_figure(
    values: &Array2<f64>,
    data: &Array2<f64>,
    names: &[String],
    origin: Option<&FeatureOrigin>,
    j: usize,
) -> Result<Figure> {
    check_shapes(values, data, names)?;
    let name = names
        .get(j)
        .ok_or_else(|| AutoMLError::FeatureNotFound(format!("feature index {}", j)))?;
    let column = data.column(j);
    let points: Vec<(f64, f64)> = column.iter().copied().zip(values.column(j).iter().copied()).collect();

    let mut fig = Figure::new(format!("SHAP dependence: {}", name))
        .with_size(WIDTH, HEIGHT)
        .add(Trace::Scatter {
            label: None,
            color: TEST_COLOR.to_string(),
            points,
            intensity: Some(scaled(column)),
        });

    let (lo, hi) = column
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let ticks = origin.and_then(|o| original_ticks(o, lo, hi, 6));
    let x_label = match (&ticks, origin) {
        (Some(_), Some(o)) => o.column().to_string(),
        _ => name.clone(),
    };
    fig = fig.with_labels(x_label, format!("SHAP value for {}", name));
    if let Some(ticks) = ticks {
        let pad = (hi - lo) * 0.05;
        fig = fig.with_x_lim(lo - pad, hi + pad).with_x_ticks(ticks);
    }
    Ok(fig)
}

/// File-system safe form of a feature name
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect()
}

pub fn save_shap_summary(
    renderer: &dyn PlotRenderer,
    dir: &Path,
    values: &Array2<f64>,
    data: &Array2<f64>,
    names: &[String],
) -> Option<PathBuf> {
    save_figure(renderer, dir, "shap_summary", "Shap summary diagram", summary_figure(values, data, names))
}

pub fn save_shap_summary_bar(
    renderer: &dyn PlotRenderer,
    dir: &Path,
    values: &Array2<f64>,
    data: &Array2<f64>,
    names: &[String],
) -> Option<PathBuf> {
    save_figure(
        renderer,
        dir,
        "shap_summary_bar",
        "Shap summary bar diagram",
        summary_bar_figure(values, data, names),
    )
}

/// One dependence plot per transformed feature; failed plots are skipped
pub fn save_shap_dependence_plots(
    renderer: &dyn PlotRenderer,
    dir: &Path,
    values: &Array2<f64>,
    data: &Array2<f64>,
    names: &[String],
    origins: &[FeatureOrigin],
) -> Vec<PathBuf> {
    names
        .iter()
        .enumerate()
        .filter_map(|(j, name)| {
            save_figure(
                renderer,
                dir,
                &format!("shap_dependence_{}", file_safe(name)),
                &format!("dependence plot for {}", name),
                dependence_figure(values, data, names, origins.get(j), j),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names() -> Vec<String> {
        vec!["num__age".to_string(), "cat__sex_male".to_string()]
    }

    #[test]
    fn test_summary_orders_by_importance() {
        let values = array![[0.1, -0.5], [-0.1, 0.6]];
        let data = array![[1.0, 0.0], [2.0, 1.0]];
        let fig = summary_figure(&values, &data, &names()).unwrap();
        let ticks = fig.y_ticks.unwrap();
        assert_eq!(ticks[0], (2.0, "cat__sex_male".to_string()));
        assert_eq!(ticks[1], (1.0, "num__age".to_string()));
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let values = array![[0.1, -0.5]];
        let data = array![[1.0, 0.0], [2.0, 1.0]];
        assert!(summary_bar_figure(&values, &data, &names()).is_err());
    }

    #[test]
    fn test_original_ticks_reverse_scaling() {
        let origin = FeatureOrigin::Numeric {
            column: "age".to_string(),
            center: 40.0,
            scale: 10.0,
        };
        // transformed [-2, 2] is original [20, 60], range 40 -> whole numbers
        let ticks = original_ticks(&origin, -2.0, 2.0, 5).unwrap();
        let labels: Vec<&str> = ticks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(labels, vec!["20", "30", "40", "50", "60"]);
        assert_eq!(ticks[0].0, -2.0);
    }

    #[test]
    fn test_original_ticks_skip_categorical() {
        let origin = FeatureOrigin::Categorical {
            column: "sex".to_string(),
            category: "male".to_string(),
        };
        assert!(original_ticks(&origin, 0.0, 1.0, 5).is_none());
    }

    #[test]
    fn test_original_ticks_round_small_ranges() {
        let origin = FeatureOrigin::Raw { column: "ratio".to_string() };
        let ticks = original_ticks(&origin, 0.0, 0.5, 3).unwrap();
        let labels: Vec<&str> = ticks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(labels, vec!["0.00", "0.25", "0.50"]);
    }

    #[test]
    fn test_dependence_labels_use_original_column() {
        let values = array![[0.1, -0.5], [-0.1, 0.6]];
        let data = array![[-1.0, 0.0], [1.0, 1.0]];
        let origin = FeatureOrigin::Numeric {
            column: "age".to_string(),
            center: 40.0,
            scale: 10.0,
        };
        let fig = dependence_figure(&values, &data, &names(), Some(&origin), 0).unwrap();
        assert_eq!(fig.x_label, "age");
        assert!(fig.x_ticks.is_some());
        assert_eq!(file_safe("cat__city_New York"), "cat__city_New_York");
    }
}
