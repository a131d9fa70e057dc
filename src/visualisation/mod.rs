//! Diagnostic plots
//!
//! Plot builders describe a chart as a [`Figure`] and hand it to a
//! [`PlotRenderer`]. Builders never propagate rendering errors: a failing plot
//! is logged and reported as a missing artifact.

pub mod binary_classifier;
pub mod colors;
pub mod shap;

mod svg;

pub use binary_classifier::PlotKind;
pub use svg::SvgRenderer;

use crate::error::{AutoMLError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stroke pattern for lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

/// One bar: centre position along the category axis, thickness, length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub position: f64,
    pub width: f64,
    pub value: f64,
}

/// Drawable series
#[derive(Debug, Clone, PartialEq)]
pub enum Trace {
    Line {
        label: Option<String>,
        color: String,
        points: Vec<(f64, f64)>,
        style: LineStyle,
    },
    /// Points, optionally shaded by an intensity in [0, 1]
    Scatter {
        label: Option<String>,
        color: String,
        points: Vec<(f64, f64)>,
        intensity: Option<Vec<f64>>,
    },
    Bars {
        label: Option<String>,
        color: String,
        bars: Vec<Bar>,
        orientation: Orientation,
        /// Print each bar's value next to it
        annotate: bool,
    },
    /// Horizontal reference line across the plot
    HLine { y: f64, color: String, style: LineStyle },
}

impl Trace {
    pub fn line(label: Option<&str>, color: &str, points: Vec<(f64, f64)>) -> Self {
        Trace::Line {
            label: label.map(str::to_string),
            color: color.to_string(),
            points,
            style: LineStyle::Solid,
        }
    }

    /// Dotted line without legend entry
    pub fn reference_line(color: &str, points: Vec<(f64, f64)>) -> Self {
        Trace::Line {
            label: None,
            color: color.to_string(),
            points,
            style: LineStyle::Dotted,
        }
    }

    pub fn label(&self) -> Option<(&str, &str)> {
        match self {
            Trace::Line { label, color, .. }
            | Trace::Scatter { label, color, .. }
            | Trace::Bars { label, color, .. } => label.as_deref().map(|l| (l, color.as_str())),
            Trace::HLine { .. } => None,
        }
    }

    /// Data-space points spanned by the trace, used for axis bounds
    fn extent_points(&self) -> Vec<(f64, f64)> {
        match self {
            Trace::Line { points, .. } | Trace::Scatter { points, .. } => points.clone(),
            Trace::Bars { bars, orientation, .. } => bars
                .iter()
                .flat_map(|b| {
                    let (lo, hi) = (b.position - b.width / 2.0, b.position + b.width / 2.0);
                    match orientation {
                        Orientation::Vertical => [(lo, 0.0), (hi, b.value)],
                        Orientation::Horizontal => [(0.0, lo), (b.value, hi)],
                    }
                })
                .collect(),
            Trace::HLine { .. } => Vec::new(),
        }
    }
}

/// Axis tick at a data position with its printed label
pub type Tick = (f64, String);

/// Chart description consumed by a [`PlotRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_lim: Option<(f64, f64)>,
    pub y_lim: Option<(f64, f64)>,
    pub x_ticks: Option<Vec<Tick>>,
    pub y_ticks: Option<Vec<Tick>>,
    pub width: u32,
    pub height: u32,
    pub traces: Vec<Trace>,
}

impl Figure {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            x_lim: None,
            y_lim: None,
            x_ticks: None,
            y_ticks: None,
            width: 640,
            height: 480,
            traces: Vec::new(),
        }
    }

    pub fn with_labels(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    pub fn with_x_lim(mut self, lo: f64, hi: f64) -> Self {
        self.x_lim = Some((lo, hi));
        self
    }

    pub fn with_y_lim(mut self, lo: f64, hi: f64) -> Self {
        self.y_lim = Some((lo, hi));
        self
    }

    pub fn with_x_ticks(mut self, ticks: Vec<Tick>) -> Self {
        self.x_ticks = Some(ticks);
        self
    }

    pub fn with_y_ticks(mut self, ticks: Vec<Tick>) -> Self {
        self.y_ticks = Some(ticks);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn add(mut self, trace: Trace) -> Self {
        self.traces.push(trace);
        self
    }

    pub fn push(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    /// Reject figures a renderer cannot draw
    pub fn validate(&self) -> Result<()> {
        if self.traces.is_empty() {
            return Err(AutoMLError::PlotError(format!("'{}' has nothing to plot", self.title)));
        }
        let finite = self.traces.iter().all(|t| match t {
            Trace::HLine { y, .. } => y.is_finite(),
            other => other.extent_points().iter().all(|(x, y)| x.is_finite() && y.is_finite()),
        });
        if !finite {
            return Err(AutoMLError::PlotError(format!(
                "'{}' contains non-finite coordinates",
                self.title
            )));
        }
        Ok(())
    }

    /// Axis ranges, from explicit limits or padded data extent
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let points: Vec<(f64, f64)> = self.traces.iter().flat_map(Trace::extent_points).collect();
        let hlines = self.traces.iter().filter_map(|t| match t {
            Trace::HLine { y, .. } => Some(*y),
            _ => None,
        });

        let x_range = self
            .x_lim
            .unwrap_or_else(|| padded_range(points.iter().map(|p| p.0)));
        let y_range = self
            .y_lim
            .unwrap_or_else(|| padded_range(points.iter().map(|p| p.1).chain(hlines)));
        (x_range, y_range)
    }
}

/// Data extent widened by 5% on each side
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// Evenly spaced ticks with short labels
pub fn linear_ticks(lo: f64, hi: f64, count: usize) -> Vec<Tick> {
    if count < 2 {
        return vec![(lo, format_tick(lo))];
    }
    (0..count)
        .map(|i| {
            let v = lo + (hi - lo) * i as f64 / (count - 1) as f64;
            (v, format_tick(v))
        })
        .collect()
}

pub(crate) fn format_tick(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let magnitude = v.abs();
    if (1e-3..1e5).contains(&magnitude) {
        let s = format!("{:.3}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        format!("{:.2e}", v)
    }
}

/// Renders a figure to a file
pub trait PlotRenderer: Send + Sync {
    fn render(&self, figure: &Figure, path: &Path) -> Result<()>;

    /// File extension written by this renderer
    fn extension(&self) -> &str;
}

/// Render `figure` to `dir/<stem>.<ext>`, returning the path on success
///
/// Failures are logged as `Error plotting the <what>: <error>` and yield `None`.
pub fn save_figure(
    renderer: &dyn PlotRenderer,
    dir: &Path,
    stem: &str,
    what: &str,
    figure: Result<Figure>,
) -> Option<PathBuf> {
    debug!("Plotting the {}", what);
    let path = dir.join(format!("{}.{}", stem, renderer.extension()));
    let outcome = figure.and_then(|fig| {
        fig.validate()?;
        renderer.render(&fig, &path)
    });
    match outcome {
        Ok(()) => Some(path),
        Err(e) => {
            warn!("Error plotting the {}: {}", what, e);
            None
        }
    }
}
