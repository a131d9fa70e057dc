//! SVG backend

use super::{colors, linear_ticks, Figure, LineStyle, Orientation, PlotRenderer, Tick, Trace};
use crate::error::Result;
use std::path::Path;

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 56.0;

/// Writes figures as standalone SVG documents
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    /// Ticks per axis when the figure gives none
    n_ticks: usize,
}

impl SvgRenderer {
    pub fn new() -> Self {
        Self { n_ticks: 6 }
    }

    pub fn with_ticks(mut self, n_ticks: usize) -> Self {
        self.n_ticks = n_ticks;
        self
    }

    /// Build the SVG document for a figure
    pub fn to_svg(&self, figure: &Figure) -> String {
        let canvas = Canvas::new(figure);
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
            w = figure.width,
            h = figure.height
        ));
        svg.push('\n');
        svg.push_str(&format!(
            r#"<rect width="{}" height="{}" fill="white"/>"#,
            figure.width, figure.height
        ));
        svg.push('\n');

        self.push_axes(&mut svg, figure, &canvas);
        for trace in &figure.traces {
            push_trace(&mut svg, trace, &canvas);
        }
        push_legend(&mut svg, figure, &canvas);

        svg.push_str("</svg>\n");
        svg
    }

    fn push_axes(&self, svg: &mut String, figure: &Figure, canvas: &Canvas) {
        svg.push_str(&format!(
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="black"/>"#,
            canvas.left,
            canvas.top,
            canvas.right - canvas.left,
            canvas.bottom - canvas.top
        ));
        svg.push('\n');

        let n_ticks = self.n_ticks.max(2);
        let x_ticks: Vec<Tick> = figure
            .x_ticks
            .clone()
            .unwrap_or_else(|| linear_ticks(canvas.x_range.0, canvas.x_range.1, n_ticks));
        for (value, label) in x_ticks {
            let x = canvas.x(value);
            svg.push_str(&format!(
                r#"<line x1="{x:.2}" y1="{b:.2}" x2="{x:.2}" y2="{b2:.2}" stroke="black"/><text x="{x:.2}" y="{t:.2}" text-anchor="middle">{}</text>"#,
                escape(&label),
                b = canvas.bottom,
                b2 = canvas.bottom + 5.0,
                t = canvas.bottom + 18.0
            ));
            svg.push('\n');
        }

        let y_ticks: Vec<Tick> = figure
            .y_ticks
            .clone()
            .unwrap_or_else(|| linear_ticks(canvas.y_range.0, canvas.y_range.1, n_ticks));
        for (value, label) in y_ticks {
            let y = canvas.y(value);
            svg.push_str(&format!(
                r#"<line x1="{l2:.2}" y1="{y:.2}" x2="{l:.2}" y2="{y:.2}" stroke="black"/><text x="{t:.2}" y="{ty:.2}" text-anchor="end">{}</text>"#,
                escape(&label),
                l = canvas.left,
                l2 = canvas.left - 5.0,
                t = canvas.left - 8.0,
                ty = y + 4.0
            ));
            svg.push('\n');
        }

        svg.push_str(&format!(
            r#"<text x="{:.2}" y="24" text-anchor="middle" font-size="15">{}</text>"#,
            f64::from(figure.width) / 2.0,
            escape(&figure.title)
        ));
        svg.push('\n');
        if !figure.x_label.is_empty() {
            svg.push_str(&format!(
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle">{}</text>"#,
                (canvas.left + canvas.right) / 2.0,
                f64::from(figure.height) - 12.0,
                escape(&figure.x_label)
            ));
            svg.push('\n');
        }
        if !figure.y_label.is_empty() {
            let cy = (canvas.top + canvas.bottom) / 2.0;
            svg.push_str(&format!(
                r#"<text x="16" y="{cy:.2}" text-anchor="middle" transform="rotate(-90 16 {cy:.2})">{}</text>"#,
                escape(&figure.y_label)
            ));
            svg.push('\n');
        }
    }
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotRenderer for SvgRenderer {
    fn render(&self, figure: &Figure, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_svg(figure))?;
        Ok(())
    }

    fn extension(&self) -> &str {
        "svg"
    }
}

/// Data-to-pixel mapping for one figure
struct Canvas {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

impl Canvas {
    fn new(figure: &Figure) -> Self {
        let (x_range, y_range) = figure.bounds();
        Self {
            left: MARGIN_LEFT,
            right: f64::from(figure.width) - MARGIN_RIGHT,
            top: MARGIN_TOP,
            bottom: f64::from(figure.height) - MARGIN_BOTTOM,
            x_range,
            y_range,
        }
    }

    fn x(&self, v: f64) -> f64 {
        let (lo, hi) = self.x_range;
        self.left + (v - lo) / (hi - lo) * (self.right - self.left)
    }

    fn y(&self, v: f64) -> f64 {
        let (lo, hi) = self.y_range;
        self.bottom - (v - lo) / (hi - lo) * (self.bottom - self.top)
    }
}

fn dash(style: LineStyle) -> &'static str {
    match style {
        LineStyle::Solid => "",
        LineStyle::Dashed => r#" stroke-dasharray="8 4""#,
        LineStyle::Dotted => r#" stroke-dasharray="2 3""#,
    }
}

fn push_trace(svg: &mut String, trace: &Trace, canvas: &Canvas) {
    match trace {
        Trace::Line { color, points, style, .. } => {
            let coords: Vec<String> = points
                .iter()
                .map(|&(x, y)| format!("{:.2},{:.2}", canvas.x(x), canvas.y(y)))
                .collect();
            svg.push_str(&format!(
                r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="1.5"{}/>"#,
                coords.join(" "),
                color,
                dash(*style)
            ));
        }
        Trace::Scatter { color, points, intensity, .. } => {
            for (i, &(x, y)) in points.iter().enumerate() {
                let fill = match intensity {
                    Some(values) => colors::gradient(values.get(i).copied().unwrap_or(0.5)),
                    None => color.clone(),
                };
                svg.push_str(&format!(
                    r#"<circle cx="{:.2}" cy="{:.2}" r="2.5" fill="{}" fill-opacity="0.8"/>"#,
                    canvas.x(x),
                    canvas.y(y),
                    fill
                ));
            }
        }
        Trace::Bars { color, bars, orientation, annotate, .. } => {
            for bar in bars {
                let (lo, hi) = (bar.position - bar.width / 2.0, bar.position + bar.width / 2.0);
                let (x0, x1, y0, y1) = match orientation {
                    Orientation::Vertical => (canvas.x(lo), canvas.x(hi), canvas.y(bar.value), canvas.y(0.0)),
                    Orientation::Horizontal => (canvas.x(0.0), canvas.x(bar.value), canvas.y(hi), canvas.y(lo)),
                };
                let (x, w) = (x0.min(x1), (x1 - x0).abs());
                let (y, h) = (y0.min(y1), (y1 - y0).abs());
                svg.push_str(&format!(
                    r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{}"/>"#,
                    color
                ));
                if *annotate {
                    let label = format!("{}", (bar.value * 100.0).round() / 100.0);
                    let (tx, ty, anchor) = match orientation {
                        Orientation::Vertical => ((x0 + x1) / 2.0, y - 4.0, "middle"),
                        Orientation::Horizontal => (x + w + 4.0, (y0 + y1) / 2.0 + 4.0, "start"),
                    };
                    svg.push_str(&format!(
                        r#"<text x="{tx:.2}" y="{ty:.2}" text-anchor="{anchor}" font-size="10">{}</text>"#,
                        label
                    ));
                }
            }
        }
        Trace::HLine { y, color, style } => {
            let py = canvas.y(*y);
            svg.push_str(&format!(
                r#"<line x1="{:.2}" y1="{py:.2}" x2="{:.2}" y2="{py:.2}" stroke="{}"{}/>"#,
                canvas.left,
                canvas.right,
                color,
                dash(*style)
            ));
        }
    }
    svg.push('\n');
}

fn push_legend(svg: &mut String, figure: &Figure, canvas: &Canvas) {
    let entries: Vec<(&str, &str)> = figure.traces.iter().filter_map(Trace::label).collect();
    for (i, (label, color)) in entries.iter().enumerate() {
        let y = canvas.top + 16.0 + 16.0 * i as f64;
        let x = canvas.right - 170.0;
        svg.push_str(&format!(
            r#"<rect x="{x:.2}" y="{:.2}" width="12" height="8" fill="{}"/><text x="{:.2}" y="{y:.2}">{}</text>"#,
            y - 8.0,
            color,
            x + 18.0,
            escape(label)
        ));
        svg.push('\n');
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
