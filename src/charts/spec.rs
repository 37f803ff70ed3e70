// Renderer-agnostic chart description handed to the presentation layer.
//
// A `ChartSpec` carries everything needed to draw one chart: data arrays,
// per-element encodings and finished annotation strings. Nothing in it
// refers back to the booking table.
use crate::config::ColorStop;
use crate::util::format_number;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Datum {
    Num(f64),
    Label(String),
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Num(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Label(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Label(v)
    }
}

#[cfg(test)]
impl Datum {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Datum::Num(v) => Some(*v),
            Datum::Label(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    StackedArea,
    Dumbbell,
    Bubble,
    Treemap,
    Sankey,
    Violin,
    GroupedBar,
    StackedBar,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Axis {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    /// Explicit category order, top to bottom / left to right.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl Axis {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }
}

/// Per-element visual encoding. Vectors are either empty, one entry for the
/// whole series, or one entry per data point.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Marker {
    pub colors: Vec<String>,
    pub sizes: Vec<f64>,
    pub opacities: Vec<f64>,
    pub outline_widths: Vec<f64>,
    pub outline_colors: Vec<String>,
    /// Numeric values mapped through the chart's color scale.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub color_values: Vec<f64>,
}

/// Descriptive statistics of an untrimmed distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub x: Vec<Datum>,
    pub y: Vec<Datum>,
    pub marker: Marker,
    pub text: Vec<String>,
    pub hover: Vec<String>,
    pub highlighted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DistributionSummary>,
}

impl Series {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.x.len().max(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SankeyNode {
    pub label: String,
    pub color: String,
    /// Bookings passing through the node.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SankeyLink {
    pub source: usize,
    pub target: usize,
    pub value: u64,
    pub color: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SankeyData {
    pub nodes: Vec<SankeyNode>,
    pub links: Vec<SankeyLink>,
}

/// Where an annotation sits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "anchor", rename_all = "snake_case")]
pub enum Placement {
    /// Relative to the plotting area, both coordinates in `[0, 1]`.
    Paper { x: f64, y: f64 },
    /// At a data coordinate.
    Data { x: Datum, y: Datum },
    /// A dashed reference line at `x` with the text as its label.
    VerticalLine { x: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub text: String,
    pub placement: Placement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Editorial takeaway rather than an inline data label.
    pub takeaway: bool,
}

impl Annotation {
    pub fn takeaway(text: String, x: f64, y: f64, color: Option<&str>) -> Self {
        Self {
            text,
            placement: Placement::Paper { x, y },
            color: color.map(str::to_string),
            takeaway: true,
        }
    }

    pub fn label(text: String, x: Datum, y: Datum) -> Self {
        Self {
            text,
            placement: Placement::Data { x, y },
            color: None,
            takeaway: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    /// Stable identifier the presentation layer binds to a placeholder.
    pub id: String,
    /// Narrative act the chart belongs to.
    pub act: u8,
    pub kind: ChartKind,
    pub title: String,
    pub subtitle: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub series: Vec<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<SankeyData>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub color_scale: Vec<ColorStop>,
    pub annotations: Vec<Annotation>,
}

impl ChartSpec {
    pub fn new(id: &str, act: u8, kind: ChartKind, title: String, subtitle: &str) -> Self {
        Self {
            id: id.to_string(),
            act,
            kind,
            title,
            subtitle: subtitle.to_string(),
            x_axis: Axis::default(),
            y_axis: Axis::default(),
            series: Vec::new(),
            flow: None,
            color_scale: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Editorial takeaways, in the order they were added.
    pub fn takeaways(&self) -> Vec<&str> {
        self.annotations
            .iter()
            .filter(|a| a.takeaway)
            .map(|a| a.text.as_str())
            .collect()
    }
}

#[cfg(test)]
impl ChartSpec {
    pub fn series_named(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }

    pub fn annotation_texts(&self) -> Vec<&str> {
        self.annotations.iter().map(|a| a.text.as_str()).collect()
    }
}

/// Percentage axis padded to the next multiple of `step` on both sides and
/// clamped to `[0, 100]`.
pub fn padded_pct_range(values: &[f64], step: f64) -> [f64; 2] {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return [0.0, 100.0];
    }
    let lo = ((lo / step).floor() * step - step).max(0.0);
    let hi = ((hi / step).ceil() * step + step).min(100.0);
    [lo, hi]
}

/// `"name: value"` lines joined for hover boxes.
pub fn hover_lines(title: &str, lines: &[(&str, String)]) -> String {
    let mut out = title.to_string();
    for (k, v) in lines {
        out.push('\n');
        out.push_str(k);
        out.push_str(": ");
        out.push_str(v);
    }
    out
}

pub fn days(v: f64) -> String {
    format!("{} days", format_number(v, 1))
}
