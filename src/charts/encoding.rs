//! Encoding policies shared by every chart: color lookup, focal-group
//! emphasis, bubble diameters, label density, stacking order and
//! outlier trimming for distributions.

use super::spec::{DistributionSummary, Marker};
use crate::config::{CategoryStyle, Palette, StoryConfig};
use crate::util::{average, percentile_nearest_rank, quantile, sorted};
use std::collections::{BTreeMap, BTreeSet};

pub const FOCAL_OPACITY: f64 = 0.9;
pub const PEER_OPACITY: f64 = 0.4;
pub const PEER_COLORED_OPACITY: f64 = 0.7;
pub const FOCAL_OUTLINE: f64 = 3.0;
pub const PEER_OUTLINE: f64 = 1.0;

/// Resolved look of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Emphasis {
    pub color: String,
    pub opacity: f64,
    pub outline_width: f64,
    pub outline_color: String,
}

impl Marker {
    pub fn push(&mut self, e: &Emphasis, size: Option<f64>) {
        self.colors.push(e.color.clone());
        self.opacities.push(e.opacity);
        self.outline_widths.push(e.outline_width);
        self.outline_colors.push(e.outline_color.clone());
        if let Some(s) = size {
            self.sizes.push(s);
        }
    }
}

/// Category value → encoding lookups built from the config.
#[derive(Debug, Clone)]
pub struct Encodings {
    styles: BTreeMap<String, CategoryStyle>,
    palette: Palette,
}

impl Encodings {
    pub fn new(config: &StoryConfig) -> Self {
        Self {
            styles: config.style_table(),
            palette: config.palette.clone(),
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Configured color, or the palette default for unknown values.
    pub fn color_of(&self, value: &str) -> &str {
        self.styles
            .get(value)
            .map(|s| s.color.as_str())
            .unwrap_or(&self.palette.default_color)
    }

    /// Focal group among `candidates`: a value pinned in the config wins,
    /// otherwise the caller's data-driven choice.
    pub fn focal(&self, candidates: &[String], data_driven: Option<String>) -> Option<String> {
        candidates
            .iter()
            .find(|c| self.styles.get(*c).is_some_and(|s| s.highlight))
            .cloned()
            .or(data_driven)
    }

    /// Focal elements keep their own color at high opacity with a heavy
    /// outline. Peers are either greyed out (`mute_peers`) or keep their
    /// color at reduced opacity.
    pub fn emphasis(&self, value: &str, is_focal: bool, mute_peers: bool) -> Emphasis {
        if is_focal {
            return Emphasis {
                color: self.color_of(value).to_string(),
                opacity: FOCAL_OPACITY,
                outline_width: FOCAL_OUTLINE,
                outline_color: self.palette.highlight_outline.clone(),
            };
        }
        if mute_peers {
            Emphasis {
                color: self.palette.muted_color.clone(),
                opacity: PEER_OPACITY,
                outline_width: PEER_OUTLINE,
                outline_color: self.palette.muted_outline.clone(),
            }
        } else {
            Emphasis {
                color: self.color_of(value).to_string(),
                opacity: PEER_COLORED_OPACITY,
                outline_width: PEER_OUTLINE,
                outline_color: self.palette.highlight_outline.clone(),
            }
        }
    }
}

/// Square-root diameter scaling between `min_d` and `max_d`.
///
/// A non-positive `max_value` maps everything to `min_d`.
pub fn diameter(value: f64, max_value: f64, min_d: f64, max_d: f64) -> f64 {
    if max_value <= 0.0 || !max_value.is_finite() {
        return min_d;
    }
    let share = (value / max_value).clamp(0.0, 1.0);
    min_d + share.sqrt() * (max_d - min_d)
}

/// Inline labels on dense charts: always for the focal entity, otherwise
/// only above the threshold.
pub fn shows_inline_label(magnitude: f64, threshold: f64, is_focal: bool) -> bool {
    is_focal || magnitude > threshold
}

/// Categories in `priority` order (those present only), followed by every
/// other present category in ascending label order.
pub fn stacking_order<'a>(
    present: impl IntoIterator<Item = &'a str>,
    priority: &[String],
) -> Vec<String> {
    let present: BTreeSet<&str> = present.into_iter().collect();
    let mut order: Vec<String> = priority
        .iter()
        .filter(|p| present.contains(p.as_str()))
        .cloned()
        .collect();
    for p in present {
        if !order.iter().any(|o| o == p) {
            order.push(p.to_string());
        }
    }
    order
}

pub fn summarize(values: &[f64]) -> DistributionSummary {
    let s = sorted(values.to_vec());
    DistributionSummary {
        n: s.len(),
        mean: average(&s),
        median: quantile(&s, 0.5),
        q1: quantile(&s, 0.25),
        q3: quantile(&s, 0.75),
        max: s.last().copied().unwrap_or(0.0),
    }
}

/// Display trimming for a set of distributions that share an axis.
///
/// The threshold is taken over the combined population, so every group is
/// cut at the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct Trim {
    pub threshold: f64,
    pub axis_max: f64,
}

impl Trim {
    pub fn over<'a>(groups: impl IntoIterator<Item = &'a [f64]>, percentile: f64, headroom: f64) -> Self {
        let all: Vec<f64> = groups.into_iter().flat_map(|g| g.iter().copied()).collect();
        let threshold = percentile_nearest_rank(&sorted(all), percentile);
        Self {
            threshold,
            axis_max: threshold * headroom,
        }
    }

    /// Values kept for plotting, original order preserved.
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        values.iter().copied().filter(|v| *v <= self.threshold).collect()
    }
}
