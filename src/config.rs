// Explicit configuration for the whole pipeline.
//
// Everything that used to be a module-level constant (palette, thresholds,
// labels, stacking priority) lives here and is passed down by reference.
// Every field has a default, so an empty TOML file is a valid config.
use crate::error::{PipelineError, Result};
use crate::flow::LabelPolicy;
use crate::types::{Dimension, KeyLabels};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryConfig {
    pub origin: OriginConfig,
    pub status: StatusConfig,
    pub filters: FilterConfig,
    pub bubbles: BubbleConfig,
    pub treemap: TreemapConfig,
    pub distribution: DistributionConfig,
    pub gap: GapConfig,
    pub changes: ChangesConfig,
    pub flow: FlowConfig,
    /// Most committed first. Unlisted deposit types are appended in label order.
    pub deposit_priority: Vec<String>,
    pub palette: Palette,
    pub categories: Vec<CategoryStyle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Country code classified as locally sourced.
    pub local_country: String,
    pub local_label: String,
    pub international_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub canceled_label: String,
    pub not_canceled_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Countries below this many bookings are dropped from every country table.
    pub min_country_bookings: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleConfig {
    pub min_diameter: f64,
    pub max_diameter: f64,
    /// Non-focal bubbles only carry an inline label above this many bookings.
    pub label_min_bookings: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreemapConfig {
    /// Tiles above this share of all bookings get the long label.
    pub label_min_share_pct: f64,
    pub color_scale: Vec<ColorStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub at: f64,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub trim_percentile: f64,
    pub axis_headroom: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// Per-year difference labels are shown only above this many percentage points.
    pub label_min_pp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangesConfig {
    /// Booking-change counts at or above this value share the last bucket.
    pub bucket_cap: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Column names, first level on the left.
    pub levels: Vec<String>,
    /// Prefix values that appear at two levels instead of failing.
    pub qualify_labels: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub default_color: String,
    pub muted_color: String,
    pub muted_outline: String,
    pub highlight_outline: String,
    pub reference_line: String,
    pub connector: String,
}

/// Declarative encoding for one category value.
///
/// `highlight` pins the value as the focal group of any chart it appears in,
/// overriding the data-driven choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStyle {
    pub value: String,
    pub color: String,
    #[serde(default)]
    pub highlight: bool,
}

impl Default for StoryConfig {
    fn default() -> Self {
        let origin = OriginConfig::default();
        let status = StatusConfig::default();
        let style = |value: &str, color: &str| CategoryStyle {
            value: value.to_string(),
            color: color.to_string(),
            highlight: false,
        };
        Self {
            categories: vec![
                style(&origin.local_label, "#C0392B"),
                style(&origin.international_label, "#2980B9"),
                style("City Hotel", "#7D3C98"),
                style("Resort Hotel", "#229954"),
                style(&status.canceled_label, "#C0392B"),
                style(&status.not_canceled_label, "#2980B9"),
                style("No Deposit", "#E74C3C"),
                style("Non Refund", "#E67E22"),
                style("Refundable", "#3498DB"),
            ],
            origin,
            status,
            filters: FilterConfig::default(),
            bubbles: BubbleConfig::default(),
            treemap: TreemapConfig::default(),
            distribution: DistributionConfig::default(),
            gap: GapConfig::default(),
            changes: ChangesConfig::default(),
            flow: FlowConfig::default(),
            deposit_priority: vec![
                "Non Refund".to_string(),
                "Refundable".to_string(),
                "No Deposit".to_string(),
            ],
            palette: Palette::default(),
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        let local_country = "PRT".to_string();
        Self {
            local_label: OriginConfig::label_for(&local_country),
            local_country,
            international_label: "International".to_string(),
        }
    }
}

impl OriginConfig {
    /// Default display label for a local country code.
    pub fn label_for(country: &str) -> String {
        format!("Local ({})", country)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            canceled_label: "Canceled".to_string(),
            not_canceled_label: "Not canceled".to_string(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_country_bookings: 1000,
        }
    }
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self {
            min_diameter: 15.0,
            max_diameter: 50.0,
            label_min_bookings: 10_000,
        }
    }
}

impl Default for TreemapConfig {
    fn default() -> Self {
        let stop = |at: f64, color: &str| ColorStop {
            at,
            color: color.to_string(),
        };
        Self {
            label_min_share_pct: 3.0,
            color_scale: vec![
                stop(0.0, "#2ECC71"),
                stop(0.2, "#27AE60"),
                stop(0.4, "#F1C40F"),
                stop(0.6, "#E67E22"),
                stop(0.8, "#E74C3C"),
                stop(1.0, "#C0392B"),
            ],
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            trim_percentile: 0.95,
            axis_headroom: 1.10,
        }
    }
}

impl Default for GapConfig {
    fn default() -> Self {
        Self { label_min_pp: 5.0 }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                "origin_group".to_string(),
                "hotel".to_string(),
                "is_canceled".to_string(),
            ],
            qualify_labels: false,
        }
    }
}

impl Default for ChangesConfig {
    fn default() -> Self {
        Self { bucket_cap: 5 }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            default_color: "#95A5A6".to_string(),
            muted_color: "#BDC3C7".to_string(),
            muted_outline: "#95A5A6".to_string(),
            highlight_outline: "white".to_string(),
            reference_line: "#7F8C8D".to_string(),
            connector: "#95A5A6".to_string(),
        }
    }
}

impl StoryConfig {
    /// Read a TOML config file. Missing keys fall back to their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let doc: toml::Table =
            toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        let mut cfg: StoryConfig =
            toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        let label_given = doc
            .get("origin")
            .and_then(|o| o.get("local_label"))
            .is_some();
        if !label_given {
            cfg.derive_local_label(!doc.contains_key("categories"));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Follow a changed `local_country` with its label. Default category
    /// styles keyed on the old label move along when `restyle` is set.
    fn derive_local_label(&mut self, restyle: bool) {
        let derived = OriginConfig::label_for(&self.origin.local_country);
        if derived == self.origin.local_label {
            return;
        }
        let previous = std::mem::replace(&mut self.origin.local_label, derived.clone());
        if restyle {
            for style in self.categories.iter_mut().filter(|c| c.value == previous) {
                style.value = derived.clone();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.bubbles;
        if !(b.min_diameter > 0.0 && b.min_diameter < b.max_diameter) {
            return Err(PipelineError::Config(format!(
                "bubble diameters must satisfy 0 < min ({}) < max ({})",
                b.min_diameter, b.max_diameter
            )));
        }
        let d = &self.distribution;
        if !(d.trim_percentile > 0.0 && d.trim_percentile <= 1.0) {
            return Err(PipelineError::Config(format!(
                "trim_percentile must be in (0, 1], got {}",
                d.trim_percentile
            )));
        }
        if d.axis_headroom < 1.0 {
            return Err(PipelineError::Config(format!(
                "axis_headroom must be at least 1.0, got {}",
                d.axis_headroom
            )));
        }
        if self.changes.bucket_cap == 0 {
            return Err(PipelineError::Config("bucket_cap must be at least 1".into()));
        }
        let levels = self.flow_levels()?;
        if levels.len() < 2 {
            return Err(PipelineError::Config(
                "flow needs at least two levels".into(),
            ));
        }
        if self.origin.local_label == self.origin.international_label {
            return Err(PipelineError::Config(
                "local and international labels must differ".into(),
            ));
        }
        if self.status.canceled_label == self.status.not_canceled_label {
            return Err(PipelineError::Config(
                "canceled and not-canceled labels must differ".into(),
            ));
        }
        Ok(())
    }

    /// Category value → style lookup table.
    pub fn style_table(&self) -> BTreeMap<String, CategoryStyle> {
        self.categories
            .iter()
            .map(|s| (s.value.clone(), s.clone()))
            .collect()
    }

    pub fn origin_label(&self, country: &str) -> &str {
        if country == self.origin.local_country {
            &self.origin.local_label
        } else {
            &self.origin.international_label
        }
    }

    pub fn flow_levels(&self) -> Result<Vec<Dimension>> {
        self.flow
            .levels
            .iter()
            .map(|name| {
                Dimension::from_column_name(name).ok_or_else(|| {
                    PipelineError::Config(format!("unknown flow level '{}'", name))
                })
            })
            .collect()
    }

    pub fn flow_label_policy(&self) -> LabelPolicy {
        if self.flow.qualify_labels {
            LabelPolicy::QualifyWithLevel
        } else {
            LabelPolicy::Reject
        }
    }

    pub fn key_labels(&self) -> KeyLabels {
        KeyLabels {
            canceled: self.status.canceled_label.clone(),
            not_canceled: self.status.not_canceled_label.clone(),
            changes_cap: self.changes.bucket_cap,
        }
    }

    /// Origin labels in narrative order: local first.
    pub fn origin_order(&self) -> [&str; 2] {
        [&self.origin.local_label, &self.origin.international_label]
    }
}
