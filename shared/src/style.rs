use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Opacity multiplier applied to entities reported inactive.
pub const INACTIVE_OPACITY_FACTOR: f64 = 0.5;

pub const NO_DATA_LABEL: &str = "No data";
pub const INACTIVE_LABEL: &str = "Inactive";
const INACTIVE_SWATCH_COLOR: &str = "#374151";

/// Keyed color entry: `(key, color, label)`.
pub type CategoryEntry = (&'static str, &'static str, &'static str);

pub const POLLUTANT_COLORS: &[CategoryEntry] = &[
    ("O3", "#3498db", "Ozone (O3)"),
    ("NO2", "#e74c3c", "Nitrogen dioxide (NO2)"),
    ("PM10", "#2ecc71", "PM10"),
    ("PM2.5", "#e67e22", "PM2.5"),
    ("SO2", "#9b59b6", "Sulphur dioxide (SO2)"),
];

pub const PARTY_COLORS: &[CategoryEntry] = &[
    ("PP", "#0056A8", "PP"),
    ("PSOE", "#E30613", "PSOE"),
    ("VOX", "#63BE21", "VOX"),
    ("SUMAR", "#EA5F94", "SUMAR"),
    ("ERC", "#FFB232", "ERC"),
    ("JXCAT_JUNTS", "#FFD100", "Junts"),
    ("EH_BILDU", "#6DBE45", "EH Bildu"),
    ("EAJ_PNV", "#008D3C", "PNV"),
    ("BNG", "#6A3B8C", "BNG"),
    ("CCA", "#FF7F00", "CCa"),
    ("UPN", "#800080", "UPN"),
    ("PACMA", "#00AA4F", "PACMA"),
    ("CUP_PR", "#FF0000", "CUP"),
    ("FO", "#000000", "FO"),
    ("OTROS", "#666666", "Others"),
];

pub const COVID_TIERS: &[Tier] = &[
    Tier::new(1800.0, "#dc2626", "Very high"),
    Tier::new(1600.0, "#ea580c", "High"),
    Tier::new(1400.0, "#f59e0b", "Moderate"),
];

pub const WEATHER_TIERS: &[Tier] = &[
    Tier::new(25.0, "#dc2626", "Hot"),
    Tier::new(15.0, "#f59e0b", "Warm"),
    Tier::new(5.0, "#28a745", "Mild"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerShape {
    Circle,
    /// Rotated square, used for inactive entities.
    Diamond,
}

/// Lower bound of a value tier. Tiers are checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    pub threshold: f64,
    pub color: &'static str,
    pub label: &'static str,
}

impl Tier {
    pub const fn new(threshold: f64, color: &'static str, label: &'static str) -> Self {
        Self {
            threshold,
            color,
            label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// `value >= threshold`
    Inclusive,
    /// `value > threshold`
    Exclusive,
}

impl Boundary {
    fn admits(self, value: f64, threshold: f64) -> bool {
        match self {
            Boundary::Inclusive => value >= threshold,
            Boundary::Exclusive => value > threshold,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ColorRule {
    /// Color keyed by the record's category string.
    Category {
        entries: &'static [CategoryEntry],
        fallback: &'static str,
        missing: &'static str,
        case_insensitive: bool,
    },
    /// Color by the record's value against descending thresholds.
    Tiers {
        tiers: &'static [Tier],
        boundary: Boundary,
        floor_color: &'static str,
        floor_label: &'static str,
        missing: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeFrom {
    Zero,
    Min,
}

#[derive(Debug, Clone, Copy)]
pub enum RadiusRule {
    Fixed(f64),
    /// `min(base + value * per_unit, max)`; missing value → `base`.
    Linear { base: f64, per_unit: f64, max: f64 },
    /// First `(threshold, radius)` with `value > threshold`, else `floor`,
    /// then clamped to `max`.
    Steps {
        steps: &'static [(f64, f64)],
        floor: f64,
        max: f64,
    },
    /// Scaled against the extent of the rendered batch.
    Normalized {
        base: f64,
        span: f64,
        max: f64,
        from: NormalizeFrom,
    },
}

impl RadiusRule {
    /// `extent` is the `(min, max)` of values across the rendered batch.
    pub fn radius(&self, value: Option<f64>, extent: Option<(f64, f64)>) -> f64 {
        match *self {
            RadiusRule::Fixed(r) => r,
            RadiusRule::Linear {
                base,
                per_unit,
                max,
            } => match value {
                Some(v) if v.is_finite() => (base + v * per_unit).min(max),
                _ => base,
            },
            RadiusRule::Steps { steps, floor, max } => {
                let Some(v) = value.filter(|v| v.is_finite()) else {
                    return floor.min(max);
                };
                steps
                    .iter()
                    .find(|(threshold, _)| v > *threshold)
                    .map(|(_, r)| *r)
                    .unwrap_or(floor)
                    .min(max)
            }
            RadiusRule::Normalized {
                base,
                span,
                max,
                from,
            } => {
                let (Some(v), Some((lo, hi))) = (value.filter(|v| v.is_finite()), extent) else {
                    return base;
                };
                let (origin, range) = match from {
                    NormalizeFrom::Zero => (0.0, hi),
                    NormalizeFrom::Min => (lo, hi - lo),
                };
                if range <= 0.0 || !range.is_finite() {
                    return base;
                }
                (base + (v - origin) / range * span).clamp(base, max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub color: &'static str,
    pub label: &'static str,
    pub shape: MarkerShape,
}

impl LegendEntry {
    fn circle(color: &'static str, label: &'static str) -> Self {
        Self {
            color,
            label,
            shape: MarkerShape::Circle,
        }
    }
}

/// Resolved visual attributes for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPaint {
    pub shape: MarkerShape,
    pub radius: f64,
    pub fill_color: &'static str,
    pub stroke_color: &'static str,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
    pub tag: Option<String>,
    pub active: bool,
}

/// Single style table per dataset, shared by markers, clusters and popups.
#[derive(Debug, Clone, Copy)]
pub struct DatasetStyle {
    pub color: ColorRule,
    pub radius: RadiusRule,
    pub stroke_color: &'static str,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
    /// Inactive entities render as diamonds and clusters split the counts.
    pub tracks_activity: bool,
    pub value_label: &'static str,
    pub value_unit: Option<&'static str>,
}

impl DatasetStyle {
    /// Classification tag of a record: the canonical category key, or the
    /// tier label for value-tiered datasets. `None` means no data.
    pub fn category_tag(&self, record: &Record) -> Option<String> {
        match self.color {
            ColorRule::Category {
                entries,
                case_insensitive,
                ..
            } => {
                let raw = record.category.as_deref()?.trim();
                if raw.is_empty() {
                    return None;
                }
                let known = entries.iter().find(|(key, _, _)| {
                    if case_insensitive {
                        key.eq_ignore_ascii_case(raw)
                    } else {
                        *key == raw
                    }
                });
                Some(known.map_or_else(|| raw.to_string(), |(key, _, _)| key.to_string()))
            }
            ColorRule::Tiers {
                tiers,
                boundary,
                floor_label,
                ..
            } => {
                let value = record.value.filter(|v| v.is_finite())?;
                let label = tiers
                    .iter()
                    .find(|tier| boundary.admits(value, tier.threshold))
                    .map_or(floor_label, |tier| tier.label);
                Some(label.to_string())
            }
        }
    }

    pub fn color_for_tag(&self, tag: Option<&str>) -> &'static str {
        match self.color {
            ColorRule::Category {
                entries,
                fallback,
                missing,
                ..
            } => match tag {
                None => missing,
                Some(tag) => entries
                    .iter()
                    .find(|(key, _, _)| *key == tag)
                    .map_or(fallback, |(_, color, _)| *color),
            },
            ColorRule::Tiers {
                tiers,
                floor_color,
                missing,
                ..
            } => match tag {
                None => missing,
                Some(tag) => tiers
                    .iter()
                    .find(|tier| tier.label == tag)
                    .map_or(floor_color, |tier| tier.color),
            },
        }
    }

    pub fn label_for_tag<'a>(&self, tag: Option<&'a str>) -> &'a str {
        let Some(tag) = tag else {
            return NO_DATA_LABEL;
        };
        match self.color {
            ColorRule::Category { entries, .. } => entries
                .iter()
                .find(|(key, _, _)| *key == tag)
                .map_or(tag, |(_, _, label)| *label),
            ColorRule::Tiers { .. } => tag,
        }
    }

    /// Colour key for the map, ending with the inactive-entity diamond
    /// when the dataset tracks activity.
    pub fn legend(&self) -> Vec<LegendEntry> {
        let mut legend: Vec<LegendEntry> = match self.color {
            ColorRule::Category {
                entries, missing, ..
            } => entries
                .iter()
                .map(|(_, color, label)| LegendEntry::circle(*color, *label))
                .chain(std::iter::once(LegendEntry::circle(missing, NO_DATA_LABEL)))
                .collect(),
            ColorRule::Tiers {
                tiers,
                floor_color,
                floor_label,
                ..
            } => tiers
                .iter()
                .map(|tier| LegendEntry::circle(tier.color, tier.label))
                .chain(std::iter::once(LegendEntry::circle(floor_color, floor_label)))
                .collect(),
        };
        if self.tracks_activity {
            legend.push(LegendEntry {
                color: INACTIVE_SWATCH_COLOR,
                label: INACTIVE_LABEL,
                shape: MarkerShape::Diamond,
            });
        }
        legend
    }

    /// `(tag, label)` pairs a category filter can select.
    pub fn filter_choices(&self) -> Vec<(&'static str, &'static str)> {
        match self.color {
            ColorRule::Category { entries, .. } => {
                entries.iter().map(|(key, _, label)| (*key, *label)).collect()
            }
            ColorRule::Tiers {
                tiers, floor_label, ..
            } => tiers
                .iter()
                .map(|tier| (tier.label, tier.label))
                .chain(std::iter::once((floor_label, floor_label)))
                .collect(),
        }
    }

    pub fn paint(&self, record: &Record, extent: Option<(f64, f64)>) -> MarkerPaint {
        let tag = self.category_tag(record);
        let fill_color = self.color_for_tag(tag.as_deref());
        let inactive = self.tracks_activity && !record.active;
        let factor = if inactive { INACTIVE_OPACITY_FACTOR } else { 1.0 };
        MarkerPaint {
            shape: if inactive {
                MarkerShape::Diamond
            } else {
                MarkerShape::Circle
            },
            radius: self.radius.radius(record.value, extent),
            fill_color,
            stroke_color: self.stroke_color,
            weight: self.weight,
            opacity: self.opacity * factor,
            fill_opacity: self.fill_opacity * factor,
            tag,
            active: !inactive,
        }
    }
}

/// `(min, max)` over the finite values of `records`.
pub fn value_extent<'a, I>(records: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter_map(|r| r.value.filter(|v| v.is_finite()))
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
