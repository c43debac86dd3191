use serde::{Deserialize, Serialize};

use crate::dataset::ClusterSpec;
use crate::style::DatasetStyle;

/// What a cluster icon needs to know about one child marker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterChild {
    pub tag: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterSize {
    Small,
    Medium,
    Large,
}

impl ClusterSize {
    pub fn for_count(count: usize, spec: &ClusterSpec) -> Self {
        if count > spec.large_above {
            ClusterSize::Large
        } else if count > spec.medium_above {
            ClusterSize::Medium
        } else {
            ClusterSize::Small
        }
    }

    /// Icon edge length in pixels.
    pub fn pixels(self) -> u32 {
        match self {
            ClusterSize::Small => 30,
            ClusterSize::Medium => 40,
            ClusterSize::Large => 50,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            ClusterSize::Small => "marker-cluster-small",
            ClusterSize::Medium => "marker-cluster-medium",
            ClusterSize::Large => "marker-cluster-large",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    /// Plurality tag; `None` when "no data" wins.
    pub dominant: Option<String>,
    pub color: &'static str,
    pub size: ClusterSize,
    pub count: usize,
    pub active: usize,
    pub inactive: usize,
    pub tooltip: String,
}

/// Tally child tags and derive the cluster's icon attributes. Plurality
/// wins; ties go to the tag encountered first.
pub fn summarize(children: &[ClusterChild], style: &DatasetStyle, spec: &ClusterSpec) -> ClusterSummary {
    // (tag, count) in first-seen order
    let mut tally: Vec<(Option<&str>, usize)> = Vec::new();
    let mut active = 0;
    for child in children {
        if child.active {
            active += 1;
        }
        let tag = child.tag.as_deref();
        match tally.iter_mut().find(|(seen, _)| *seen == tag) {
            Some((_, count)) => *count += 1,
            None => tally.push((tag, 1)),
        }
    }

    let mut dominant: Option<(Option<&str>, usize)> = None;
    for &(tag, count) in &tally {
        if dominant.is_none_or(|(_, best)| count > best) {
            dominant = Some((tag, count));
        }
    }
    let dominant = dominant.and_then(|(tag, _)| tag);

    let count = children.len();
    let inactive = count - active;
    let color = style.color_for_tag(dominant);
    let label = style.label_for_tag(dominant);

    let noun = if count == 1 { "marker" } else { "markers" };
    let mut tooltip = format!("{count} {noun} · mostly {label}");
    if style.tracks_activity {
        tooltip.push_str(&format!(" · {active} active, {inactive} inactive"));
    }

    ClusterSummary {
        dominant: dominant.map(str::to_string),
        color,
        size: ClusterSize::for_count(count, spec),
        count,
        active,
        inactive,
        tooltip,
    }
}
