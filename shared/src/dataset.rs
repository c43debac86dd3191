use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geo::{LatLng, LatLngBounds};
use crate::style::{
    Boundary, COVID_TIERS, ColorRule, DatasetStyle, NormalizeFrom, PARTY_COLORS, POLLUTANT_COLORS,
    RadiusRule, WEATHER_TIERS,
};

/// Mainland Spain plus the Balearics. Canary Islands fall outside.
pub const SPAIN_BOUNDS: LatLngBounds = LatLngBounds::new(35.0, -10.0, 44.0, 5.0);

pub const SPAIN_CENTER: LatLng = LatLng::new(40.4168, -3.7038);

const NO_DATA_COLOR: &str = "#CCCCCC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetKind {
    AirQuality,
    Elections,
    Covid,
    Weather,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::AirQuality,
        DatasetKind::Elections,
        DatasetKind::Covid,
        DatasetKind::Weather,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            DatasetKind::AirQuality => "air-quality",
            DatasetKind::Elections => "elections",
            DatasetKind::Covid => "covid",
            DatasetKind::Weather => "weather",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DatasetKind::AirQuality => "Air quality",
            DatasetKind::Elections => "Elections 2023",
            DatasetKind::Covid => "COVID-19",
            DatasetKind::Weather => "Weather",
        }
    }

    pub fn config(self) -> &'static DatasetConfig {
        match self {
            DatasetKind::AirQuality => &AIR_QUALITY,
            DatasetKind::Elections => &ELECTIONS,
            DatasetKind::Covid => &COVID,
            DatasetKind::Weather => &WEATHER,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dataset: {0}")]
pub struct UnknownDataset(pub String);

impl FromStr for DatasetKind {
    type Err = UnknownDataset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| UnknownDataset(s.to_string()))
    }
}

/// Cluster group tuning. Size buckets use strict `>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSpec {
    pub max_cluster_radius: u32,
    pub disable_at_zoom: u8,
    pub medium_above: usize,
    pub large_above: usize,
}

pub const DEFAULT_CLUSTER: ClusterSpec = ClusterSpec {
    max_cluster_radius: 60,
    disable_at_zoom: 12,
    medium_above: 50,
    large_above: 100,
};

/// Query parameter names of a paged list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingParams {
    pub limit: &'static str,
    pub offset: &'static str,
    pub light: &'static str,
    pub category: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub list: &'static str,
    /// Key of the array inside the list response object.
    pub list_key: &'static str,
    pub paging: Option<PagingParams>,
    /// Detail path with an `{id}` placeholder.
    pub detail: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportField {
    Id,
    Name,
    Subtitle,
    Status,
    Value,
    Category,
    CategoryLabel,
    Lat,
    Lon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportColumn {
    pub header: &'static str,
    pub field: ExportField,
}

const fn col(header: &'static str, field: ExportField) -> ExportColumn {
    ExportColumn { header, field }
}

/// Rendering and transport configuration of one dataset.
#[derive(Debug, Clone, Copy)]
pub struct DatasetConfig {
    pub kind: DatasetKind,
    /// Plural noun for status lines ("1,204 stations").
    pub noun: &'static str,
    pub render_cap: usize,
    pub batch_size: usize,
    pub page_size: usize,
    pub clustering: bool,
    pub cluster: ClusterSpec,
    pub default_center: LatLng,
    pub default_zoom: u8,
    pub fit_padding: f64,
    pub fit_max_zoom: u8,
    /// Records outside this box are excluded before rendering.
    pub region: Option<LatLngBounds>,
    pub style: DatasetStyle,
    pub endpoints: Endpoints,
    pub export_slug: &'static str,
    pub export_columns: &'static [ExportColumn],
    /// Placeholder written for missing export values.
    pub export_missing: &'static str,
}

pub static AIR_QUALITY: DatasetConfig = DatasetConfig {
    kind: DatasetKind::AirQuality,
    noun: "stations",
    render_cap: 500,
    batch_size: 100,
    page_size: 500,
    clustering: true,
    cluster: DEFAULT_CLUSTER,
    default_center: SPAIN_CENTER,
    default_zoom: 6,
    fit_padding: 0.1,
    fit_max_zoom: 8,
    region: Some(SPAIN_BOUNDS),
    style: DatasetStyle {
        color: ColorRule::Category {
            entries: POLLUTANT_COLORS,
            fallback: "#95a5a6",
            missing: NO_DATA_COLOR,
            case_insensitive: true,
        },
        radius: RadiusRule::Linear {
            base: 4.0,
            per_unit: 2.0,
            max: 10.0,
        },
        stroke_color: "#ffffff",
        weight: 1.0,
        opacity: 1.0,
        fill_opacity: 0.8,
        tracks_activity: true,
        value_label: "AQI",
        value_unit: None,
    },
    endpoints: Endpoints {
        list: "/api/air-quality/stations",
        list_key: "stations",
        paging: Some(PagingParams {
            limit: "limite",
            offset: "offset",
            light: "light",
            category: Some("contaminante"),
        }),
        detail: Some("/api/air-quality/station/{id}"),
    },
    export_slug: "calidad-aire",
    export_columns: &[
        col("Estación", ExportField::Name),
        col("Estado", ExportField::Status),
        col("AQI", ExportField::Value),
        col("Contaminante", ExportField::Category),
        col("Latitud", ExportField::Lat),
        col("Longitud", ExportField::Lon),
        col("Código Estación", ExportField::Subtitle),
    ],
    export_missing: "N/A",
};

pub static ELECTIONS: DatasetConfig = DatasetConfig {
    kind: DatasetKind::Elections,
    noun: "municipalities",
    render_cap: 5000,
    batch_size: 500,
    page_size: 5000,
    clustering: true,
    cluster: DEFAULT_CLUSTER,
    default_center: SPAIN_CENTER,
    default_zoom: 6,
    fit_padding: 0.1,
    fit_max_zoom: 10,
    region: Some(SPAIN_BOUNDS),
    style: DatasetStyle {
        color: ColorRule::Category {
            entries: PARTY_COLORS,
            fallback: "#666666",
            missing: NO_DATA_COLOR,
            case_insensitive: true,
        },
        radius: RadiusRule::Steps {
            steps: &[
                (1_000_000.0, 14.0),
                (500_000.0, 12.0),
                (100_000.0, 10.0),
                (50_000.0, 8.0),
                (10_000.0, 6.0),
            ],
            floor: 4.0,
            max: 6.0,
        },
        stroke_color: "#ffffff",
        weight: 1.0,
        opacity: 0.9,
        fill_opacity: 0.8,
        tracks_activity: false,
        value_label: "Population",
        value_unit: None,
    },
    endpoints: Endpoints {
        list: "/api/elections/data",
        list_key: "data",
        paging: Some(PagingParams {
            limit: "limit",
            offset: "offset",
            light: "light",
            category: Some("partido_ganador"),
        }),
        detail: Some("/api/elections/municipality/{id}"),
    },
    export_slug: "elecciones",
    export_columns: &[
        col("Código INE", ExportField::Id),
        col("Municipio", ExportField::Name),
        col("Provincia", ExportField::Subtitle),
        col("Partido ganador", ExportField::CategoryLabel),
        col("Población", ExportField::Value),
        col("Latitud", ExportField::Lat),
        col("Longitud", ExportField::Lon),
    ],
    export_missing: "N/A",
};

pub static COVID: DatasetConfig = DatasetConfig {
    kind: DatasetKind::Covid,
    noun: "case reports",
    render_cap: 2000,
    batch_size: 200,
    page_size: 2000,
    clustering: false,
    cluster: DEFAULT_CLUSTER,
    default_center: SPAIN_CENTER,
    default_zoom: 6,
    fit_padding: 0.1,
    fit_max_zoom: 10,
    region: None,
    style: DatasetStyle {
        color: ColorRule::Tiers {
            tiers: COVID_TIERS,
            boundary: Boundary::Exclusive,
            floor_color: "#10b981",
            floor_label: "Low",
            missing: NO_DATA_COLOR,
        },
        radius: RadiusRule::Normalized {
            base: 5.0,
            span: 20.0,
            max: 25.0,
            from: NormalizeFrom::Zero,
        },
        stroke_color: "#ffffff",
        weight: 2.0,
        opacity: 1.0,
        fill_opacity: 0.7,
        tracks_activity: false,
        value_label: "Cases",
        value_unit: None,
    },
    endpoints: Endpoints {
        list: "/api/covid/data",
        list_key: "data",
        paging: None,
        detail: Some("/api/covid/case/{id}"),
    },
    export_slug: "covid",
    export_columns: &[
        col("Comunidad", ExportField::Name),
        col("Detalle", ExportField::Subtitle),
        col("Casos", ExportField::Value),
        col("Nivel", ExportField::CategoryLabel),
        col("Latitud", ExportField::Lat),
        col("Longitud", ExportField::Lon),
    ],
    export_missing: "N/A",
};

pub static WEATHER: DatasetConfig = DatasetConfig {
    kind: DatasetKind::Weather,
    noun: "observations",
    render_cap: 1000,
    batch_size: 100,
    page_size: 1000,
    clustering: false,
    cluster: DEFAULT_CLUSTER,
    default_center: SPAIN_CENTER,
    default_zoom: 6,
    fit_padding: 0.1,
    fit_max_zoom: 10,
    region: None,
    style: DatasetStyle {
        color: ColorRule::Tiers {
            tiers: WEATHER_TIERS,
            boundary: Boundary::Inclusive,
            floor_color: "#3b82f6",
            floor_label: "Cold",
            missing: NO_DATA_COLOR,
        },
        radius: RadiusRule::Normalized {
            base: 8.0,
            span: 15.0,
            max: 20.0,
            from: NormalizeFrom::Min,
        },
        stroke_color: "#ffffff",
        weight: 2.0,
        opacity: 1.0,
        fill_opacity: 0.8,
        tracks_activity: false,
        value_label: "Temperature",
        value_unit: Some("°C"),
    },
    endpoints: Endpoints {
        list: "/api/weather/data",
        list_key: "data",
        paging: None,
        detail: None,
    },
    export_slug: "clima",
    export_columns: &[
        col("Ciudad", ExportField::Name),
        col("Descripción", ExportField::Subtitle),
        col("Temperatura", ExportField::Value),
        col("Rango", ExportField::CategoryLabel),
        col("Latitud", ExportField::Lat),
        col("Longitud", ExportField::Lon),
    ],
    export_missing: "N/A",
};
