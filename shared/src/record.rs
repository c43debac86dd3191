use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// Stable identifier of a dataset entity: numeric ids for stations and
/// case rows, string codes (INE municipality codes) for elections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Numeric(i64),
    Code(String),
}

impl EntityId {
    /// Path segment for detail lookups. Codes are percent-encoded.
    pub fn path_segment(&self) -> String {
        match self {
            EntityId::Numeric(id) => id.to_string(),
            EntityId::Code(code) => percent_encode(code),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Numeric(id) => write!(f, "{id}"),
            EntityId::Code(code) => f.write_str(code),
        }
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Dataset-agnostic light record used for map rendering.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// Raw category key (pollutant, party). Tiered datasets leave it empty
    /// and derive their tag from `value`.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Record {
    /// Coordinates when both are present, finite and in range.
    pub fn position(&self) -> Option<LatLng> {
        let point = LatLng::new(self.lat?, self.lon?);
        point.is_valid().then_some(point)
    }
}

/// `/api/air-quality/stations?light=true` element.
#[derive(Debug, Clone, Deserialize)]
pub struct StationLight {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub station_code: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub last_aqi: Option<f64>,
    #[serde(default)]
    pub pollutant: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl From<StationLight> for Record {
    fn from(s: StationLight) -> Self {
        Record {
            id: Some(EntityId::Numeric(s.id)),
            name: s.name.unwrap_or_else(|| "Station".to_string()),
            subtitle: s.station_code,
            lat: s.lat,
            lon: s.lon,
            category: s.pollutant.filter(|p| !p.is_empty()),
            value: s.last_aqi.filter(|aqi| *aqi >= 1.0),
            active: s.is_active.unwrap_or(true),
        }
    }
}

/// `/api/elections/data?light=true` element.
#[derive(Debug, Clone, Deserialize)]
pub struct MunicipalityLight {
    pub codigo_ine: String,
    pub nombre_municipio: String,
    #[serde(default)]
    pub nombre_provincia: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub partido_ganador: Option<String>,
    #[serde(default)]
    pub poblacion: Option<f64>,
}

impl From<MunicipalityLight> for Record {
    fn from(m: MunicipalityLight) -> Self {
        Record {
            id: Some(EntityId::Code(m.codigo_ine)),
            name: m.nombre_municipio,
            subtitle: m.nombre_provincia,
            lat: m.lat,
            lon: m.lon,
            category: m
                .partido_ganador
                .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("sin_datos")),
            value: m.poblacion,
            active: true,
        }
    }
}

/// `/api/covid/data` element.
#[derive(Debug, Clone, Deserialize)]
pub struct CovidCaseLight {
    #[serde(default)]
    pub id: Option<i64>,
    pub comunidad: String,
    #[serde(default)]
    pub provincia: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub casos: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl From<CovidCaseLight> for Record {
    fn from(c: CovidCaseLight) -> Self {
        let subtitle = match (c.provincia, c.fecha) {
            (Some(provincia), Some(fecha)) => Some(format!("{provincia} · {fecha}")),
            (Some(provincia), None) => Some(provincia),
            (None, fecha) => fecha,
        };
        Record {
            id: c.id.map(EntityId::Numeric),
            name: c.comunidad,
            subtitle,
            lat: c.lat,
            lon: c.lon,
            category: None,
            value: c.casos,
            active: true,
        }
    }
}

/// `/api/weather/data` element.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherObservation {
    pub city: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub weather_description: Option<String>,
}

impl From<WeatherObservation> for Record {
    fn from(w: WeatherObservation) -> Self {
        let subtitle = match (w.weather_description, w.country) {
            (Some(desc), Some(country)) => Some(format!("{desc} · {country}")),
            (desc, country) => desc.or(country),
        };
        Record {
            id: None,
            name: w.city,
            subtitle,
            lat: w.lat,
            lon: w.lon,
            category: None,
            value: w.temperature,
            active: true,
        }
    }
}
