use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::EntityId;

/// Election result columns present on the municipality detail row, in the
/// order the backend returns them.
pub const PARTY_COLUMNS: &[&str] = &[
    "pp",
    "psoe",
    "vox",
    "sumar",
    "erc",
    "jxcat_junts",
    "eh_bildu",
    "eaj_pnv",
    "bng",
    "cca",
    "upn",
    "pacma",
    "cup_pr",
    "fo",
];

/// One labelled value shown in a detail popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub label: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Metric {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Expanded entity fetched on popup open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: EntityId,
    pub name: String,
    pub subtitle: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub category: Option<String>,
    pub headline: Option<Metric>,
    pub breakdown: Vec<Metric>,
    pub tags: Vec<String>,
    pub recommendation: Option<String>,
    pub source: Option<String>,
    pub is_mock: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Accepts RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (read as UTC) and
/// bare dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// `/api/air-quality/station/{id}` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StationDetail {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub station_code: Option<String>,
    #[serde(default)]
    pub station_class: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub available_pollutants: Vec<String>,
    #[serde(default)]
    pub last_measurement: Option<f64>,
    #[serde(default)]
    pub last_aqi: Option<f64>,
    #[serde(default)]
    pub pollutant: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub quality_text: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub is_mock: Option<bool>,
    #[serde(default)]
    pub data_source: Option<String>,
}

impl StationDetail {
    pub fn into_detail(self, envelope_mock: bool) -> DetailRecord {
        let headline = self
            .last_aqi
            .filter(|aqi| *aqi >= 1.0)
            .map(|aqi| Metric::new("AQI", aqi));
        let mut breakdown = Vec::new();
        if let Some(measurement) = self.last_measurement {
            let label = self.pollutant.clone().unwrap_or_else(|| "PM2.5".into());
            breakdown.push(
                Metric::new(label, measurement)
                    .with_unit(self.unit.clone().unwrap_or_else(|| "µg/m³".into())),
            );
        }
        let subtitle = match (non_empty(self.station_code), non_empty(self.station_class)) {
            (Some(code), Some(class)) => Some(format!("{code} · class {class}")),
            (code, class) => code.or(class.map(|c| format!("class {c}"))),
        };
        DetailRecord {
            id: EntityId::Numeric(self.id),
            name: self.name.unwrap_or_else(|| "Station".into()),
            subtitle,
            lat: self.lat,
            lon: self.lon,
            category: non_empty(self.pollutant),
            headline,
            breakdown,
            tags: self.available_pollutants,
            recommendation: non_empty(self.recommendation).or(non_empty(self.quality_text)),
            source: non_empty(self.data_source),
            is_mock: self.is_mock.unwrap_or(false) || envelope_mock,
            updated_at: self.last_updated.as_deref().and_then(parse_timestamp),
        }
    }
}

/// `/api/elections/municipality/{codigo_ine}` payload. Party vote columns
/// are read dynamically from [`PARTY_COLUMNS`].
#[derive(Debug, Clone, Deserialize)]
pub struct MunicipalityDetail {
    pub codigo_ine: String,
    pub nombre_municipio: String,
    #[serde(default)]
    pub nombre_provincia: Option<String>,
    #[serde(default)]
    pub nombre_comunidad: Option<String>,
    #[serde(default)]
    pub poblacion: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub censo: Option<f64>,
    #[serde(default)]
    pub votantes: Option<f64>,
    #[serde(default)]
    pub participacion: Option<f64>,
    #[serde(default)]
    pub partido_ganador: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MunicipalityDetail {
    /// Party vote counts above zero, highest first. Equal counts keep
    /// column order.
    pub fn party_votes(&self) -> Vec<Metric> {
        let mut votes: Vec<Metric> = PARTY_COLUMNS
            .iter()
            .filter_map(|column| {
                let count = self.extra.get(*column)?.as_f64()?;
                (count > 0.0).then(|| Metric::new(column.to_uppercase(), count))
            })
            .collect();
        votes.sort_by(|a, b| b.value.total_cmp(&a.value));
        votes
    }

    pub fn into_detail(self, envelope_mock: bool) -> DetailRecord {
        let mut breakdown = self.party_votes();
        if let Some(censo) = self.censo {
            breakdown.push(Metric::new("Census", censo));
        }
        if let Some(poblacion) = self.poblacion {
            breakdown.push(Metric::new("Population", poblacion));
        }
        let subtitle = match (non_empty(self.nombre_provincia), non_empty(self.nombre_comunidad)) {
            (Some(p), Some(c)) => Some(format!("{p} · {c}")),
            (p, c) => p.or(c),
        };
        DetailRecord {
            id: EntityId::Code(self.codigo_ine),
            name: self.nombre_municipio,
            subtitle,
            lat: self.lat,
            lon: self.lon,
            category: non_empty(self.partido_ganador),
            headline: self
                .participacion
                .map(|p| Metric::new("Turnout", p).with_unit("%")),
            breakdown,
            tags: Vec::new(),
            recommendation: None,
            source: None,
            is_mock: envelope_mock,
            updated_at: self.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

/// `/api/covid/case/{id}` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CovidCaseDetail {
    pub id: i64,
    pub comunidad: String,
    #[serde(default)]
    pub provincia: Option<String>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub casos: Option<f64>,
    #[serde(default)]
    pub ingresos_uci: Option<f64>,
    #[serde(default)]
    pub fallecidos: Option<f64>,
    #[serde(default)]
    pub altas: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl CovidCaseDetail {
    pub fn into_detail(self, envelope_mock: bool) -> DetailRecord {
        let breakdown = [
            ("ICU admissions", self.ingresos_uci),
            ("Deaths", self.fallecidos),
            ("Discharges", self.altas),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| Metric::new(label, v)))
        .collect();
        DetailRecord {
            id: EntityId::Numeric(self.id),
            name: self.comunidad,
            subtitle: non_empty(self.provincia),
            lat: self.lat,
            lon: self.lon,
            category: None,
            headline: self.casos.map(|c| Metric::new("Cases", c)),
            breakdown,
            tags: Vec::new(),
            recommendation: None,
            source: None,
            is_mock: envelope_mock,
            updated_at: self.fecha.as_deref().and_then(parse_timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn timestamps_accept_common_backend_formats() {
        let rfc = parse_timestamp("2024-03-01T10:15:00+01:00").expect("rfc3339");
        assert_eq!(rfc.hour(), 9);

        let naive = parse_timestamp("2024-03-01 10:15:00").expect("naive");
        assert_eq!(naive.minute(), 15);

        let iso = parse_timestamp("2023-07-24T08:00:00.123456").expect("iso naive");
        assert_eq!(iso.day(), 24);

        let date = parse_timestamp("2020-04-01").expect("date");
        assert_eq!(date.month(), 4);

        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn station_detail_builds_headline_and_breakdown() {
        let station: StationDetail = serde_json::from_value(json!({
            "id": 12,
            "name": "Plaza España",
            "station_code": "28079004",
            "station_class": "urban",
            "lat": 40.4238,
            "lon": -3.7122,
            "available_pollutants": ["NO2"],
            "last_measurement": 41.5,
            "last_aqi": 3,
            "pollutant": "NO2",
            "unit": "ICA",
            "recommendation": "Reduce outdoor activity",
            "last_updated": "2024-03-01 10:00:00",
            "is_mock": false,
            "data_source": "MITECO ICA"
        }))
        .expect("station");
        let detail = station.into_detail(false);
        assert_eq!(detail.headline, Some(Metric::new("AQI", 3.0)));
        assert_eq!(
            detail.breakdown,
            vec![Metric::new("NO2", 41.5).with_unit("ICA")]
        );
        assert_eq!(detail.subtitle.as_deref(), Some("28079004 · class urban"));
        assert_eq!(detail.tags, vec!["NO2".to_string()]);
        assert_eq!(detail.source.as_deref(), Some("MITECO ICA"));
        assert!(!detail.is_mock);
        assert!(detail.updated_at.is_some());
    }

    #[test]
    fn station_detail_inherits_envelope_mock_flag() {
        let station: StationDetail =
            serde_json::from_value(json!({ "id": 3, "last_aqi": 0 })).expect("station");
        let detail = station.into_detail(true);
        assert!(detail.is_mock);
        assert_eq!(detail.headline, None);
        assert!(detail.breakdown.is_empty());
    }

    #[test]
    fn party_votes_sorted_descending_and_skip_zero() {
        let municipality: MunicipalityDetail = serde_json::from_value(json!({
            "codigo_ine": "28079",
            "nombre_municipio": "Madrid",
            "nombre_provincia": "Madrid",
            "nombre_comunidad": "Comunidad de Madrid",
            "participacion": 71.2,
            "partido_ganador": "PP",
            "pp": 700000,
            "psoe": 450000,
            "vox": 200000,
            "sumar": 200000,
            "erc": 0,
            "fo": null
        }))
        .expect("municipality");
        let labels: Vec<String> = municipality
            .party_votes()
            .into_iter()
            .map(|m| m.label)
            .collect();
        assert_eq!(labels, vec!["PP", "PSOE", "VOX", "SUMAR"]);

        let detail = municipality.into_detail(false);
        assert_eq!(detail.id, EntityId::Code("28079".into()));
        assert_eq!(
            detail.headline,
            Some(Metric::new("Turnout", 71.2).with_unit("%"))
        );
        assert_eq!(
            detail.subtitle.as_deref(),
            Some("Madrid · Comunidad de Madrid")
        );
    }

    #[test]
    fn covid_detail_lists_present_counters_only() {
        let case: CovidCaseDetail = serde_json::from_value(json!({
            "id": 5,
            "comunidad": "Andalucía",
            "provincia": "Sevilla",
            "fecha": "2020-04-01",
            "casos": 1700,
            "ingresos_uci": 40,
            "altas": 300
        }))
        .expect("case");
        let detail = case.into_detail(false);
        assert_eq!(detail.headline, Some(Metric::new("Cases", 1700.0)));
        let labels: Vec<&str> = detail.breakdown.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["ICU admissions", "Discharges"]);
    }
}
