use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dataset::DatasetKind;
use crate::detail::{CovidCaseDetail, DetailRecord, MunicipalityDetail, StationDetail};
use crate::record::{CovidCaseLight, MunicipalityLight, Record, StationLight, WeatherObservation};

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("expected a list under `{0}`")]
    MissingList(&'static str),
    #[error("backend reported failure")]
    Rejected,
    #[error("response has no detail data")]
    MissingData,
    #[error("{0} has no detail endpoint")]
    NoDetail(DatasetKind),
    #[error("invalid detail payload: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Light records decoded from a list response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub records: Vec<Record>,
    /// Elements that failed to decode and were skipped.
    pub skipped: usize,
    /// Server-side total when the endpoint reports one.
    pub total: Option<usize>,
    pub is_mock: bool,
}

fn decode_elements<T>(items: &[Value], kind: DatasetKind) -> (Vec<Record>, usize)
where
    T: DeserializeOwned + Into<Record>,
{
    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (index, item) in items.iter().enumerate() {
        match T::deserialize(item) {
            Ok(parsed) => records.push(parsed.into()),
            Err(e) => {
                skipped += 1;
                log::warn!("{kind}: skipping element {index}: {e}");
            }
        }
    }
    (records, skipped)
}

/// Decode a list response. Accepts either the documented object shape
/// (array under the dataset's list key) or a bare array. Malformed elements
/// are skipped rather than failing the whole collection.
pub fn parse_collection(kind: DatasetKind, body: &Value) -> Result<Collection, PayloadError> {
    let list_key = kind.config().endpoints.list_key;
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.get(list_key) {
            Some(Value::Array(items)) => items,
            _ => return Err(PayloadError::MissingList(list_key)),
        },
        _ => return Err(PayloadError::MissingList(list_key)),
    };

    let (records, skipped) = match kind {
        DatasetKind::AirQuality => decode_elements::<StationLight>(items, kind),
        DatasetKind::Elections => decode_elements::<MunicipalityLight>(items, kind),
        DatasetKind::Covid => decode_elements::<CovidCaseLight>(items, kind),
        DatasetKind::Weather => decode_elements::<WeatherObservation>(items, kind),
    };

    let total = body
        .get("total")
        .and_then(Value::as_u64)
        .and_then(|t| usize::try_from(t).ok());
    let is_mock = body
        .get("is_mock_data")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(Collection {
        records,
        skipped,
        total,
        is_mock,
    })
}

/// Decode a detail response, unwrapping the `{success, data, is_mock_data}`
/// envelope when present.
pub fn parse_detail(kind: DatasetKind, body: &Value) -> Result<DetailRecord, PayloadError> {
    let (data, envelope_mock) = match body.get("data") {
        Some(data) => {
            if body.get("success").and_then(Value::as_bool) == Some(false) {
                return Err(PayloadError::Rejected);
            }
            let mock = body
                .get("is_mock_data")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (data, mock)
        }
        None if body.get("success").and_then(Value::as_bool) == Some(false) => {
            return Err(PayloadError::Rejected);
        }
        None if body.is_object() => (body, false),
        None => return Err(PayloadError::MissingData),
    };
    if data.is_null() {
        return Err(PayloadError::MissingData);
    }

    let detail = match kind {
        DatasetKind::AirQuality => StationDetail::deserialize(data)?.into_detail(envelope_mock),
        DatasetKind::Elections => {
            MunicipalityDetail::deserialize(data)?.into_detail(envelope_mock)
        }
        DatasetKind::Covid => CovidCaseDetail::deserialize(data)?.into_detail(envelope_mock),
        DatasetKind::Weather => return Err(PayloadError::NoDetail(kind)),
    };
    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntityId;
    use serde_json::json;

    #[test]
    fn collection_reads_list_key_and_skips_bad_elements() {
        let body = json!({
            "stations": [
                { "id": 1, "name": "A", "lat": 40.0, "lon": -3.0, "last_aqi": 2, "pollutant": "O3" },
                { "name": "missing id" },
                { "id": 3, "name": "C", "lat": null, "lon": null }
            ],
            "total": 3,
            "is_mock_data": true
        });
        let collection = parse_collection(DatasetKind::AirQuality, &body).expect("collection");
        assert_eq!(collection.records.len(), 2);
        assert_eq!(collection.skipped, 1);
        assert_eq!(collection.total, Some(3));
        assert!(collection.is_mock);
        assert_eq!(collection.records[1].lat, None);
    }

    #[test]
    fn collection_accepts_bare_arrays() {
        let body = json!([{ "city": "Bilbao", "lat": 43.26, "lon": -2.93, "temperature": 14.5 }]);
        let collection = parse_collection(DatasetKind::Weather, &body).expect("collection");
        assert_eq!(collection.records[0].name, "Bilbao");
        assert_eq!(collection.records[0].id, None);
    }

    #[test]
    fn collection_without_list_is_an_error() {
        let err = parse_collection(DatasetKind::Elections, &json!({ "rows": [] }))
            .expect_err("missing list");
        assert!(matches!(err, PayloadError::MissingList("data")));
    }

    #[test]
    fn detail_unwraps_envelope_and_mock_flag() {
        let body = json!({
            "success": true,
            "is_mock_data": true,
            "data": { "id": 9, "name": "Mock station", "last_aqi": 1 }
        });
        let detail = parse_detail(DatasetKind::AirQuality, &body).expect("detail");
        assert_eq!(detail.id, EntityId::Numeric(9));
        assert!(detail.is_mock);
    }

    #[test]
    fn detail_success_false_is_rejected() {
        let body = json!({ "success": false, "data": null });
        assert!(matches!(
            parse_detail(DatasetKind::Covid, &body),
            Err(PayloadError::Rejected)
        ));
    }

    #[test]
    fn detail_accepts_unwrapped_objects() {
        let body = json!({ "id": 4, "comunidad": "Aragón", "casos": 120 });
        let detail = parse_detail(DatasetKind::Covid, &body).expect("detail");
        assert_eq!(detail.name, "Aragón");
        assert!(!detail.is_mock);
    }

    #[test]
    fn weather_has_no_detail() {
        assert!(matches!(
            parse_detail(DatasetKind::Weather, &json!({ "data": {} })),
            Err(PayloadError::NoDetail(DatasetKind::Weather))
        ));
    }

    #[test]
    fn malformed_detail_is_invalid() {
        let body = json!({ "success": true, "data": { "name": "no id" } });
        assert!(matches!(
            parse_detail(DatasetKind::AirQuality, &body),
            Err(PayloadError::Invalid(_))
        ));
    }
}
