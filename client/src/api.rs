use geodata_shared::dataset::DatasetKind;
use geodata_shared::record::percent_encode;
use geodata_shared::{Collection, DetailRecord, EntityId, PayloadError};
use serde_json::Value;

use crate::detail_cache::DetailSource;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch error: {0}")]
    Network(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("parse error: {0}")]
    Decode(String),
    #[error("backend reported failure")]
    Rejected,
    #[error("{0} has no detail endpoint")]
    NoDetailEndpoint(DatasetKind),
}

impl From<PayloadError> for FetchError {
    fn from(e: PayloadError) -> Self {
        match e {
            PayloadError::Rejected => FetchError::Rejected,
            PayloadError::NoDetail(kind) => FetchError::NoDetailEndpoint(kind),
            other => FetchError::Decode(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub light: bool,
    pub category: Option<String>,
}

impl ListQuery {
    /// First page sized to the dataset's configured page.
    pub fn first_page(kind: DatasetKind) -> Self {
        Self {
            limit: Some(kind.config().page_size),
            offset: Some(0),
            light: true,
            category: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }
}

/// Whether the list endpoint of `kind` filters by category itself.
pub fn filters_server_side(kind: DatasetKind) -> bool {
    kind.config()
        .endpoints
        .paging
        .is_some_and(|paging| paging.category.is_some())
}

/// List URL for `kind`. Paging parameters are only emitted for endpoints
/// that accept them.
pub fn build_list_url(base: &str, kind: DatasetKind, query: &ListQuery) -> String {
    let endpoints = kind.config().endpoints;
    let mut params = Vec::new();
    if let Some(paging) = endpoints.paging {
        if let Some(limit) = query.limit {
            params.push(format!("{}={limit}", paging.limit));
        }
        if let Some(offset) = query.offset {
            params.push(format!("{}={offset}", paging.offset));
        }
        if query.light {
            params.push(format!("{}=true", paging.light));
        }
        if let Some(name) = paging.category
            && let Some(category) = query.category.as_deref().filter(|c| !c.is_empty())
        {
            params.push(format!("{name}={}", percent_encode(category)));
        }
    }
    if params.is_empty() {
        format!("{base}{}", endpoints.list)
    } else {
        format!("{base}{}?{}", endpoints.list, params.join("&"))
    }
}

pub fn detail_url(base: &str, kind: DatasetKind, id: &EntityId) -> Result<String, FetchError> {
    let template = kind
        .config()
        .endpoints
        .detail
        .ok_or(FetchError::NoDetailEndpoint(kind))?;
    Ok(format!(
        "{base}{}",
        template.replace("{id}", &id.path_segment())
    ))
}

/// Backend client over `gloo-net`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn from_config() -> Self {
        Self::new(crate::config::api_base())
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let resp = gloo_net::http::Request::get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if !resp.ok() {
            return Err(FetchError::Status(resp.status()));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    pub async fn fetch_collection(
        &self,
        kind: DatasetKind,
        query: &ListQuery,
    ) -> Result<Collection, FetchError> {
        let url = build_list_url(&self.base, kind, query);
        let body = self.get_json(&url).await?;
        let collection = geodata_shared::parse_collection(kind, &body)?;
        if collection.skipped > 0 {
            log::warn!(
                "{kind}: {} malformed elements skipped",
                collection.skipped
            );
        }
        Ok(collection)
    }
}

impl DetailSource for ApiClient {
    async fn fetch_detail(
        &self,
        kind: DatasetKind,
        id: &EntityId,
    ) -> Result<DetailRecord, FetchError> {
        let url = detail_url(&self.base, kind, id)?;
        let body = self.get_json(&url).await?;
        Ok(geodata_shared::parse_detail(kind, &body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_quality_list_url_uses_spanish_limit_param() {
        let url = build_list_url(
            "",
            DatasetKind::AirQuality,
            &ListQuery {
                limit: Some(500),
                offset: Some(0),
                light: true,
                category: Some("PM2.5".into()),
            },
        );
        assert_eq!(
            url,
            "/api/air-quality/stations?limite=500&offset=0&light=true&contaminante=PM2.5"
        );
    }

    #[test]
    fn elections_first_page_url() {
        let url = build_list_url(
            "https://api.example.org",
            DatasetKind::Elections,
            &ListQuery::first_page(DatasetKind::Elections),
        );
        assert_eq!(
            url,
            "https://api.example.org/api/elections/data?limit=5000&offset=0&light=true"
        );
    }

    #[test]
    fn unpaged_endpoints_ignore_query() {
        let url = build_list_url("", DatasetKind::Weather, &ListQuery::first_page(DatasetKind::Weather));
        assert_eq!(url, "/api/weather/data");
    }

    #[test]
    fn category_values_are_encoded() {
        let url = build_list_url(
            "",
            DatasetKind::Elections,
            &ListQuery {
                category: Some("EH BILDU".into()),
                ..ListQuery::default()
            },
        );
        assert_eq!(url, "/api/elections/data?partido_ganador=EH%20BILDU");
    }

    #[test]
    fn selected_category_reaches_the_first_page_query() {
        let query = ListQuery::first_page(DatasetKind::AirQuality).with_category(Some("NO2".into()));
        assert_eq!(
            build_list_url("", DatasetKind::AirQuality, &query),
            "/api/air-quality/stations?limite=500&offset=0&light=true&contaminante=NO2"
        );
        assert!(filters_server_side(DatasetKind::AirQuality));
        assert!(filters_server_side(DatasetKind::Elections));
        assert!(!filters_server_side(DatasetKind::Covid));
        assert!(!filters_server_side(DatasetKind::Weather));
    }

    #[test]
    fn detail_urls_substitute_ids() {
        assert_eq!(
            detail_url("", DatasetKind::AirQuality, &EntityId::Numeric(42)),
            Ok("/api/air-quality/station/42".to_string())
        );
        assert_eq!(
            detail_url("", DatasetKind::Elections, &EntityId::Code("08019".into())),
            Ok("/api/elections/municipality/08019".to_string())
        );
        assert_eq!(
            detail_url("", DatasetKind::Weather, &EntityId::Numeric(1)),
            Err(FetchError::NoDetailEndpoint(DatasetKind::Weather))
        );
    }

    #[test]
    fn payload_errors_map_to_fetch_errors() {
        assert_eq!(FetchError::from(PayloadError::Rejected), FetchError::Rejected);
        assert!(matches!(
            FetchError::from(PayloadError::MissingData),
            FetchError::Decode(_)
        ));
    }
}
