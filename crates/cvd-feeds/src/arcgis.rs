//! ArcGIS feature-service adapter for the current-snapshot feed.
//!
//! Location rows come from a plain `query` over every feature, paged with
//! `resultOffset` while the service reports `exceededTransferLimit`. Global
//! totals come from the same layer with an `outStatistics` sum, read back from
//! `features[0].attributes.value`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cvd_schemas::{LocationSnapshot, Metric};
use serde::Deserialize;
use tracing::debug;

use crate::provider::{FeedError, SnapshotFeed};

/// Snapshot feed backed by an ArcGIS `FeatureServer/<layer>` URL.
#[derive(Debug, Clone)]
pub struct ArcGisSnapshotFeed {
    http: reqwest::Client,
    base_url: String,
}

impl ArcGisSnapshotFeed {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            http: crate::build_http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.base_url.trim_end_matches('/'))
    }

    async fn query(&self, extra: &[(&str, &str)]) -> Result<String, FeedError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("f", "json"),
            ("where", "1=1"),
            ("returnGeometry", "false"),
        ];
        params.extend_from_slice(extra);

        let resp = self
            .http
            .get(self.query_url())
            .query(&params)
            .send()
            .await
            .map_err(|e| FeedError::transport("arcgis request failed", e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::transport("arcgis response read failed", e))?;

        if !status.is_success() {
            return Err(FeedError::Api {
                code: Some(i64::from(status.as_u16())),
                message: truncate(&body, 200),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl SnapshotFeed for ArcGisSnapshotFeed {
    fn name(&self) -> &'static str {
        "arcgis"
    }

    async fn fetch_location_snapshots(&self) -> Result<Vec<LocationSnapshot>, FeedError> {
        let mut rows = Vec::new();
        let mut pages = 0usize;
        loop {
            let offset = rows.len().to_string();
            let body = self
                .query(&[
                    ("outFields", "*"),
                    ("orderByFields", "OBJECTID"),
                    ("resultOffset", offset.as_str()),
                ])
                .await?;
            let page = decode_location_page(&body)?;
            pages += 1;

            let got = page.rows.len();
            rows.extend(page.rows);
            if !page.exceeded_transfer_limit {
                break;
            }
            if got == 0 {
                return Err(FeedError::Decode(format!(
                    "arcgis reported exceededTransferLimit on an empty page at offset {offset}"
                )));
            }
        }
        debug!(rows = rows.len(), pages, "arcgis location snapshots decoded");
        Ok(rows)
    }

    async fn fetch_global_metric_total(&self, metric: Metric) -> Result<i64, FeedError> {
        let stats = statistic_sum_param(metric);
        let body = self.query(&[("outStatistics", stats.as_str())]).await?;
        decode_statistic_value(&body)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeatureSet<A> {
    #[serde(default = "Vec::new")]
    features: Vec<Feature<A>>,
    /// Set when the service capped this response at its `maxRecordCount`.
    #[serde(default, rename = "exceededTransferLimit")]
    exceeded_transfer_limit: bool,
    error: Option<ArcGisError>,
}

#[derive(Debug, Deserialize)]
struct Feature<A> {
    attributes: A,
}

#[derive(Debug, Deserialize)]
struct ArcGisError {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaseAttributes {
    #[serde(rename = "Country_Region")]
    country_region: Option<String>,
    #[serde(rename = "Province_State")]
    province_state: Option<String>,
    #[serde(rename = "Lat")]
    lat: Option<f64>,
    #[serde(rename = "Long_")]
    long: Option<f64>,
    #[serde(rename = "Confirmed")]
    confirmed: Option<f64>,
    #[serde(rename = "Recovered")]
    recovered: Option<f64>,
    #[serde(rename = "Deaths")]
    deaths: Option<f64>,
    #[serde(rename = "Active")]
    active: Option<f64>,
    /// Epoch milliseconds.
    #[serde(rename = "Last_Update")]
    last_update: Option<i64>,
    #[serde(rename = "OBJECTID")]
    object_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StatisticAttributes {
    value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode_feature_set<A: for<'de> Deserialize<'de>>(
    body: &str,
) -> Result<FeatureSet<A>, FeedError> {
    let mut set: FeatureSet<A> = serde_json::from_str(body)
        .map_err(|e| FeedError::Decode(format!("arcgis json: {e}")))?;
    if let Some(err) = set.error.take() {
        return Err(FeedError::Api {
            code: err.code,
            message: err.message.unwrap_or_else(|| "unknown".to_string()),
        });
    }
    Ok(set)
}

/// One page of a location `query`.
#[derive(Debug)]
pub struct LocationPage {
    pub rows: Vec<LocationSnapshot>,
    /// More rows exist past this page.
    pub exceeded_transfer_limit: bool,
}

/// Decode a complete location `query` response body. A page the service
/// truncated is a decode error: a partial snapshot must never pass for a
/// whole one.
pub fn decode_location_features(body: &str) -> Result<Vec<LocationSnapshot>, FeedError> {
    let page = decode_location_page(body)?;
    if page.exceeded_transfer_limit {
        return Err(FeedError::Decode(format!(
            "arcgis response truncated at {} features (exceededTransferLimit)",
            page.rows.len()
        )));
    }
    Ok(page.rows)
}

/// Decode one page of a location `query` response body. Null counts read as 0.
pub fn decode_location_page(body: &str) -> Result<LocationPage, FeedError> {
    let set: FeatureSet<CaseAttributes> = decode_feature_set(body)?;
    let exceeded_transfer_limit = set.exceeded_transfer_limit;
    let features = set.features;

    let mut out = Vec::with_capacity(features.len());
    for (i, Feature { attributes: a }) in features.into_iter().enumerate() {
        let country = match a.country_region {
            Some(c) if !c.trim().is_empty() => c,
            _ => {
                return Err(FeedError::Decode(format!(
                    "arcgis feature {i}: missing Country_Region"
                )))
            }
        };

        let last_update = match a.last_update {
            Some(ms) => Some(DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
                FeedError::Decode(format!("arcgis feature {i}: Last_Update out of range: {ms}"))
            })?),
            None => None,
        };

        out.push(LocationSnapshot {
            country,
            province: a.province_state,
            latitude: a.lat,
            longitude: a.long,
            confirmed: whole_count(a.confirmed, "Confirmed", i)?,
            recovered: whole_count(a.recovered, "Recovered", i)?,
            deaths: whole_count(a.deaths, "Deaths", i)?,
            active: whole_count(a.active, "Active", i)?,
            last_update,
            object_id: a.object_id.unwrap_or(0),
        });
    }
    Ok(LocationPage {
        rows: out,
        exceeded_transfer_limit,
    })
}

/// Decode an `outStatistics` response body into the summed value.
pub fn decode_statistic_value(body: &str) -> Result<i64, FeedError> {
    let set: FeatureSet<StatisticAttributes> = decode_feature_set(body)?;
    let first = set
        .features
        .into_iter()
        .next()
        .ok_or_else(|| FeedError::Decode("arcgis statistic response has no features".to_string()))?;
    match first.attributes.value {
        Some(v) => whole_count(Some(v), "value", 0),
        None => Err(FeedError::Decode(
            "arcgis statistic response has null value".to_string(),
        )),
    }
}

fn statistic_sum_param(metric: Metric) -> String {
    let field = match metric {
        Metric::Confirmed => "Confirmed",
        Metric::Recovered => "Recovered",
        Metric::Deaths => "Deaths",
    };
    serde_json::json!([{
        "statisticType": "sum",
        "onStatisticField": field,
        "outStatisticFieldName": "value",
    }])
    .to_string()
}

/// ArcGIS serializes counts as JSON numbers that may carry a `.0`.
fn whole_count(v: Option<f64>, field: &str, feature: usize) -> Result<i64, FeedError> {
    let Some(v) = v else {
        return Ok(0);
    };
    if !v.is_finite() || v.fract() != 0.0 || v.abs() > 9.0e15 {
        return Err(FeedError::Decode(format!(
            "arcgis feature {feature}: {field} is not a whole count: {v}"
        )));
    }
    Ok(v as i64)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

// ---------------------------------------------------------------------------
// Tests (no network)
// ---------------------------------------------------------------------------
