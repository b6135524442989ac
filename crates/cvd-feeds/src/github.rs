//! GitHub raw-content adapter for the cumulative time-series feed.
//!
//! One CSV document per metric:
//! `{base}/time_series_covid19_{confirmed|recovered|deaths}_global.csv`.

use std::time::Duration;

use async_trait::async_trait;
use cvd_schemas::{Metric, RawSeriesRow};
use tracing::debug;

use crate::provider::{FeedError, TimeSeriesFeed};
use crate::series_csv::parse_series_csv;

#[derive(Debug, Clone)]
pub struct GitHubSeriesFeed {
    http: reqwest::Client,
    base_url: String,
}

impl GitHubSeriesFeed {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            http: crate::build_http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn metric_url(&self, metric: Metric) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            metric_file_name(metric)
        )
    }
}

pub fn metric_file_name(metric: Metric) -> String {
    format!("time_series_covid19_{}_global.csv", metric.as_str())
}

#[async_trait]
impl TimeSeriesFeed for GitHubSeriesFeed {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn fetch_metric_series(&self, metric: Metric) -> Result<Vec<RawSeriesRow>, FeedError> {
        let url = self.metric_url(metric);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::transport("series request failed", e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::transport("series response read failed", e))?;

        if !status.is_success() {
            return Err(FeedError::Api {
                code: Some(i64::from(status.as_u16())),
                message: format!("GET {url} returned {status}"),
            });
        }

        let rows = parse_series_csv(&body)?;
        debug!(%metric, rows = rows.len(), "series csv decoded");
        Ok(rows)
    }
}
