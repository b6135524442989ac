//! cvd-feeds
//!
//! Upstream feed adapters (pluggable).
//!
//! This crate owns the feed abstraction and the two concrete HTTP feeds:
//! the ArcGIS snapshot service and the GitHub-hosted cumulative CSV series.
//! It does **not** join, validate or persist; callers (the runtime pipeline)
//! fetch everything and hand it to `cvd-reconcile`.

pub mod arcgis;
pub mod github;
pub mod provider;
pub mod series_csv;

use std::time::Duration;

pub use arcgis::ArcGisSnapshotFeed;
pub use github::GitHubSeriesFeed;
pub use provider::{FeedError, SnapshotFeed, TimeSeriesFeed};
pub use series_csv::parse_series_csv;

/// Shared HTTP client for the adapters. Every request inherits `timeout`;
/// an elapsed timeout surfaces as [`FeedError::Transport`].
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, FeedError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cvd-feeds/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FeedError::Config(format!("http client build failed: {e}")))
}
