//! Source boundary for the two upstream feeds.
//!
//! This module defines **only** the feed traits and their error type.
//! Concrete HTTP adapters live in `arcgis.rs` and `github.rs`; CSV decoding
//! lives in `series_csv.rs`. Nothing here joins, validates, or persists.

use std::fmt;

use async_trait::async_trait;
use cvd_schemas::{LocationSnapshot, Metric, RawSeriesRow};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a feed adapter may return. Any of them aborts the current run.
#[derive(Debug)]
pub enum FeedError {
    /// Network or transport failure, including request timeouts.
    Transport(String),
    /// The upstream API answered with an application-level error.
    Api { code: Option<i64>, message: String },
    /// A response payload was malformed.
    Decode(String),
    /// The adapter could not be constructed (bad URL, client build failure).
    Config(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Transport(msg) => write!(f, "transport error: {msg}"),
            FeedError::Api {
                code: Some(c),
                message,
            } => write!(f, "feed api error code={c}: {message}"),
            FeedError::Api {
                code: None,
                message,
            } => write!(f, "feed api error: {message}"),
            FeedError::Decode(msg) => write!(f, "decode error: {msg}"),
            FeedError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for FeedError {}

impl FeedError {
    pub(crate) fn transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Transport(format!("{context}: request timed out"))
        } else {
            FeedError::Transport(format!("{context}: {err}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Feed traits
// ---------------------------------------------------------------------------

/// Current-snapshot feed: per-location totals plus global metric sums.
///
/// Implementations must be object-safe and `Send + Sync` so the pipeline can
/// hold them as `Arc<dyn SnapshotFeed>` and fetch concurrently.
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    /// Short name used in logs (e.g. `"arcgis"`).
    fn name(&self) -> &'static str;

    /// Every location row of the snapshot, fully materialized.
    async fn fetch_location_snapshots(&self) -> Result<Vec<LocationSnapshot>, FeedError>;

    /// Global sum of one metric across the snapshot.
    async fn fetch_global_metric_total(&self, metric: Metric) -> Result<i64, FeedError>;
}

/// Historical cumulative time-series feed, one stream per metric.
#[async_trait]
pub trait TimeSeriesFeed: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every location row of one metric's stream, fully materialized.
    async fn fetch_metric_series(&self, metric: Metric) -> Result<Vec<RawSeriesRow>, FeedError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
