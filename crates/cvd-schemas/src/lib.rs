//! cvd-schemas
//!
//! Shared data model for the case-data pipeline: what the feeds return, what the
//! reconciler produces, and what gets published to the store.
//!
//! Plain serde types only. Normalization, joining and validation live in
//! `cvd-reconcile`; persistence lives in `cvd-db`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// One of the three cumulative metrics carried by both feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Confirmed,
    Recovered,
    Deaths,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Confirmed, Metric::Recovered, Metric::Deaths];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Confirmed => "confirmed",
            Metric::Recovered => "recovered",
            Metric::Deaths => "deaths",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Feed-side types
// ---------------------------------------------------------------------------

/// Current per-location totals from the geospatial snapshot feed.
///
/// Recomputed on every run; never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSnapshot {
    pub country: String,
    /// `None` for a country-level aggregate.
    pub province: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confirmed: i64,
    pub recovered: i64,
    pub deaths: i64,
    /// Active count as reported by the feed. The published record derives its own.
    pub active: i64,
    pub last_update: Option<DateTime<Utc>>,
    pub object_id: i64,
}

/// One location's row from a single-metric time-series stream.
///
/// `province` is kept as the feed spells it: an empty string means
/// "no sub-division" in this feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSeriesRow {
    pub province: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Cumulative count per day, in the order the feed lists the days.
    pub counts: Vec<(NaiveDate, i64)>,
}

// ---------------------------------------------------------------------------
// Published types
// ---------------------------------------------------------------------------

/// One day of a location's (or the global) series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCountRecord {
    pub day: NaiveDate,
    pub confirmed_cumulative: i64,
    pub recovered_cumulative: i64,
    pub deaths_cumulative: i64,
    /// `confirmed_cumulative(day) - confirmed_cumulative(day - 1)`; may be negative.
    pub confirmed_cases_today: i64,
    /// `deaths_cumulative(day) - deaths_cumulative(day - 1)`; may be negative.
    pub deaths_today: i64,
}

/// Snapshot row joined with its time series. One per snapshot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledLocationRecord {
    pub id_key: String,
    pub country: String,
    pub province: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confirmed: i64,
    pub recovered: i64,
    pub deaths: i64,
    /// `confirmed - (recovered + deaths)`.
    pub active: i64,
    pub confirmed_cases_today: i64,
    pub deaths_today: i64,
    pub last_update: Option<DateTime<Utc>>,
    pub object_id: i64,
    pub cases_by_date: Vec<DailyCountRecord>,
}

/// Singleton global totals document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTotals {
    pub confirmed: i64,
    pub recovered: i64,
    pub deaths: i64,
    pub active: i64,
    pub time_series_total_cases_by_date: Vec<DailyCountRecord>,
    /// Distinct snapshot countries, sorted.
    pub all_countries: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// One complete output set of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub totals: GlobalTotals,
    pub locations: Vec<ReconciledLocationRecord>,
}

/// `confirmed - (recovered + deaths)`, shared by totals and records.
pub fn derive_active(confirmed: i64, recovered: i64, deaths: i64) -> i64 {
    confirmed.saturating_sub(recovered.saturating_add(deaths))
}
