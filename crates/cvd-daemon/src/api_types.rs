//! Request and response types for the cvd-daemon HTTP endpoints.
//!
//! Published data (`GlobalTotals`, `ReconciledLocationRecord`,
//! `DailyCountRecord`) is served as-is from `cvd-schemas`; only envelopes and
//! query strings are defined here. No business logic lives here.

use chrono::{DateTime, Utc};
use cvd_runtime::RunRecord;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub store: String,
    pub cache_ttl_secs: u64,
    /// Age of the cached generation; `None` before the first read.
    pub cache_age_secs: Option<u64>,
    pub last_run: Option<RunRecord>,
}

// ---------------------------------------------------------------------------
// /v1/last-updated
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdatedResponse {
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

/// `GET /v1/locations?country=&province=&noProvince=`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationsQuery {
    pub country: Option<String>,
    /// Present-but-empty means "no province".
    pub province: Option<String>,
    #[serde(default)]
    pub no_province: bool,
}

/// `GET /v1/locations-by-ids?ids=a,b`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdsQuery {
    #[serde(default)]
    pub ids: String,
}

/// `GET /v1/top/:field?limit=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Errors (4xx)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
