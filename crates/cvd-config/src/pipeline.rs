//! Typed view of the effective config.
//!
//! # Contract
//! - YAML stores only the env var NAME holding the database URL
//!   (`database.url_env`); the URL itself is resolved once at startup via
//!   [`PipelineConfig::resolve_database_url`].
//! - Every key has a default, so an empty config is a valid config.
//! - Unknown keys are rejected.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_SNAPSHOT_BASE_URL: &str =
    "https://services1.arcgis.com/0MSEUqKaxRlEPj5g/arcgis/rest/services/ncov_cases/FeatureServer/1";
pub const DEFAULT_SERIES_BASE_URL: &str =
    "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series";

/// Env var → JSON pointer it overrides. Applied after every YAML layer.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("CVD_SNAPSHOT_BASE_URL", "/feeds/snapshot_base_url"),
    ("CVD_SERIES_BASE_URL", "/feeds/series_base_url"),
    ("CVD_FETCH_TIMEOUT_SECS", "/feeds/timeout_secs"),
    ("CVD_INTERVAL_SECS", "/schedule/interval_secs"),
    ("CVD_BIND_ADDR", "/api/bind_addr"),
    ("CVD_CACHE_TTL_SECS", "/api/cache_ttl_secs"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub feeds: FeedsConfig,
    pub schedule: ScheduleConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DatabaseConfig {
    /// NAME of the env var holding the Postgres URL.
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_env: "CVD_DATABASE_URL".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FeedsConfig {
    /// ArcGIS feature-service layer URL (without `/query`).
    pub snapshot_base_url: String,
    /// Directory URL holding the `time_series_covid19_*_global.csv` files.
    pub series_base_url: String,
    pub timeout_secs: u64,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            snapshot_base_url: DEFAULT_SNAPSHOT_BASE_URL.to_string(),
            series_base_url: DEFAULT_SERIES_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// 0 disables the read cache.
    pub cache_ttl_secs: u64,
    /// Named provinces that `noProvince=true` queries treat like a null province.
    pub no_province_exceptions: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            cache_ttl_secs: 60,
            no_province_exceptions: vec!["Greenland".to_string()],
        }
    }
}

impl PipelineConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: PipelineConfig =
            serde_json::from_value(v.clone()).context("config does not match schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID database.url_env must name an env var");
        }
        if self.database.max_connections == 0 {
            bail!("CONFIG_INVALID database.max_connections must be > 0");
        }
        if self.feeds.timeout_secs == 0 {
            bail!("CONFIG_INVALID feeds.timeout_secs must be > 0");
        }
        if self.schedule.interval_secs == 0 {
            bail!("CONFIG_INVALID schedule.interval_secs must be > 0");
        }
        for (key, url) in [
            ("feeds.snapshot_base_url", &self.feeds.snapshot_base_url),
            ("feeds.series_base_url", &self.feeds.series_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("CONFIG_INVALID {key} must be an http(s) URL, got '{url}'");
            }
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.api
            .bind_addr
            .parse()
            .with_context(|| format!("CONFIG_INVALID api.bind_addr '{}'", self.api.bind_addr))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.feeds.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.api.cache_ttl_secs)
    }

    /// Read the database URL from the env var named by `database.url_env`.
    /// The error names the variable, never a value.
    pub fn resolve_database_url(&self) -> Result<String> {
        let name = &self.database.url_env;
        match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => bail!("missing env var {name} (database.url_env)"),
        }
    }
}

/// Build the JSON layer for every set `CVD_*` override. Numeric keys must
/// parse as unsigned integers.
pub fn env_override_layer(env: impl Fn(&str) -> Option<String>) -> Result<Value> {
    let mut layer = json!({});
    for (var, pointer) in ENV_OVERRIDES {
        let Some(raw) = env(var) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let value = if pointer.ends_with("_secs") {
            let n: u64 = raw
                .parse()
                .with_context(|| format!("{var} must be an unsigned integer, got '{raw}'"))?;
            json!(n)
        } else {
            json!(raw)
        };
        set_pointer(&mut layer, pointer, value);
    }
    Ok(layer)
}

fn set_pointer(root: &mut Value, pointer: &str, value: Value) {
    let mut cur = root;
    let mut tokens = pointer.trim_start_matches('/').split('/').peekable();
    while let Some(tok) = tokens.next() {
        if !cur.is_object() {
            *cur = json!({});
        }
        let Value::Object(map) = cur else {
            return;
        };
        if tokens.peek().is_none() {
            map.insert(tok.to_string(), value);
            return;
        }
        cur = map.entry(tok.to_string()).or_insert_with(|| json!({}));
    }
}
